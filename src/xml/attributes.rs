use std::collections::HashMap;

use once_cell::sync::Lazy;
use quick_xml::escape::{unescape, EscapeError};
use regex::Regex;

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<key>[A-Za-z_][A-Za-z0-9_.:-]*)=(?:"(?P<double>[^"]*)"|'(?P<single>[^']*)')"#)
        .expect("attribute pattern should compile")
});

/// Splits an attribute blob such as ` k="v" other='w'` into key/value pairs.
///
/// The blob is expected to have been validated by the markup automaton already,
/// so anything between pairs is whitespace. A repeated key keeps its last value.
pub fn parse_attributes(blob: &str) -> Result<HashMap<String, String>, EscapeError> {
    let mut attributes = HashMap::new();

    for pair in ATTRIBUTE.captures_iter(blob) {
        let (Some(key), Some(raw)) = (pair.name("key"), pair.name("double").or_else(|| pair.name("single")))
        else {
            continue;
        };
        attributes.insert(key.as_str().to_string(), unescape_value(raw.as_str())?);
    }

    Ok(attributes)
}

/// Resolves XML entity and character references (`&amp;`, `&#39;`, ...).
pub fn unescape_value(raw: &str) -> Result<String, EscapeError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    Ok(unescape(raw)?.into_owned())
}
