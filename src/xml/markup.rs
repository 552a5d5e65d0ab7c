//! Recognition of a single XML markup written on one line.
//!
//! Five shapes are supported: start (`<a k="v">`), end (`</a>`), empty
//! (`<a k="v"/>`), complete (`<a k="v">text</a>`) and declaration
//! (`<?a k="v"?>`). Nested markups, comments and CDATA are not.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use quick_xml::escape::EscapeError;
use thiserror::Error;

use super::attributes::{parse_attributes, unescape_value};
use super::automaton::{Automaton, AutomatonError, Captures, CharClass, StateSpec, TransitionSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkupKind {
    /// `<node>`
    Start,
    /// `</node>`
    End,
    /// `<node/>`
    Empty,
    /// `<node>data</node>`
    Complete,
    /// `<?xml version="1.0"?>`
    Declaration,
}

impl fmt::Display for MarkupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkupKind::Start => "start",
            MarkupKind::End => "end",
            MarkupKind::Empty => "empty",
            MarkupKind::Complete => "complete",
            MarkupKind::Declaration => "declaration",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("the markup is not valid: {line}")]
    Invalid { line: String },
    #[error("closing name '{end_name}' does not match '{name}' in markup: {line}")]
    NameMismatch {
        name: String,
        end_name: String,
        line: String,
    },
    #[error("declaration must be closed with '?>': {line}")]
    InvalidDeclaration { line: String },
    #[error("invalid escape sequence in markup {line}: {source}")]
    Escape {
        line: String,
        #[source]
        source: EscapeError,
    },
    #[error("markup grammar is not deterministic: {0}")]
    Grammar(AutomatonError),
}

impl MarkupError {
    /// The offending line, when the error is tied to one.
    pub fn line(&self) -> Option<&str> {
        match self {
            MarkupError::Invalid { line }
            | MarkupError::NameMismatch { line, .. }
            | MarkupError::InvalidDeclaration { line }
            | MarkupError::Escape { line, .. } => Some(line),
            MarkupError::Grammar(_) => None,
        }
    }
}

/// A recognized markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    pub kind: MarkupKind,
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
}

impl Markup {
    pub fn parse(line: &str) -> Result<Markup, MarkupError> {
        tokenize(line)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }
}

/// Events fired by the transitions that decide the markup kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    /// `<?`
    DeclarationOpen,
    /// `>` closing a start markup
    StartClose,
    /// `>` closing an end markup, standalone or after text
    EndClose,
    /// `/>`
    EmptyClose,
    /// `?>`
    DeclarationClose,
}

const NAME: usize = 0;
const END_NAME: usize = 1;
const ATTRIBUTES: usize = 2;
const TEXT: usize = 3;
const CAPTURE_COUNT: usize = 4;

mod state {
    use crate::xml::automaton::StateId;

    pub const INIT: StateId = 0;
    pub const OPEN_ANGLE: StateId = 1;
    pub const DECLARATION_MARK: StateId = 2;
    pub const NAME: StateId = 3;
    pub const TAG_SPACE: StateId = 4;
    pub const ATTR_KEY: StateId = 5;
    pub const ATTR_EQUALS: StateId = 6;
    pub const ATTR_DOUBLE: StateId = 7;
    pub const ATTR_SINGLE: StateId = 8;
    pub const ATTR_DONE: StateId = 9;
    pub const EMPTY_SLASH: StateId = 10;
    pub const DECLARATION_QMARK: StateId = 11;
    pub const OPENED: StateId = 12;
    pub const TEXT: StateId = 13;
    pub const TEXT_ANGLE: StateId = 14;
    pub const TEXT_SLASH: StateId = 15;
    pub const CLOSE_NAME: StateId = 16;
    pub const CLOSE_SPACE: StateId = 17;
    pub const END_SLASH: StateId = 18;
    pub const END_NAME: StateId = 19;
    pub const END_SPACE: StateId = 20;
    pub const DONE: StateId = 21;
}

const STATES: [StateSpec; 22] = [
    StateSpec::new(false, None),             // INIT
    StateSpec::new(false, None),             // OPEN_ANGLE
    StateSpec::new(false, None),             // DECLARATION_MARK
    StateSpec::new(false, Some(NAME)),       // NAME
    StateSpec::new(false, Some(ATTRIBUTES)), // TAG_SPACE
    StateSpec::new(false, Some(ATTRIBUTES)), // ATTR_KEY
    StateSpec::new(false, Some(ATTRIBUTES)), // ATTR_EQUALS
    StateSpec::new(false, Some(ATTRIBUTES)), // ATTR_DOUBLE
    StateSpec::new(false, Some(ATTRIBUTES)), // ATTR_SINGLE
    StateSpec::new(false, Some(ATTRIBUTES)), // ATTR_DONE
    StateSpec::new(false, None),             // EMPTY_SLASH
    StateSpec::new(false, None),             // DECLARATION_QMARK
    StateSpec::new(true, None),              // OPENED
    StateSpec::new(false, Some(TEXT)),       // TEXT
    StateSpec::new(false, None),             // TEXT_ANGLE
    StateSpec::new(false, None),             // TEXT_SLASH
    StateSpec::new(false, Some(END_NAME)),   // CLOSE_NAME
    StateSpec::new(false, None),             // CLOSE_SPACE
    StateSpec::new(false, None),             // END_SLASH
    StateSpec::new(false, Some(NAME)),       // END_NAME
    StateSpec::new(false, None),             // END_SPACE
    StateSpec::new(true, None),              // DONE
];

const NOT_DOUBLE_QUOTE: CharClass = CharClass::NoneOf(&['"', '<']);
const NOT_SINGLE_QUOTE: CharClass = CharClass::NoneOf(&['\'', '<']);
const NOT_MARKUP: CharClass = CharClass::NoneOf(&['<', '>']);

const TRANSITIONS: [TransitionSpec<Marker>; 46] = {
    use state::*;
    use CharClass::{Exact, NameChar, NameStart, Whitespace};
    use Marker::*;

    [
        TransitionSpec::new(INIT, Exact('<'), OPEN_ANGLE),
        TransitionSpec::with_action(OPEN_ANGLE, Exact('?'), DECLARATION_MARK, DeclarationOpen),
        TransitionSpec::new(OPEN_ANGLE, Exact('/'), END_SLASH),
        TransitionSpec::new(OPEN_ANGLE, NameStart, NAME),
        TransitionSpec::new(DECLARATION_MARK, NameStart, NAME),
        // name, then attributes or a terminator
        TransitionSpec::new(NAME, NameChar, NAME),
        TransitionSpec::new(NAME, Whitespace, TAG_SPACE),
        TransitionSpec::with_action(NAME, Exact('>'), OPENED, StartClose),
        TransitionSpec::new(NAME, Exact('/'), EMPTY_SLASH),
        TransitionSpec::new(NAME, Exact('?'), DECLARATION_QMARK),
        TransitionSpec::new(TAG_SPACE, Whitespace, TAG_SPACE),
        TransitionSpec::new(TAG_SPACE, NameStart, ATTR_KEY),
        TransitionSpec::with_action(TAG_SPACE, Exact('>'), OPENED, StartClose),
        TransitionSpec::new(TAG_SPACE, Exact('/'), EMPTY_SLASH),
        TransitionSpec::new(TAG_SPACE, Exact('?'), DECLARATION_QMARK),
        // key="value" / key='value'
        TransitionSpec::new(ATTR_KEY, NameChar, ATTR_KEY),
        TransitionSpec::new(ATTR_KEY, Exact('='), ATTR_EQUALS),
        TransitionSpec::new(ATTR_EQUALS, Exact('"'), ATTR_DOUBLE),
        TransitionSpec::new(ATTR_EQUALS, Exact('\''), ATTR_SINGLE),
        TransitionSpec::new(ATTR_DOUBLE, NOT_DOUBLE_QUOTE, ATTR_DOUBLE),
        TransitionSpec::new(ATTR_DOUBLE, Exact('"'), ATTR_DONE),
        TransitionSpec::new(ATTR_SINGLE, NOT_SINGLE_QUOTE, ATTR_SINGLE),
        TransitionSpec::new(ATTR_SINGLE, Exact('\''), ATTR_DONE),
        TransitionSpec::new(ATTR_DONE, Whitespace, TAG_SPACE),
        TransitionSpec::with_action(ATTR_DONE, Exact('>'), OPENED, StartClose),
        TransitionSpec::new(ATTR_DONE, Exact('/'), EMPTY_SLASH),
        TransitionSpec::new(ATTR_DONE, Exact('?'), DECLARATION_QMARK),
        TransitionSpec::with_action(EMPTY_SLASH, Exact('>'), DONE, EmptyClose),
        TransitionSpec::with_action(DECLARATION_QMARK, Exact('>'), DONE, DeclarationClose),
        // inline text and the closing markup of a complete markup
        TransitionSpec::new(OPENED, NOT_MARKUP, TEXT),
        TransitionSpec::new(OPENED, Exact('<'), TEXT_ANGLE),
        TransitionSpec::new(TEXT, NOT_MARKUP, TEXT),
        TransitionSpec::new(TEXT, Exact('<'), TEXT_ANGLE),
        TransitionSpec::new(TEXT_ANGLE, Exact('/'), TEXT_SLASH),
        TransitionSpec::new(TEXT_SLASH, NameStart, CLOSE_NAME),
        TransitionSpec::new(CLOSE_NAME, NameChar, CLOSE_NAME),
        TransitionSpec::new(CLOSE_NAME, Whitespace, CLOSE_SPACE),
        TransitionSpec::with_action(CLOSE_NAME, Exact('>'), DONE, EndClose),
        TransitionSpec::new(CLOSE_SPACE, Whitespace, CLOSE_SPACE),
        TransitionSpec::with_action(CLOSE_SPACE, Exact('>'), DONE, EndClose),
        // standalone end markup
        TransitionSpec::new(END_SLASH, NameStart, END_NAME),
        TransitionSpec::new(END_NAME, NameChar, END_NAME),
        TransitionSpec::new(END_NAME, Whitespace, END_SPACE),
        TransitionSpec::with_action(END_NAME, Exact('>'), DONE, EndClose),
        TransitionSpec::new(END_SPACE, Whitespace, END_SPACE),
        TransitionSpec::with_action(END_SPACE, Exact('>'), DONE, EndClose),
    ]
};

static RECOGNIZER: Lazy<Result<Automaton<Marker>, AutomatonError>> =
    Lazy::new(|| Automaton::from_table(&STATES, &TRANSITIONS, state::INIT, CAPTURE_COUNT));

/// Outcome of the kind-deciding transitions, applied in the order they fire.
#[derive(Debug, Default)]
struct Classification {
    kind: Option<MarkupKind>,
    invalid_declaration: bool,
    misplaced: bool,
}

impl Classification {
    fn apply(&mut self, marker: Marker) {
        match (self.kind, marker) {
            (None, Marker::DeclarationOpen) => self.kind = Some(MarkupKind::Declaration),
            (None, Marker::StartClose) => self.kind = Some(MarkupKind::Start),
            (None, Marker::EndClose) => self.kind = Some(MarkupKind::End),
            (None, Marker::EmptyClose) => self.kind = Some(MarkupKind::Empty),
            (Some(MarkupKind::Start), Marker::EndClose) => self.kind = Some(MarkupKind::Complete),
            (Some(MarkupKind::Declaration), Marker::DeclarationClose) => (),
            (Some(MarkupKind::Declaration), _) => self.invalid_declaration = true,
            _ => self.misplaced = true,
        }
    }
}

/// Classifies one line as a single markup.
///
/// Surrounding whitespace is ignored. Attribute values and text are returned
/// with entity references resolved.
pub fn tokenize(line: &str) -> Result<Markup, MarkupError> {
    let trimmed = line.trim();
    let recognizer = RECOGNIZER.as_ref().map_err(|e| MarkupError::Grammar(e.clone()))?;

    let mut captures = Captures::new(recognizer.capture_count());
    let mut classification = Classification::default();
    let accepted = recognizer.run(trimmed, &mut captures, |marker| classification.apply(marker));

    if classification.invalid_declaration {
        return Err(MarkupError::InvalidDeclaration {
            line: trimmed.to_string(),
        });
    }
    let kind = match classification.kind {
        Some(kind) if accepted && !classification.misplaced => kind,
        _ => {
            return Err(MarkupError::Invalid {
                line: trimmed.to_string(),
            })
        }
    };

    let mut buffers = captures.into_buffers().into_iter();
    let mut next_buffer = || buffers.next().unwrap_or_default();
    let (name, end_name, attributes, text) = (next_buffer(), next_buffer(), next_buffer(), next_buffer());

    if kind == MarkupKind::Complete && name != end_name {
        return Err(MarkupError::NameMismatch {
            name,
            end_name,
            line: trimmed.to_string(),
        });
    }

    let escape_error = |source| MarkupError::Escape {
        line: trimmed.to_string(),
        source,
    };

    Ok(Markup {
        kind,
        name,
        attributes: parse_attributes(&attributes).map_err(escape_error)?,
        text: unescape_value(&text).map_err(escape_error)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn grammar_is_deterministic() {
        let recognizer = RECOGNIZER.as_ref().expect("markup table builds");
        assert_eq!(recognizer.state_count(), STATES.len());
    }

    #[rstest]
    #[case("<node>", MarkupKind::Start)]
    #[case("<node/>", MarkupKind::Empty)]
    #[case("<node />", MarkupKind::Empty)]
    #[case("</node>", MarkupKind::End)]
    #[case("   </node>  \t", MarkupKind::End)]
    #[case("</node  >", MarkupKind::End)]
    #[case("<node></node>", MarkupKind::Complete)]
    #[case("<?node?>", MarkupKind::Declaration)]
    fn recognizes_bare_shapes(#[case] line: &str, #[case] kind: MarkupKind) {
        let markup = tokenize(line).unwrap();
        assert_eq!(markup.kind, kind);
        assert_eq!(markup.name, "node");
        assert_eq!(markup.text, "");
        assert!(markup.attributes.is_empty());
    }

    #[rstest]
    #[case::space_in_name("<no de>")]
    #[case::space_after_empty_slash("<node/ >")]
    #[case::space_after_end_slash("</ node>")]
    #[case::spaced_equals(r#"<node key = "value" />"#)]
    #[case::stray_quote(r#"<node key="val"ue" />"#)]
    #[case::mismatched_quotes(r#"<node key="value' />"#)]
    #[case::attribute_without_gap(r#"<node a="1"b="2"/>"#)]
    #[case::unterminated("<node")]
    #[case::trailing_garbage("<node/> x")]
    #[case::not_markup("node")]
    #[case::blank("")]
    #[case::nested("<a><b/></a>")]
    #[case::question_close_on_start(r#"<node k="v"?>"#)]
    fn rejects_malformed_lines(#[case] line: &str) {
        assert!(matches!(tokenize(line), Err(MarkupError::Invalid { .. })), "{line}");
    }

    #[test]
    fn error_carries_the_line() {
        let error = tokenize("  <no de>  ").unwrap_err();
        assert_eq!(error.line(), Some("<no de>"));
        assert_eq!(error.to_string(), "the markup is not valid: <no de>");
    }

    #[test]
    fn empty_with_attributes() {
        let markup = tokenize(r#"<node key="value, is it the key !?" />"#).unwrap();
        assert_eq!(markup.kind, MarkupKind::Empty);
        assert_eq!(markup.attribute("key"), Some("value, is it the key !?"));
        assert!(markup.has_attribute("key"));
        assert!(!markup.has_attribute("value"));
    }

    #[test]
    fn start_with_single_quotes() {
        let markup = tokenize("<node key='value' key2='lala2' life='42'>").unwrap();
        assert_eq!(markup.kind, MarkupKind::Start);
        assert_eq!(markup.attribute("key"), Some("value"));
        assert_eq!(markup.attribute("key2"), Some("lala2"));
        assert_eq!(markup.attribute("life"), Some("42"));
    }

    #[test]
    fn empty_values_are_kept() {
        let markup = tokenize(r#"<member type="node" ref="261728686" role=""/>"#).unwrap();
        assert_eq!(markup.kind, MarkupKind::Empty);
        assert_eq!(markup.name, "member");
        assert_eq!(markup.attribute("type"), Some("node"));
        assert_eq!(markup.attribute("ref"), Some("261728686"));
        assert_eq!(markup.attribute("role"), Some(""));
    }

    #[test]
    fn complete_with_text() {
        let markup = tokenize(r#"<node key="value" key2="lala2" life="42" >TEEEXT 123</node>"#).unwrap();
        assert_eq!(markup.kind, MarkupKind::Complete);
        assert_eq!(markup.text, "TEEEXT 123");
        assert_eq!(markup.attributes.len(), 3);
    }

    #[test]
    fn complete_names_must_match() {
        let error = tokenize(r#"<node key="value">TEEEXT 123</meta>"#).unwrap_err();
        match error {
            MarkupError::NameMismatch { name, end_name, .. } => {
                assert_eq!(name, "node");
                assert_eq!(end_name, "meta");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    #[case(r#"<?xml version="1.0" encoding="UTF-8"?>"#)]
    #[case(r#"<?xml version="1.0" encoding="UTF-8" ?>"#)]
    fn declaration(#[case] line: &str) {
        let markup = tokenize(line).unwrap();
        assert_eq!(markup.kind, MarkupKind::Declaration);
        assert_eq!(markup.name, "xml");
        assert_eq!(markup.attribute("version"), Some("1.0"));
        assert_eq!(markup.attribute("encoding"), Some("UTF-8"));
    }

    #[rstest]
    #[case(r#"<?xml version="1.0" encoding="UTF-8"/>"#)]
    #[case(r#"<?xml version="1.0">"#)]
    #[case("<?xml></xml>")]
    fn improperly_closed_declaration(#[case] line: &str) {
        assert!(matches!(tokenize(line), Err(MarkupError::InvalidDeclaration { .. })));
    }

    #[test]
    fn entities_are_resolved() {
        let markup = tokenize(r#"<tag k="name" v="Fish &amp; Chips"/>"#).unwrap();
        assert_eq!(markup.attribute("v"), Some("Fish & Chips"));

        let markup = tokenize("<note>a &lt; b</note>").unwrap();
        assert_eq!(markup.text, "a < b");

        assert!(matches!(
            tokenize(r#"<tag k="name" v="Fish & Chips"/>"#),
            Err(MarkupError::Escape { .. })
        ));
    }

    #[test]
    fn unicode_values() {
        let markup = tokenize(r#"<tag k="name" v="Pastower Straße"/>"#).unwrap();
        assert_eq!(markup.attribute("v"), Some("Pastower Straße"));
    }

    #[test]
    fn namespaced_names() {
        let markup = tokenize(r#"<osm:node xmlns:osm="urn:x" data-id='3'>"#).unwrap();
        assert_eq!(markup.name, "osm:node");
        assert_eq!(markup.attribute("xmlns:osm"), Some("urn:x"));
        assert_eq!(markup.attribute("data-id"), Some("3"));
    }

    fn attribute_pairs() -> impl Strategy<Value = Vec<(String, String, bool)>> {
        prop::collection::vec(("[a-z][a-z0-9_]{0,6}", "[A-Za-z0-9 ,.!?:-]{0,12}", any::<bool>()), 0..6)
    }

    proptest! {
        #[test]
        fn round_trips_name_and_attributes(
            name in "[a-zA-Z][a-zA-Z0-9]{0,8}",
            pairs in attribute_pairs(),
            gap in "[ \t]{1,3}",
            empty in any::<bool>(),
        ) {
            let mut line = format!("<{name}");
            let mut expected = HashMap::new();
            for (key, value, single) in &pairs {
                let quote = if *single { '\'' } else { '"' };
                line.push_str(&format!("{gap}{key}={quote}{value}{quote}"));
                expected.insert(key.clone(), value.clone());
            }
            line.push_str(if empty { "/>" } else { ">" });

            let markup = tokenize(&line).unwrap();
            prop_assert_eq!(markup.kind, if empty { MarkupKind::Empty } else { MarkupKind::Start });
            prop_assert_eq!(markup.name, name);
            prop_assert_eq!(markup.attributes, expected);
        }
    }
}
