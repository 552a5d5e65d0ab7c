//! Line-by-line assembly of OSM elements.
//!
//! [`OsmParser`] reads one markup per line, in document order, and keeps the
//! element under construction until its closing markup arrives. Lines from
//! different documents must go to different parsers.

use std::str::FromStr;

use log::{debug, warn};
use thiserror::Error;

use crate::data::osm::{Element, ElementInfo, ElementKind, Node, Relation, Way};
use crate::xml::{tokenize, Markup, MarkupError, MarkupKind};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("<{element}> has invalid {attribute}=\"{value}\"")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },
    #[error("unknown member type \"{value}\"")]
    UnknownMemberType { value: String },
}

/// How a closing markup was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    /// A separate end markup, `</way>`.
    Explicit,
    /// The end of an empty or complete markup, `<way/>` or `<way>…</way>`.
    Inline,
}

#[derive(Debug, Default)]
pub struct OsmParser {
    /// The element being parsed.
    current: Option<Element>,
    /// The last element that was completely parsed.
    last_completed: Option<Element>,
    /// Whether the last processed line completed `last_completed`.
    ready: bool,
    dropped: u64,
}

impl OsmParser {
    pub fn new() -> Self {
        OsmParser::default()
    }

    /// Tokenizes and processes one line.
    pub fn parse(&mut self, line: &str) -> Result<(), ParseError> {
        let markup = tokenize(line)?;
        self.process(&markup)
    }

    /// Processes an already tokenized markup.
    ///
    /// Declarations leave the parser untouched. Every other markup clears the
    /// ready flag unless it completes an element.
    pub fn process(&mut self, markup: &Markup) -> Result<(), ParseError> {
        match markup.kind {
            MarkupKind::Declaration => (),
            MarkupKind::Start => {
                self.ready = false;
                self.open(markup)?;
            }
            MarkupKind::End => {
                self.ready = false;
                self.close(&markup.name, Close::Explicit);
            }
            MarkupKind::Empty | MarkupKind::Complete => {
                self.ready = false;
                self.open(markup)?;
                self.close(&markup.name, Close::Inline);
            }
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The element completed by the last processed line, if any. Reading it
    /// does not clear it.
    pub fn completed(&self) -> Option<&Element> {
        if self.ready {
            self.last_completed.as_ref()
        } else {
            None
        }
    }

    pub fn last_completed(&self) -> Option<&Element> {
        self.last_completed.as_ref()
    }

    pub fn current(&self) -> Option<&Element> {
        self.current.as_ref()
    }

    /// Number of ways and relations discarded for having too few children,
    /// whether closed that way or left open when the next element started.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn open(&mut self, markup: &Markup) -> Result<(), ParseError> {
        match markup.name.as_str() {
            "node" => {
                let mut node = Node::new(
                    required(markup, "id")?,
                    required(markup, "lat")?,
                    required(markup, "lon")?,
                );
                apply_common(&mut node.info, markup)?;
                self.replace_current(Element::Node(node));
            }
            "way" => {
                let mut way = Way::new(required(markup, "id")?);
                apply_common(&mut way.info, markup)?;
                self.replace_current(Element::Way(way));
            }
            "relation" => {
                let mut relation = Relation::new(required(markup, "id")?);
                apply_common(&mut relation.info, markup)?;
                self.replace_current(Element::Relation(relation));
            }
            "nd" => {
                if let Some(Element::Way(way)) = &mut self.current {
                    way.add_node(ElementKind::Node.global_id(required_str(markup, "ref")?));
                }
            }
            "member" => {
                if let Some(Element::Relation(relation)) = &mut self.current {
                    let kind_name = required_str(markup, "type")?;
                    let kind = ElementKind::from_name(kind_name).ok_or_else(|| ParseError::UnknownMemberType {
                        value: kind_name.to_string(),
                    })?;
                    let element = kind.global_id(required_str(markup, "ref")?);
                    relation.add_member(markup.attribute("role").unwrap_or_default(), element);
                }
            }
            "tag" => {
                if let Some(current) = &mut self.current {
                    let key = required_str(markup, "k")?;
                    current
                        .info_mut()
                        .add_tag(key, markup.attribute("v").unwrap_or_default());
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Starts a new element. An element still open at that point is lost.
    fn replace_current(&mut self, element: Element) {
        if let Some(previous) = self.current.replace(element) {
            let id = previous.global_id();
            if previous.is_complete() {
                warn!(element = id.as_str(); "Element replaced before its end markup");
            } else {
                debug!(element = id.as_str(); "Dropped element with too few children");
                self.dropped += 1;
            }
        }
    }

    fn close(&mut self, name: &str, how: Close) {
        let Some(kind) = ElementKind::from_name(name) else {
            return;
        };
        let Some(current) = self.current.take() else {
            warn!(element = name; "End markup without a matching open element");
            return;
        };

        if current.kind() != kind {
            let open = current.global_id();
            warn!(element = name, open = open.as_str(); "End markup does not match the open element");
            self.current = Some(current);
            return;
        }

        if current.is_complete() {
            self.last_completed = Some(current);
            self.ready = true;
        } else if how == Close::Inline {
            // Children may still follow on the next lines.
            self.current = Some(current);
        } else {
            let id = current.global_id();
            debug!(element = id.as_str(); "Dropped element with too few children");
            self.dropped += 1;
        }
    }
}

fn apply_common(info: &mut ElementInfo, markup: &Markup) -> Result<(), ParseError> {
    info.user = markup.attribute("user").map(str::to_string);
    info.timestamp = markup.attribute("timestamp").map(str::to_string);
    if let Some(uid) = optional(markup, "uid")? {
        info.uid = uid;
    }
    if let Some(visible) = markup.attribute("visible") {
        info.visible = visible.trim().eq_ignore_ascii_case("true");
    }
    if let Some(version) = optional(markup, "version")? {
        info.version = version;
    }
    if let Some(changeset) = optional(markup, "changeset")? {
        info.changeset = changeset;
    }
    Ok(())
}

fn required_str<'m>(markup: &'m Markup, attribute: &'static str) -> Result<&'m str, ParseError> {
    markup.attribute(attribute).ok_or_else(|| ParseError::MissingAttribute {
        element: markup.name.clone(),
        attribute,
    })
}

fn required<T: FromStr>(markup: &Markup, attribute: &'static str) -> Result<T, ParseError> {
    parse_value(markup, attribute, required_str(markup, attribute)?)
}

fn optional<T: FromStr>(markup: &Markup, attribute: &'static str) -> Result<Option<T>, ParseError> {
    markup
        .attribute(attribute)
        .map(|value| parse_value(markup, attribute, value))
        .transpose()
}

fn parse_value<T: FromStr>(markup: &Markup, attribute: &'static str, value: &str) -> Result<T, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidAttribute {
        element: markup.name.clone(),
        attribute,
        value: value.to_string(),
    })
}
