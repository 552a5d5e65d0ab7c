pub mod attributes;
pub mod automaton;
pub mod markup;

pub use self::markup::{tokenize, Markup, MarkupError, MarkupKind};
