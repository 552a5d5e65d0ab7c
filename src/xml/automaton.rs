//! A small deterministic character automaton.
//!
//! The graph is described as plain data (a state table and a transition table)
//! and checked once when built: no two transitions leaving the same state may
//! accept the same character. Evaluating an input only allocates the capture
//! buffers, so a single built automaton can be shared by every call.

use std::fmt;

use thiserror::Error;

pub type StateId = usize;

/// Single-character pattern attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Exact(char),
    /// Inclusive range, e.g. `Range('a', 'z')`.
    Range(char, char),
    /// XML whitespace: space, tab, carriage return, line feed.
    Whitespace,
    /// First character of a name: ASCII letter or `_`.
    NameStart,
    /// Following characters of a name: ASCII alphanumeric, `_`, `-`, `.`, `:`.
    NameChar,
    /// Anything except the listed characters.
    NoneOf(&'static [char]),
}

impl CharClass {
    pub fn matches(&self, c: char) -> bool {
        match *self {
            CharClass::Exact(expected) => c == expected,
            CharClass::Range(low, high) => (low..=high).contains(&c),
            CharClass::Whitespace => matches!(c, ' ' | '\t' | '\r' | '\n'),
            CharClass::NameStart => c.is_ascii_alphabetic() || c == '_',
            CharClass::NameChar => c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'),
            CharClass::NoneOf(excluded) => !excluded.contains(&c),
        }
    }

    /// The accepted characters as sorted, disjoint inclusive ranges.
    fn ranges(&self) -> Vec<(char, char)> {
        match *self {
            CharClass::Exact(c) => vec![(c, c)],
            CharClass::Range(low, high) if low <= high => vec![(low, high)],
            CharClass::Range(..) => Vec::new(),
            CharClass::Whitespace => vec![('\t', '\n'), ('\r', '\r'), (' ', ' ')],
            CharClass::NameStart => vec![('A', 'Z'), ('_', '_'), ('a', 'z')],
            CharClass::NameChar => vec![('-', '.'), ('0', ':'), ('A', 'Z'), ('_', '_'), ('a', 'z')],
            CharClass::NoneOf(excluded) => {
                let mut excluded = excluded.to_vec();
                excluded.sort_unstable();
                excluded.dedup();

                let mut ranges = Vec::new();
                let mut low = Some('\0');
                for c in excluded {
                    if let (Some(start), Some(end)) = (low, predecessor(c)) {
                        if start <= end {
                            ranges.push((start, end));
                        }
                    }
                    low = successor(c);
                }
                if let Some(start) = low {
                    ranges.push((start, char::MAX));
                }
                ranges
            }
        }
    }

    /// Returns the smallest character accepted by both classes, if any.
    fn overlap(&self, other: &CharClass) -> Option<char> {
        let (left, right) = (self.ranges(), other.ranges());
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            let low = left[i].0.max(right[j].0);
            let high = left[i].1.min(right[j].1);
            if low <= high {
                return Some(low);
            }
            if left[i].1 < right[j].1 {
                i += 1;
            } else {
                j += 1;
            }
        }
        None
    }
}

fn successor(c: char) -> Option<char> {
    match c {
        '\u{d7ff}' => Some('\u{e000}'),
        _ => char::from_u32(c as u32 + 1),
    }
}

fn predecessor(c: char) -> Option<char> {
    match c {
        '\u{e000}' => Some('\u{d7ff}'),
        _ => (c as u32).checked_sub(1).and_then(char::from_u32),
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharClass::Exact(c) => write!(f, "{:?}", c),
            CharClass::Range(low, high) => write!(f, "[{:?}-{:?}]", low, high),
            CharClass::Whitespace => write!(f, "whitespace"),
            CharClass::NameStart => write!(f, "name start"),
            CharClass::NameChar => write!(f, "name char"),
            CharClass::NoneOf(excluded) => write!(f, "none of {:?}", excluded),
        }
    }
}

/// One row of the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSpec {
    pub accepting: bool,
    /// Index of the capture buffer receiving each character consumed on entry.
    pub capture: Option<usize>,
}

impl StateSpec {
    pub const fn new(accepting: bool, capture: Option<usize>) -> Self {
        StateSpec { accepting, capture }
    }
}

/// One row of the transition table. `action` is reported to the caller exactly
/// once each time the transition is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionSpec<A> {
    pub from: StateId,
    pub pattern: CharClass,
    pub to: StateId,
    pub action: Option<A>,
}

impl<A> TransitionSpec<A> {
    pub const fn new(from: StateId, pattern: CharClass, to: StateId) -> Self {
        TransitionSpec { from, pattern, to, action: None }
    }

    pub const fn with_action(from: StateId, pattern: CharClass, to: StateId, action: A) -> Self {
        TransitionSpec { from, pattern, to, action: Some(action) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomatonError {
    #[error("the automaton has no states")]
    Empty,
    #[error("transition refers to unknown state {state}")]
    UnknownState { state: StateId },
    #[error("state {state} refers to unknown capture buffer {capture}")]
    UnknownCapture { state: StateId, capture: usize },
    #[error("state {state} has overlapping transitions {first} and {second} (both accept {witness:?})")]
    Ambiguous {
        state: StateId,
        first: String,
        second: String,
        witness: char,
    },
}

#[derive(Debug, Clone)]
struct Edge<A> {
    pattern: CharClass,
    to: StateId,
    action: Option<A>,
}

/// Buffers filled while evaluating an input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    buffers: Vec<String>,
}

impl Captures {
    pub fn new(count: usize) -> Self {
        Captures {
            buffers: vec![String::new(); count],
        }
    }

    pub fn get(&self, index: usize) -> &str {
        self.buffers.get(index).map_or("", String::as_str)
    }

    pub fn into_buffers(self) -> Vec<String> {
        self.buffers
    }

    fn push(&mut self, index: usize, c: char) {
        if let Some(buffer) = self.buffers.get_mut(index) {
            buffer.push(c);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Automaton<A> {
    accepting: Vec<bool>,
    captures: Vec<Option<usize>>,
    edges: Vec<Vec<Edge<A>>>,
    start: StateId,
    capture_count: usize,
}

impl<A: Copy> Automaton<A> {
    /// Builds an automaton from its tables. `capture_count` is the number of
    /// distinct capture buffers referenced by `states`.
    pub fn from_table(
        states: &[StateSpec],
        transitions: &[TransitionSpec<A>],
        start: StateId,
        capture_count: usize,
    ) -> Result<Self, AutomatonError> {
        if states.is_empty() {
            return Err(AutomatonError::Empty);
        }
        if start >= states.len() {
            return Err(AutomatonError::UnknownState { state: start });
        }
        for (state, spec) in states.iter().enumerate() {
            if let Some(capture) = spec.capture {
                if capture >= capture_count {
                    return Err(AutomatonError::UnknownCapture { state, capture });
                }
            }
        }

        let mut edges: Vec<Vec<Edge<A>>> = vec![Vec::new(); states.len()];
        for transition in transitions {
            if transition.to >= states.len() {
                return Err(AutomatonError::UnknownState { state: transition.to });
            }
            let outgoing = edges
                .get_mut(transition.from)
                .ok_or(AutomatonError::UnknownState { state: transition.from })?;

            for existing in outgoing.iter() {
                if let Some(witness) = existing.pattern.overlap(&transition.pattern) {
                    return Err(AutomatonError::Ambiguous {
                        state: transition.from,
                        first: existing.pattern.to_string(),
                        second: transition.pattern.to_string(),
                        witness,
                    });
                }
            }

            outgoing.push(Edge {
                pattern: transition.pattern,
                to: transition.to,
                action: transition.action,
            });
        }

        Ok(Automaton {
            accepting: states.iter().map(|s| s.accepting).collect(),
            captures: states.iter().map(|s| s.capture).collect(),
            edges,
            start,
            capture_count,
        })
    }

    pub fn state_count(&self) -> usize {
        self.accepting.len()
    }

    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// Accepts or rejects `input`, discarding captures and actions.
    pub fn evaluate(&self, input: &str) -> bool {
        let mut captures = Captures::new(self.capture_count);
        self.run(input, &mut captures, |_| ())
    }

    /// Consumes `input` from the start state. Every consumed character is
    /// appended to the capture buffer of the state it leads into, and the
    /// action of each taken transition is passed to `on_action`. There is no
    /// backtracking: a character without a matching transition rejects.
    pub fn run<F>(&self, input: &str, captures: &mut Captures, mut on_action: F) -> bool
    where
        F: FnMut(A),
    {
        let mut state = self.start;

        for c in input.chars() {
            let Some(edge) = self
                .edges
                .get(state)
                .and_then(|outgoing| outgoing.iter().find(|edge| edge.pattern.matches(c)))
            else {
                return false;
            };

            if let Some(Some(capture)) = self.captures.get(edge.to) {
                captures.push(*capture, c);
            }
            if let Some(action) = edge.action {
                on_action(action);
            }
            state = edge.to;
        }

        self.accepting.get(state).copied().unwrap_or(false)
    }
}
