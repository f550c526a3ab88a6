//! Regex compiler: pattern → NFA via recursive descent + Thompson operators.
//!
//! Grammar, strict left-to-right, no backtracking in the parser itself:
//!
//! ```text
//! Alternation   := Concatenation ('|' Concatenation)*
//! Concatenation := Repetition+
//! Repetition    := Atom ('*' | '+' | '?' | '{' Bounds '}')?
//! Atom          := '(' Alternation ')' | '[' Class ']' | '\' Escape
//!                | '.' | Literal
//! ```
//!
//! ## Supported constructs
//!
//! | Feature          | Syntax                  | Notes                        |
//! |------------------|-------------------------|------------------------------|
//! | Literal char     | `a`, `1`, `_`           |                              |
//! | Escaped char     | `\.` `\\` `\[` `\*` ... | any escaped char is itself   |
//! | Escape classes   | `\d` `\w` `\s`          | via the Character-Class tables |
//! | Control escapes  | `\n` `\r` `\t`          |                              |
//! | Character class  | `[abc]` `[a-z0-9]`      | ranges, escaped members      |
//! | Negated class    | `[^abc]`                | complement over printable    |
//! | Dot              | `.`                     | printable minus whitespace   |
//! | Grouping         | `(...)`                 | non-capturing                |
//! | Alternation      | <code>a&#124;b</code>   |                              |
//! | Quantifiers      | `*` `+` `?`             | greedy                       |
//! | Bounded repeat   | `{n}` `{n,}` `{n,m}`    | by fragment cloning          |
//!
//! Not supported: anchors, backreferences, lookaround, lazy quantifiers,
//! Unicode categories.

use std::collections::BTreeSet;

use super::nfa;
use super::{Nfa, Style};
use crate::charclass::{self, ClassKind};

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

/// Error from pattern compilation. Positions are char offsets into the
/// pattern. Compilation of the offending rule aborts; the engine never
/// guesses intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The pattern ended where more input was required.
    UnexpectedEnd { position: usize },
    /// A character that cannot start or continue the current production:
    /// a bare `*` `+` `?` `{` with nothing to repeat, or `)` `|` `]` out of
    /// place.
    UnexpectedChar { position: usize, found: char },
    /// An empty group `()`.
    EmptyGroup { position: usize },
    /// An empty character class `[]` (or `[^]`).
    EmptyClass { position: usize },
    /// A class range whose start code point exceeds its end code point.
    InvalidRange { position: usize, start: char, end: char },
    /// Malformed or inverted `{}` repetition bounds.
    InvalidRepeat { position: usize },
}

impl CompileError {
    /// The char offset the error was detected at.
    pub fn position(&self) -> usize {
        match self {
            CompileError::UnexpectedEnd { position }
            | CompileError::UnexpectedChar { position, .. }
            | CompileError::EmptyGroup { position }
            | CompileError::EmptyClass { position }
            | CompileError::InvalidRange { position, .. }
            | CompileError::InvalidRepeat { position } => *position,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnexpectedEnd { position } => {
                write!(f, "unexpected end of pattern at {}", position)
            },
            CompileError::UnexpectedChar { position, found } => {
                write!(f, "unexpected character '{}' at {}", found, position)
            },
            CompileError::EmptyGroup { position } => {
                write!(f, "empty group at {}", position)
            },
            CompileError::EmptyClass { position } => {
                write!(f, "empty character class at {}", position)
            },
            CompileError::InvalidRange { position, start, end } => {
                write!(f, "invalid range '{}-{}' at {}", start, end, position)
            },
            CompileError::InvalidRepeat { position } => {
                write!(f, "invalid repetition bounds at {}", position)
            },
        }
    }
}

impl std::error::Error for CompileError {}

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Compile a pattern into an NFA whose accept states all carry `style` at
/// priority 0. Priorities are overwritten later by [`nfa::union`].
///
/// # Errors
///
/// Returns [`CompileError`] on malformed syntax; nothing is recovered
/// internally.
pub fn compile(pattern: &str, style: Style) -> Result<Nfa, CompileError> {
    let mut parser = Parser {
        chars: pattern.chars().collect(),
        pos: 0,
        style,
    };
    let nfa = parser.parse_alternation()?;
    match parser.peek() {
        None => Ok(nfa),
        // parse_alternation only stops early on ')' or another stray
        // terminator; anything left over is misplaced.
        Some(found) => Err(CompileError::UnexpectedChar { position: parser.pos, found }),
    }
}

/// Check a pattern without keeping the automaton.
pub fn validate(pattern: &str) -> Result<(), CompileError> {
    compile(pattern, Style::new("_")).map(|_| ())
}

// ══════════════════════════════════════════════════════════════════════════════
// Parser
// ══════════════════════════════════════════════════════════════════════════════

struct Parser {
    chars: Vec<char>,
    pos: usize,
    style: Style,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// `Alternation := Concatenation ('|' Concatenation)*`
    fn parse_alternation(&mut self) -> Result<Nfa, CompileError> {
        let mut result = self.parse_concatenation()?;
        while self.peek() == Some('|') {
            self.pos += 1;
            let rhs = self.parse_concatenation()?;
            result = nfa::alt(&result, &rhs);
        }
        Ok(result)
    }

    /// `Concatenation := Repetition+`
    fn parse_concatenation(&mut self) -> Result<Nfa, CompileError> {
        let mut result = self.parse_repetition()?;
        loop {
            match self.peek() {
                None | Some('|') | Some(')') => return Ok(result),
                _ => {
                    let next = self.parse_repetition()?;
                    result = nfa::concat(&result, &next);
                },
            }
        }
    }

    /// `Repetition := Atom ('*' | '+' | '?' | '{' Bounds '}')?`
    fn parse_repetition(&mut self) -> Result<Nfa, CompileError> {
        let atom = self.parse_atom()?;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(nfa::star(&atom))
            },
            Some('+') => {
                self.pos += 1;
                Ok(nfa::plus(&atom))
            },
            Some('?') => {
                self.pos += 1;
                Ok(nfa::optional(&atom))
            },
            Some('{') => {
                let (min, max) = self.parse_bounds()?;
                Ok(self.repeat(&atom, min, max))
            },
            _ => Ok(atom),
        }
    }

    /// `Atom := '(' Alternation ')' | '[' Class ']' | '\' Escape | '.' | Literal`
    fn parse_atom(&mut self) -> Result<Nfa, CompileError> {
        let position = self.pos;
        match self.bump() {
            None => Err(CompileError::UnexpectedEnd { position }),
            Some('(') => {
                if self.peek() == Some(')') {
                    return Err(CompileError::EmptyGroup { position });
                }
                let inner = self.parse_alternation()?;
                match self.bump() {
                    Some(')') => Ok(inner),
                    None => Err(CompileError::UnexpectedEnd { position: self.pos }),
                    Some(found) => {
                        Err(CompileError::UnexpectedChar { position: self.pos - 1, found })
                    },
                }
            },
            Some('[') => self.parse_class(position),
            Some('\\') => {
                let set = self.parse_escape()?;
                Ok(nfa::symbol_set(&set, self.style.clone()))
            },
            Some('.') => Ok(nfa::symbol_set(&charclass::dot_symbols(), self.style.clone())),
            Some(found @ (')' | '|' | ']' | '*' | '+' | '?' | '{')) => {
                Err(CompileError::UnexpectedChar { position, found })
            },
            Some(literal) => Ok(nfa::symbol(literal, self.style.clone())),
        }
    }

    /// Resolve a `\x` escape to its symbol set. Named classes go through the
    /// Character-Class Service; any other escaped character stands for itself.
    fn parse_escape(&mut self) -> Result<BTreeSet<char>, CompileError> {
        match self.bump() {
            None => Err(CompileError::UnexpectedEnd { position: self.pos }),
            Some('d') => Ok(charclass::symbols(ClassKind::Digit)),
            Some('w') => Ok(charclass::symbols(ClassKind::Word)),
            Some('s') => Ok(charclass::symbols(ClassKind::Whitespace)),
            Some('n') => Ok(BTreeSet::from(['\n'])),
            Some('r') => Ok(BTreeSet::from(['\r'])),
            Some('t') => Ok(BTreeSet::from(['\t'])),
            Some(literal) => Ok(BTreeSet::from([literal])),
        }
    }

    /// `Class := '^'? Member+` where `Member := item | item '-' item`.
    /// `open` is the position of the opening `[`.
    fn parse_class(&mut self, open: usize) -> Result<Nfa, CompileError> {
        let negated = if self.peek() == Some('^') {
            self.pos += 1;
            true
        } else {
            false
        };
        if self.peek() == Some(']') {
            return Err(CompileError::EmptyClass { position: open });
        }

        let mut members: BTreeSet<char> = BTreeSet::new();
        loop {
            match self.peek() {
                None => return Err(CompileError::UnexpectedEnd { position: self.pos }),
                Some(']') => {
                    self.pos += 1;
                    break;
                },
                _ => {
                    let item_pos = self.pos;
                    let set = self.parse_class_item()?;
                    // 'x-y' is a range when both endpoints are single chars
                    // and the '-' is not the closing member; elsewhere '-' is
                    // an ordinary member.
                    let lo = if set.len() == 1 { set.iter().next().copied() } else { None };
                    if let (Some(lo), Some('-')) = (lo, self.peek()) {
                        if self.chars.get(self.pos + 1) == Some(&']') {
                            members.insert(lo);
                            continue;
                        }
                        self.pos += 1;
                        let hi_set = match self.peek() {
                            None => {
                                return Err(CompileError::UnexpectedEnd { position: self.pos })
                            },
                            _ => self.parse_class_item()?,
                        };
                        if hi_set.len() != 1 {
                            // a multi-char escape class cannot close a range
                            return Err(CompileError::InvalidRange {
                                position: item_pos,
                                start: lo,
                                end: '-',
                            });
                        }
                        let hi = *hi_set.iter().next().expect("nonempty set");
                        if lo > hi {
                            return Err(CompileError::InvalidRange {
                                position: item_pos,
                                start: lo,
                                end: hi,
                            });
                        }
                        members.extend(lo..=hi);
                    } else {
                        members.extend(set);
                    }
                },
            }
        }

        let members = if negated { charclass::complement(&members) } else { members };
        Ok(nfa::symbol_set(&members, self.style.clone()))
    }

    /// One class member: an escaped item or a literal char.
    fn parse_class_item(&mut self) -> Result<BTreeSet<char>, CompileError> {
        match self.bump() {
            None => Err(CompileError::UnexpectedEnd { position: self.pos }),
            Some('\\') => self.parse_escape(),
            Some(c) => Ok(BTreeSet::from([c])),
        }
    }

    /// `Bounds := Int (',' Int?)?` between `{` and `}`.
    fn parse_bounds(&mut self) -> Result<(u32, Option<u32>), CompileError> {
        let open = self.pos;
        self.pos += 1; // consume '{'
        let min = self.parse_int().ok_or(CompileError::InvalidRepeat { position: open })?;
        let bounds = match self.peek() {
            Some('}') => (min, Some(min)),
            Some(',') => {
                self.pos += 1;
                match self.peek() {
                    Some('}') => (min, None),
                    _ => {
                        let max = self
                            .parse_int()
                            .ok_or(CompileError::InvalidRepeat { position: open })?;
                        if max < min {
                            return Err(CompileError::InvalidRepeat { position: open });
                        }
                        (min, Some(max))
                    },
                }
            },
            _ => return Err(CompileError::InvalidRepeat { position: open }),
        };
        match self.bump() {
            Some('}') => Ok(bounds),
            _ => Err(CompileError::InvalidRepeat { position: open }),
        }
    }

    fn parse_int(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        self.chars[start..self.pos].iter().collect::<String>().parse().ok()
    }

    /// Bounded repetition by fragment cloning: `min` mandatory copies, then
    /// either a star tail (`{n,}`) or `max - min` optional copies.
    fn repeat(&self, atom: &Nfa, min: u32, max: Option<u32>) -> Nfa {
        let mut parts: Vec<Nfa> = Vec::new();
        for _ in 0..min {
            parts.push(atom.clone());
        }
        match max {
            None => parts.push(nfa::star(atom)),
            Some(max) => {
                for _ in min..max {
                    parts.push(nfa::optional(atom));
                }
            },
        }
        let mut iter = parts.into_iter();
        match iter.next() {
            // {0} / {0,0}: matches exactly the empty string
            None => nfa::empty(self.style.clone()),
            Some(first) => iter.fold(first, |acc, next| nfa::concat(&acc, &next)),
        }
    }
}
