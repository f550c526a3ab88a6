//! Character-Class Service: constant symbol tables consumed by the regex
//! compiler.
//!
//! The engine treats character-class data as an external lookup service with a
//! fixed contract: a named class in, a set of symbols out. The tables here are
//! the engine's symbol universe; a host that needs richer Unicode category
//! data supplies its own machine built over a wider alphabet — nothing in the
//! automata layers depends on which symbols these tables contain.

use std::collections::BTreeSet;

/// Named character classes resolvable by the compiler (`\d`, `\w`, `\s`, and
/// the `.` / negated-class universe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Decimal digits `0-9`.
    Digit,
    /// Word characters `A-Z a-z 0-9 _`.
    Word,
    /// Space, tab, newline, carriage return.
    Whitespace,
    /// The printable universe: ASCII `0x20..=0x7E` plus tab, newline,
    /// carriage return. `.` and `[^...]` are complements over this set.
    Printable,
}

/// Look up the symbol set for a named class.
pub fn symbols(kind: ClassKind) -> BTreeSet<char> {
    match kind {
        ClassKind::Digit => ('0'..='9').collect(),
        ClassKind::Word => ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(std::iter::once('_'))
            .collect(),
        ClassKind::Whitespace => [' ', '\t', '\n', '\r'].into_iter().collect(),
        ClassKind::Printable => ('\u{20}'..='\u{7E}')
            .chain(['\t', '\n', '\r'])
            .collect(),
    }
}

/// The symbol set matched by `.`: every printable symbol that is not
/// whitespace.
pub fn dot_symbols() -> BTreeSet<char> {
    let ws = symbols(ClassKind::Whitespace);
    symbols(ClassKind::Printable)
        .into_iter()
        .filter(|c| !ws.contains(c))
        .collect()
}

/// Complement a member set over the printable universe (negated classes).
pub fn complement(members: &BTreeSet<char>) -> BTreeSet<char> {
    symbols(ClassKind::Printable)
        .into_iter()
        .filter(|c| !members.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_class() {
        let digits = symbols(ClassKind::Digit);
        assert_eq!(digits.len(), 10);
        assert!(digits.contains(&'0') && digits.contains(&'9'));
        assert!(!digits.contains(&'a'));
    }

    #[test]
    fn test_word_class() {
        let word = symbols(ClassKind::Word);
        assert!(word.contains(&'_'));
        assert!(word.contains(&'Z'));
        assert!(!word.contains(&' '));
    }

    #[test]
    fn test_dot_excludes_whitespace() {
        let dot = dot_symbols();
        assert!(dot.contains(&'x') && dot.contains(&'+'));
        assert!(!dot.contains(&' '), "dot must not match whitespace");
        assert!(!dot.contains(&'\n'));
    }

    #[test]
    fn test_complement() {
        let mut members = BTreeSet::new();
        members.insert('a');
        let rest = complement(&members);
        assert!(!rest.contains(&'a'));
        assert!(rest.contains(&'b'));
    }
}
