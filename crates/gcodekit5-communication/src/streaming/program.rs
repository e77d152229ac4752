//! The normalized, line-numbered program a streaming run sends.
//!
//! Loading consolidates every comment-stripping rule the wire protocol
//! needs into one place: a prior `N<digits>` prefix is dropped (the engine
//! assigns its own at send time), parenthesized `(...)` comments and
//! `;`-to-end-of-line comments are removed, and lines that are empty after
//! normalization are dropped entirely — they would contribute no wire
//! traffic.

use serde::{Deserialize, Serialize};

/// One normalized line of a loaded program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramLine {
    /// 0-based position in the program; stable for the program's lifetime.
    pub index: usize,
    /// The cleaned command text: no comments, no line-number prefix, trimmed.
    pub payload: String,
}

/// An ordered, immutable sequence of lines to stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    lines: Vec<ProgramLine>,
}

impl Program {
    /// Normalize `text` into a `Program`. Never fails: malformed or empty
    /// rows are simply dropped, per the Program Buffer's contract.
    pub fn load(text: &str) -> Self {
        let lines = text
            .lines()
            .filter_map(normalize_line)
            .enumerate()
            .map(|(index, payload)| ProgramLine { index, payload })
            .collect();
        Self { lines }
    }

    /// Total number of lines in the program.
    pub fn total(&self) -> usize {
        self.lines.len()
    }

    /// Whether the program has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The line at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&ProgramLine> {
        self.lines.get(index)
    }
}

/// Strip a prior `N<digits>` prefix, comments, and outer whitespace; return
/// `None` if nothing is left.
fn normalize_line(raw: &str) -> Option<String> {
    let without_number = strip_line_number(raw.trim());
    let without_comments = strip_comments(without_number);
    let trimmed = without_comments.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn strip_line_number(s: &str) -> &str {
    let bytes = s.as_bytes();
    if !bytes.first().is_some_and(|b| *b == b'N' || *b == b'n') {
        return s;
    }
    let mut end = 1;
    while bytes.get(end).is_some_and(|b| b.is_ascii_digit()) {
        end += 1;
    }
    if end == 1 {
        s
    } else {
        s[end..].trim_start()
    }
}

/// Remove parenthesized `(...)` comments (non-nested) and `;`-to-end-of-line
/// comments.
fn strip_comments(s: &str) -> String {
    let mut without_parens = String::with_capacity(s.len());
    let mut depth = 0u32;
    for ch in s.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => without_parens.push(ch),
            _ => {}
        }
    }
    match without_parens.find(';') {
        Some(pos) => without_parens[..pos].to_string(),
        None => without_parens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_semicolon_comments() {
        let p = Program::load("G1 X1 Y2 ; move\nG1 X3");
        assert_eq!(p.total(), 2);
        assert_eq!(p.get(0).unwrap().payload, "G1 X1 Y2");
    }

    #[test]
    fn strips_paren_comments() {
        let p = Program::load("G1 (feed move) X1 Y2");
        assert_eq!(p.get(0).unwrap().payload, "G1  X1 Y2");
    }

    #[test]
    fn drops_empty_and_pure_comment_lines() {
        let p = Program::load("G1 X1\n\n; just a comment\n(also a comment)\nG1 X2");
        assert_eq!(p.total(), 2);
        assert_eq!(p.get(1).unwrap().payload, "G1 X2");
    }

    #[test]
    fn strips_prior_line_number_prefix() {
        let p = Program::load("N10 G1 X1 Y2");
        assert_eq!(p.get(0).unwrap().payload, "G1 X1 Y2");
    }

    #[test]
    fn indices_are_contiguous() {
        let p = Program::load("G1 X1\nG1 X2\nG1 X3");
        for (i, line) in (0..p.total()).zip(0..) {
            assert_eq!(p.get(i).unwrap().index, line);
        }
    }

    #[test]
    fn load_is_deterministic() {
        let text = "G1 X1 ; a\nN5 G1 X2 (b)\n\nG1 X3";
        assert_eq!(Program::load(text), Program::load(text));
    }

    #[test]
    fn comment_stripping_is_idempotent() {
        let once = Program::load("G1 X1 ; a (b)");
        let twice = Program::load(&once.get(0).unwrap().payload);
        assert_eq!(once, twice);
    }
}
