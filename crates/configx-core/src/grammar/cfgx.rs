//! The cfgx grammar: a line-oriented, INI-like configuration syntax.
//!
//! ```text
//! # comments start with '#' or ';'
//! title = "ConfigX"            # trailing comments are allowed
//!
//! [server]                     # section header: prefix for the lines below
//! port = 8080
//! tls.enabled = true           # dotted keys nest further
//! "bind address" = "0.0.0.0"   # quoted segments may hold any character
//!
//! [server.limits]
//! ratio = 0.75
//! burst = 1_000
//! fallback = null
//! ```
//!
//! Scalars:
//!
//! | Form                                   | Value          |
//! |----------------------------------------|----------------|
//! | `"text"` with `\\ \" \n \t \r \0 \u{..}` | `Value::Str`   |
//! | `42`, `-7`, `1_000`                    | `Value::Int`   |
//! | `0.5`, `1e9`, `-2.5E-3`, `inf`, `nan`  | `Value::Float` |
//! | `true`, `false`                        | `Value::Bool`  |
//! | `null`                                 | `Value::Null`  |
//!
//! The same key path may be assigned only once per parse unit.

use std::collections::HashSet;
use std::iter::Enumerate;
use std::str::Lines;

use crate::domain::{KeyPath, Value};
use crate::grammar::{
    AssignmentEvent, EventStream, Grammar, SourcePosition, SyntaxError, SyntaxErrorKind,
};

/// The bundled cfgx syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct CfgxGrammar;

impl CfgxGrammar {
    /// Returns the concrete, cloneable event iterator for `text`.
    ///
    /// Cloning the iterator forks the parse; both copies continue from the
    /// same point independently.
    pub fn parse_events<'a>(&self, text: &'a str) -> CfgxEvents<'a> {
        CfgxEvents {
            lines: text.lines().enumerate(),
            section: Vec::new(),
            seen: HashSet::new(),
            finished: false,
        }
    }
}

impl Grammar for CfgxGrammar {
    fn name(&self) -> &'static str {
        "cfgx"
    }

    fn events<'a>(&'a self, text: &'a str) -> EventStream<'a> {
        Box::new(self.parse_events(text))
    }
}

/// Lazy iterator over the assignments in a cfgx document.
///
/// Yields `Err` once for the first syntax error and then stops.
#[derive(Debug, Clone)]
pub struct CfgxEvents<'a> {
    lines: Enumerate<Lines<'a>>,
    section: Vec<String>,
    seen: HashSet<KeyPath>,
    finished: bool,
}

impl Iterator for CfgxEvents<'_> {
    type Item = Result<AssignmentEvent, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some((idx, line)) = self.lines.next() {
            match self.parse_line(idx + 1, line) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }

        self.finished = true;
        None
    }
}

impl CfgxEvents<'_> {
    /// Parses one line.  Returns `Ok(None)` for blank lines, comments, and
    /// section headers.
    fn parse_line(&mut self, line_no: usize, line: &str) -> Result<Option<AssignmentEvent>, SyntaxError> {
        let mut cur = LineCursor::new(line_no, line);
        cur.skip_ws();

        match cur.peek() {
            None | Some('#') | Some(';') => Ok(None),
            Some('[') => {
                self.section = parse_section_header(&mut cur)?;
                Ok(None)
            }
            Some(_) => self.parse_assignment(&mut cur).map(Some),
        }
    }

    fn parse_assignment(&mut self, cur: &mut LineCursor) -> Result<AssignmentEvent, SyntaxError> {
        let position = cur.position();
        let key = parse_key(cur, &['='])?;

        cur.skip_ws();
        if !cur.eat('=') {
            return Err(cur.error(SyntaxErrorKind::MissingEquals));
        }
        cur.skip_ws();

        let value = parse_value(cur)?;
        expect_line_end(cur)?;

        let mut segments = self.section.clone();
        segments.extend(key);
        let path = KeyPath::from_segments(segments)
            .map_err(|_| SyntaxError::new(position, SyntaxErrorKind::InvalidKey("empty key")))?;

        if !self.seen.insert(path.clone()) {
            return Err(SyntaxError::new(
                position,
                SyntaxErrorKind::DuplicateKey(path.to_string()),
            ));
        }

        Ok(AssignmentEvent {
            path,
            value,
            position,
        })
    }
}

// ── Line scanner ──────────────────────────────────────────────────────────────

struct LineCursor {
    line_no: usize,
    chars: Vec<char>,
    pos: usize,
}

impl LineCursor {
    fn new(line_no: usize, line: &str) -> Self {
        Self {
            line_no,
            chars: line.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn position(&self) -> SourcePosition {
        self.position_at(self.pos)
    }

    fn position_at(&self, pos: usize) -> SourcePosition {
        SourcePosition {
            line: self.line_no,
            column: pos + 1,
        }
    }

    fn error(&self, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(self.position(), kind)
    }

    fn error_at(&self, pos: usize, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(self.position_at(pos), kind)
    }

    fn rest(&self) -> String {
        self.chars[self.pos.min(self.chars.len())..].iter().collect()
    }
}

pub(crate) fn is_bare_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

// ── Productions ───────────────────────────────────────────────────────────────

fn parse_section_header(cur: &mut LineCursor) -> Result<Vec<String>, SyntaxError> {
    let open = cur.pos;
    cur.bump(); // '['
    cur.skip_ws();

    if cur.peek().is_none() {
        return Err(cur.error_at(open, SyntaxErrorKind::UnterminatedSection));
    }
    if cur.peek() == Some(']') {
        return Err(cur.error(SyntaxErrorKind::InvalidKey("empty section header")));
    }

    let segments = parse_key(cur, &[']'])?;
    cur.skip_ws();
    if !cur.eat(']') {
        return Err(match cur.peek() {
            None => cur.error_at(open, SyntaxErrorKind::UnterminatedSection),
            Some(_) => cur.error(SyntaxErrorKind::InvalidKey("unexpected character in section header")),
        });
    }
    expect_line_end(cur)?;
    Ok(segments)
}

/// Parses `seg(.seg)*`.  `terminators` are the characters allowed to follow
/// the key; anything else after a segment is an invalid key.
fn parse_key(cur: &mut LineCursor, terminators: &[char]) -> Result<Vec<String>, SyntaxError> {
    let mut segments = Vec::new();
    loop {
        cur.skip_ws();
        let start = cur.pos;
        let segment = match cur.peek() {
            Some('"') => {
                let s = parse_quoted(cur)?;
                if s.is_empty() {
                    return Err(cur.error_at(start, SyntaxErrorKind::InvalidKey("empty quoted segment")));
                }
                s
            }
            Some(c) if is_bare_char(c) => {
                let mut s = String::new();
                while let Some(c) = cur.peek().filter(|c| is_bare_char(*c)) {
                    s.push(c);
                    cur.pos += 1;
                }
                s
            }
            _ => return Err(cur.error(SyntaxErrorKind::InvalidKey("expected a key segment"))),
        };
        segments.push(segment);

        cur.skip_ws();
        if cur.eat('.') {
            continue;
        }
        match cur.peek() {
            Some(c) if terminators.contains(&c) => return Ok(segments),
            None => return Ok(segments),
            Some(_) => {
                return Err(cur.error(SyntaxErrorKind::InvalidKey("unexpected character in key")))
            }
        }
    }
}

/// Parses a double-quoted string starting at the opening quote.
fn parse_quoted(cur: &mut LineCursor) -> Result<String, SyntaxError> {
    let open = cur.pos;
    cur.bump(); // opening quote

    let mut out = String::new();
    loop {
        let Some(c) = cur.bump() else {
            return Err(cur.error_at(open, SyntaxErrorKind::UnterminatedString));
        };
        match c {
            '"' => return Ok(out),
            '\\' => out.push(parse_escape(cur)?),
            c => out.push(c),
        }
    }
}

/// Parses the escape after a backslash (the backslash is already consumed).
fn parse_escape(cur: &mut LineCursor) -> Result<char, SyntaxError> {
    let backslash = cur.pos - 1;
    let Some(c) = cur.bump() else {
        return Err(cur.error_at(backslash, SyntaxErrorKind::InvalidEscape("\\".to_string())));
    };
    let simple = match c {
        '\\' => Some('\\'),
        '"' => Some('"'),
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        _ => None,
    };
    if let Some(ch) = simple {
        return Ok(ch);
    }
    if c != 'u' {
        return Err(cur.error_at(backslash, SyntaxErrorKind::InvalidEscape(format!("\\{c}"))));
    }

    // \u{XXXX}
    let invalid = |cur: &LineCursor| {
        let text: String = cur.chars[backslash..cur.pos.min(cur.chars.len())].iter().collect();
        cur.error_at(backslash, SyntaxErrorKind::InvalidEscape(text))
    };
    if !cur.eat('{') {
        return Err(invalid(&*cur));
    }
    let mut hex = String::new();
    while let Some(h) = cur.peek().filter(char::is_ascii_hexdigit) {
        hex.push(h);
        cur.pos += 1;
    }
    if !cur.eat('}') || hex.is_empty() || hex.len() > 6 {
        return Err(invalid(&*cur));
    }
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| invalid(&*cur))
}

fn parse_value(cur: &mut LineCursor) -> Result<Value, SyntaxError> {
    match cur.peek() {
        None | Some('#') => Err(cur.error(SyntaxErrorKind::EmptyValue)),
        Some('"') => parse_quoted(cur).map(Value::Str),
        Some(_) => {
            let start = cur.pos;
            let mut token = String::new();
            while let Some(c) = cur.peek().filter(|c| !c.is_whitespace() && *c != '#') {
                token.push(c);
                cur.pos += 1;
            }
            classify_scalar(&token)
                .ok_or_else(|| cur.error_at(start, SyntaxErrorKind::InvalidValue(token)))
        }
    }
}

/// Only whitespace or a comment may follow a complete line.
fn expect_line_end(cur: &mut LineCursor) -> Result<(), SyntaxError> {
    cur.skip_ws();
    match cur.peek() {
        None | Some('#') => Ok(()),
        Some(_) => Err(cur.error(SyntaxErrorKind::TrailingCharacters(cur.rest()))),
    }
}

/// Recognises an unquoted scalar token.
pub(crate) fn classify_scalar(token: &str) -> Option<Value> {
    match token {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        "inf" | "+inf" => return Some(Value::Float(f64::INFINITY)),
        "-inf" => return Some(Value::Float(f64::NEG_INFINITY)),
        "nan" | "+nan" => return Some(Value::Float(f64::NAN)),
        "-nan" => return Some(Value::Float(-f64::NAN)),
        _ => {}
    }
    parse_integer(token)
        .map(Value::Int)
        .or_else(|| parse_float(token).map(Value::Float))
}

fn parse_integer(token: &str) -> Option<i64> {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    let first_is_digit = digits.chars().next().is_some_and(|c| c.is_ascii_digit());
    let last_is_digit = digits.chars().last().is_some_and(|c| c.is_ascii_digit());
    if !first_is_digit || !last_is_digit || digits.contains("__") {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return None;
    }
    let cleaned: String = token.chars().filter(|c| *c != '_').collect();
    cleaned.parse().ok()
}

fn parse_float(token: &str) -> Option<f64> {
    let body = token.strip_prefix(['+', '-']).unwrap_or(token);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) {
        return None;
    }
    if frac_part.is_some_and(|f| !all_digits(f)) {
        return None;
    }
    if let Some(exp) = exponent {
        let exp_digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if !all_digits(exp_digits) {
            return None;
        }
    }
    if frac_part.is_none() && exponent.is_none() {
        // A plain digit run is an integer; reaching here means it overflowed.
        return None;
    }
    token.parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
