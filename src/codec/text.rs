//! Text plumbing shared by the table codecs: a line cursor, a word/number
//! tokenizer and a handful of number formatting helpers.
//!
//! # Input decoding
//! Legacy table files are plain ASCII but occasionally carry Latin-1 bytes in
//! comments.  Input is read as bytes and converted lossily so a stray byte
//! never aborts a decode.

use std::io::{self, BufRead};

use super::FormatError;

/// Largest element count any decoder accepts from a file.
pub const MAX_COUNT: usize = 1 << 24;

/// `v` as a count when it is a whole number in `0..=MAX_COUNT`.
pub fn as_count(v: f64) -> Option<usize> {
    (v >= 0.0 && v.fract() == 0.0 && v <= MAX_COUNT as f64).then_some(v as usize)
}

/// Product of `shape` when it does not exceed `MAX_COUNT`.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .filter(|&n| n <= MAX_COUNT)
}

/// Read the whole stream into a lossily decoded string.
pub fn read_text(input: &mut dyn BufRead) -> io::Result<String> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// First line of the stream (without terminator), or `None` when empty.
pub fn first_line(input: &mut dyn BufRead) -> io::Result<Option<String>> {
    let mut bytes = Vec::new();
    if input.read_until(b'\n', &mut bytes)? == 0 {
        return Ok(None);
    }
    let s = String::from_utf8_lossy(&bytes);
    Ok(Some(s.trim_end_matches(['\n', '\r']).to_string()))
}

/// Lower-cased, trimmed file name ends with one of `exts` (given without dot).
pub fn has_extension(name: &str, exts: &[&str]) -> bool {
    let name = name.trim().to_lowercase();
    exts.iter().any(|e| name.ends_with(&format!(".{e}")))
}

// ── Line cursor ──────────────────────────────────────────────────────────────

/// Random-access cursor over the lines of a text.  Line numbers are 1-based
/// and refer to the line most recently returned.
pub struct Lines {
    lines: Vec<String>,
    pos:   usize,
}

impl Lines {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(|l| l.trim_end_matches('\r').to_string()).collect(),
            pos:   0,
        }
    }

    pub fn read(input: &mut dyn BufRead) -> io::Result<Self> {
        Ok(Self::new(&read_text(input)?))
    }

    pub fn next_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.pos).cloned();
        if line.is_some() { self.pos += 1; }
        line
    }

    /// Next line, or `UnexpectedEof` at the end of input.
    pub fn require(&mut self) -> Result<String, FormatError> {
        self.next_line().ok_or(FormatError::UnexpectedEof { line: self.pos + 1 })
    }

    /// Next line that does not satisfy `skip`.
    pub fn require_where(&mut self, skip: impl Fn(&str) -> bool) -> Result<String, FormatError> {
        loop {
            let line = self.require()?;
            if !skip(&line) { return Ok(line); }
        }
    }

    pub fn peek(&self) -> Option<&str> { self.lines.get(self.pos).map(String::as_str) }

    #[inline]
    pub fn line_number(&self) -> usize { self.pos }

    #[inline]
    pub fn mark(&self) -> usize { self.pos }

    #[inline]
    pub fn reset(&mut self, mark: usize) { self.pos = mark.min(self.lines.len()); }

    /// True when at least one non-blank line has not been consumed.
    pub fn has_content(&self) -> bool {
        self.lines[self.pos..].iter().any(|l| !l.trim().is_empty())
    }

    pub fn malformed<S: Into<String>>(&self, detail: S) -> FormatError {
        FormatError::Malformed { line: self.pos, detail: detail.into() }
    }
}

// ── Tokenizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Number(f64),
    Char(char),
    Eol,
    Eof,
}

/// Free-form word/number tokenizer.
///
/// Word characters are `'!'..='z'`.  A token starting with a digit, `.` or
/// `-` is a number (an exponent suffix is accepted).  Any configured comment
/// character discards the rest of its line.  End-of-line is always reported;
/// the `next_*` helpers skip it.
pub struct Tokenizer {
    chars:    Vec<char>,
    pos:      usize,
    line:     usize,
    comments: &'static [char],
    pushed:   Option<Token>,
}

impl Tokenizer {
    pub fn new(text: &str, comments: &'static [char]) -> Self {
        Self { chars: text.chars().collect(), pos: 0, line: 1, comments, pushed: None }
    }

    /// Current 1-based line.
    #[inline]
    pub fn line(&self) -> usize { self.line }

    pub fn push_back(&mut self, tok: Token) { self.pushed = Some(tok); }

    pub fn next_token(&mut self) -> Token {
        if let Some(tok) = self.pushed.take() {
            return tok;
        }
        loop {
            let Some(&c) = self.chars.get(self.pos) else { return Token::Eof };
            if c == '\n' {
                self.pos += 1;
                self.line += 1;
                return Token::Eol;
            }
            if c.is_whitespace() || c.is_control() {
                self.pos += 1;
                continue;
            }
            if self.comments.contains(&c) {
                while self.chars.get(self.pos).is_some_and(|&c| c != '\n') {
                    self.pos += 1;
                }
                continue;
            }
            if c.is_ascii_digit() || c == '.' || c == '-' {
                return self.lex_number();
            }
            if is_word_char(c) {
                let start = self.pos;
                while self.chars.get(self.pos).is_some_and(|&c| {
                    is_word_char(c) && !self.comments.contains(&c)
                }) {
                    self.pos += 1;
                }
                return Token::Word(self.chars[start..self.pos].iter().collect());
            }
            self.pos += 1;
            return Token::Char(c);
        }
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        let digit_at = |t: &Self, i: usize| t.chars.get(i).is_some_and(|c| c.is_ascii_digit());

        if self.chars[self.pos] == '-' { self.pos += 1; }
        let mut digits = 0;
        while digit_at(self, self.pos) { self.pos += 1; digits += 1; }
        if self.chars.get(self.pos) == Some(&'.') {
            self.pos += 1;
            while digit_at(self, self.pos) { self.pos += 1; digits += 1; }
        }
        if digits == 0 {
            self.pos = start + 1;
            return Token::Char(self.chars[start]);
        }
        if matches!(self.chars.get(self.pos), Some('e' | 'E')) {
            let mut p = self.pos + 1;
            if matches!(self.chars.get(p), Some('+' | '-')) { p += 1; }
            if digit_at(self, p) {
                while digit_at(self, p) { p += 1; }
                self.pos = p;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.parse::<f64>() {
            Ok(v)  => Token::Number(v),
            Err(_) => Token::Word(text),
        }
    }

    /// Next non-EOL token.
    pub fn next_significant(&mut self) -> Token {
        loop {
            match self.next_token() {
                Token::Eol => continue,
                tok        => return tok,
            }
        }
    }

    pub fn next_number(&mut self) -> Result<f64, FormatError> {
        match self.next_significant() {
            Token::Number(v) => Ok(v),
            Token::Eof       => Err(FormatError::UnexpectedEof { line: self.line }),
            other => Err(FormatError::Malformed {
                line:   self.line,
                detail: format!("expected a number, found {}", describe(&other)),
            }),
        }
    }

    /// Next number, which must be a non-negative integer.
    pub fn next_count(&mut self) -> Result<usize, FormatError> {
        let v = self.next_number()?;
        as_count(v).ok_or_else(|| FormatError::Malformed {
            line:   self.line,
            detail: format!("expected a count up to {MAX_COUNT}, found {v}"),
        })
    }

    pub fn next_word(&mut self) -> Result<String, FormatError> {
        match self.next_significant() {
            Token::Word(w) => Ok(w),
            Token::Eof     => Err(FormatError::UnexpectedEof { line: self.line }),
            other => Err(FormatError::Malformed {
                line:   self.line,
                detail: format!("expected a name, found {}", describe(&other)),
            }),
        }
    }

    /// Discard everything up to and including the next end-of-line.
    pub fn next_line(&mut self) {
        self.pushed = None;
        while let Some(&c) = self.chars.get(self.pos) {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                return;
            }
        }
    }
}

fn is_word_char(c: char) -> bool { ('!'..='z').contains(&c) }

fn describe(tok: &Token) -> String {
    match tok {
        Token::Word(w)   => format!("\"{w}\""),
        Token::Number(v) => v.to_string(),
        Token::Char(c)   => format!("'{c}'"),
        Token::Eol       => "end of line".into(),
        Token::Eof       => "end of input".into(),
    }
}

// ── Number formatting ────────────────────────────────────────────────────────

/// Fixed-point rendering that never produces a negative zero.
pub fn fixed(value: f64, decimals: usize) -> String {
    let s = format!("{value:.decimals$}");
    match s.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => s,
    }
}

/// Round to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Timestamp in the style the writers stamp into their headers.
pub fn timestamp(fmt: &str) -> String {
    chrono::Local::now().format(fmt).to_string()
}
