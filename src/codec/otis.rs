//! OTIS trajectory table decks (`.itd` / `.dat`).  Read only.
//!
//! Lines starting with `*` are comments.  Each table is a run of header
//! lines followed by whitespace-separated numbers that may wrap freely:
//!
//! ```text
//! CLTAB                 name
//! lift coefficient      descriptor, kept as a table note
//! 1.0                   scale factor applied to every value
//! 1                     number of terms (only single-term tables are read)
//! 1                     coefficient count of term 1 (ignored)
//! 2                     number of independents
//! ALPHA                 per independent: name, count, breakpoints
//! 3
//! -4 0 4
//! ...
//! <values, dimension 0 varying fastest>
//! ```

use std::io::{self, BufRead};

use crate::array::row_major_indices;
use crate::database::TableDatabase;
use crate::table::Table;

use super::text::{self, Lines};
use super::{Codec, Confidence, FormatError};

const COMMENT: char = '*';

pub struct OtisCodec;

impl Codec for OtisCodec {
    fn tag(&self) -> &'static str { "otis" }
    fn description(&self) -> &'static str { "OTIS Table" }
    fn extension(&self) -> &'static str { "dat" }
    fn can_write(&self) -> bool { false }

    fn can_read(&self, name: &str, _input: &mut dyn BufRead) -> io::Result<Confidence> {
        Ok(if text::has_extension(name, &["dat", "itd"]) { Confidence::Maybe } else { Confidence::No })
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        let mut lines = Lines::read(input)?;
        let mut db = TableDatabase::new();

        let mut name = lines.require_where(is_skippable)?;
        loop {
            db.put(read_table(&mut lines, name.trim())?);
            name = match next_header(&mut lines) {
                Some(line) => line,
                None       => break,
            };
        }
        Ok(db)
    }
}

fn is_comment(line: &str) -> bool { line.starts_with(COMMENT) }

fn is_skippable(line: &str) -> bool { is_comment(line) || line.trim().is_empty() }

fn next_header(lines: &mut Lines) -> Option<String> {
    loop {
        let line = lines.next_line()?;
        if !is_skippable(&line) { return Some(line); }
    }
}

fn read_table(lines: &mut Lines, name: &str) -> Result<Table, FormatError> {
    let descriptor = lines.require_where(is_comment)?;
    let scale = read_scalar(lines, "scale factor")?;

    let terms = read_count(lines, "number of terms")?;
    if terms != 1 {
        return Err(FormatError::Structure(format!(
            "multiple term tables not supported for table \"{name}\"",
        )));
    }
    lines.require_where(is_comment)?;

    let dims = read_count(lines, "number of independents")?;
    if dims < 1 {
        return Err(FormatError::Structure(format!(
            "table \"{name}\" must have at least one independent variable",
        )));
    }

    let mut names = Vec::new();
    let mut breakpoints = Vec::new();
    for _ in 0..dims {
        names.push(lines.require_where(is_comment)?.trim().to_string());
        let n = read_count(lines, "number of breakpoints")?;
        breakpoints.push(read_run(lines, n)?);
    }
    let shape: Vec<usize> = breakpoints.iter().map(Vec::len).collect();
    if text::element_count(&shape).is_none() {
        return Err(lines.malformed(format!("table \"{name}\" has too many values")));
    }

    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut table = Table::new(name, &name_refs, breakpoints)?;
    if !descriptor.trim().is_empty() {
        table.add_note(descriptor.trim());
    }

    // Dimension 0 is the innermost run; the slow dimensions count down from
    // the last one.
    let shape = table.shape().to_vec();
    let slow: Vec<usize> = shape[1..].iter().rev().copied().collect();
    let mut index = vec![0usize; dims];
    for outer in row_major_indices(&slow) {
        for (d, &i) in outer.iter().rev().enumerate() {
            index[d + 1] = i;
        }
        for (k, v) in read_run(lines, shape[0])?.into_iter().enumerate() {
            index[0] = k;
            table.set(&index, v * scale)?;
        }
    }
    Ok(table)
}

fn read_scalar(lines: &mut Lines, what: &str) -> Result<f64, FormatError> {
    let line = lines.require_where(is_comment)?;
    let token = line.split_whitespace().next().unwrap_or("");
    token.parse::<f64>().map_err(|_| lines.malformed(format!("expected {what}, found \"{}\"", line.trim())))
}

fn read_count(lines: &mut Lines, what: &str) -> Result<usize, FormatError> {
    let v = read_scalar(lines, what)?;
    text::as_count(v.trunc())
        .ok_or_else(|| lines.malformed(format!("{what} {v} is negative or too large")))
}

/// Exactly `count` numbers, spread over as many lines as it takes.  A line
/// that carries more numbers than remain is an error.
fn read_run(lines: &mut Lines, count: usize) -> Result<Vec<f64>, FormatError> {
    let mut out = Vec::new();
    while out.len() < count {
        let line = lines.require_where(is_comment)?;
        for token in line.split([' ', '\t']).filter(|t| !t.is_empty()) {
            if out.len() == count {
                return Err(lines.malformed(format!("more than {count} values on line")));
            }
            let v = token
                .parse::<f64>()
                .map_err(|_| lines.malformed(format!("\"{token}\" is not a number")))?;
            out.push(v);
        }
    }
    Ok(out)
}
