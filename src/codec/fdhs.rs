//! FDHS ASCII (Functional Data Handling System) multi-table format.
//!
//! Free-form word/number tokens; `*` and `;` start a comment that runs to the
//! end of the line.  Files written by this codec start with a `*FDHS` line.
//! Each table is:
//!
//! ```text
//! CL     ALPHA     MACH     7     3          name, indeps and counts, slowest last
//! all       all                              frequency card (skipped)
//! <breakpoints of dimension 0> … <breakpoints of dimension n-1>
//! <dependent values, last dimension varying fastest>
//! ```

use std::io::{self, BufRead, Write};

use crate::array::row_major_indices;
use crate::database::TableDatabase;
use crate::table::Table;

use super::text::{self, Token, Tokenizer};
use super::{Codec, Confidence, FormatError};

const COMMENTS: &[char] = &['*', ';'];
const SEPARATOR: &str = "     ";
const NUM_WIDTH: usize = 14;
const NUM_DECIMALS: usize = 5;
const PER_LINE: usize = 6;

pub struct FdhsCodec;

impl Codec for FdhsCodec {
    fn tag(&self) -> &'static str { "fdhs" }
    fn description(&self) -> &'static str { "FDHS ASCII" }
    fn extension(&self) -> &'static str { "fda" }
    fn can_write(&self) -> bool { true }

    fn can_read(&self, name: &str, input: &mut dyn BufRead) -> io::Result<Confidence> {
        if let Some(line) = text::first_line(input)? {
            if line.trim() == "*FDHS" {
                return Ok(Confidence::Yes);
            }
        }
        Ok(if text::has_extension(name, &["fda", "fdhs"]) { Confidence::Maybe } else { Confidence::No })
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        let source = text::read_text(input)?;
        let mut tok = Tokenizer::new(&source, COMMENTS);
        let mut db = TableDatabase::new();
        loop {
            match tok.next_significant() {
                Token::Eof => break,
                t => {
                    tok.push_back(t);
                    db.put(read_table(&mut tok)?);
                }
            }
        }
        Ok(db)
    }

    fn encode(&self, output: &mut dyn Write, db: &TableDatabase) -> Result<(), FormatError> {
        let mut out = String::from("*FDHS\n");
        for note in db.notes() {
            out.push_str(&format!("; {note}\n"));
        }
        for table in db {
            write_table(&mut out, table);
        }
        output.write_all(out.as_bytes())?;
        output.flush()?;
        Ok(())
    }
}

fn read_table(tok: &mut Tokenizer) -> Result<Table, FormatError> {
    // Names run up to the first number, which is the first breakpoint count.
    let mut names = Vec::new();
    let first_count = loop {
        match tok.next_significant() {
            Token::Number(v) => break v,
            Token::Word(w)   => names.push(w),
            Token::Eof       => return Err(FormatError::UnexpectedEof { line: tok.line() }),
            _                => {}
        }
    };
    if names.len() < 2 {
        return Err(FormatError::Malformed {
            line:   tok.line(),
            detail: format!("table header needs a name and at least one independent, found {names:?}"),
        });
    }
    let table_name = names.remove(0);
    names.reverse();
    let dims = names.len();

    let mut counts = vec![0usize; dims];
    counts[dims - 1] = as_count(first_count, tok.line())?;
    for i in (0..dims - 1).rev() {
        counts[i] = tok.next_count()?;
    }
    if text::element_count(&counts).is_none() {
        return Err(FormatError::Malformed {
            line:   tok.line(),
            detail: format!("table {table_name} of shape {counts:?} is too large"),
        });
    }
    // Optional "Logical" keyword, then the frequency card.
    tok.next_line();
    tok.next_line();

    let mut breakpoints = Vec::new();
    for &n in &counts {
        breakpoints.push((0..n).map(|_| tok.next_number()).collect::<Result<Vec<_>, _>>()?);
    }

    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut table = Table::new(table_name, &name_refs, breakpoints)?;
    for idx in row_major_indices(&counts) {
        let v = tok.next_number()?;
        table.set(&idx, v)?;
    }
    Ok(table)
}

fn as_count(v: f64, line: usize) -> Result<usize, FormatError> {
    text::as_count(v).ok_or_else(|| FormatError::Malformed {
        line,
        detail: format!("invalid breakpoint count {v}"),
    })
}

fn write_table(out: &mut String, table: &Table) {
    out.push_str(&format!("; {table}\n"));
    out.push_str(&format!(
        "; Date and time written:  {}\n",
        text::timestamp("%b %-d, %Y %-I:%M:%S %p"),
    ));
    out.push_str("; \n");

    let dims = table.dimensions();
    out.push_str(table.name());
    out.push_str(SEPARATOR);
    for d in (0..dims).rev() {
        out.push_str(table.indep_name(d));
        out.push_str(SEPARATOR);
    }
    for d in (1..dims).rev() {
        out.push_str(&table.num_breakpoints(d).to_string());
        out.push_str(SEPARATOR);
    }
    out.push_str(&table.num_breakpoints(0).to_string());
    out.push('\n');
    out.push_str("all       all       \n");

    for axis in table.axes() {
        write_numbers(out, &axis.breakpoints);
    }
    let fast = table.shape().last().copied().unwrap_or(1);
    for row in table.values().as_slice().chunks(fast) {
        write_numbers(out, row);
    }
}

/// Six numbers per line; a run always ends its last line.
fn write_numbers(out: &mut String, values: &[f64]) {
    for chunk in values.chunks(PER_LINE) {
        for &v in chunk {
            let s = text::fixed(v, NUM_DECIMALS);
            if s.len() >= NUM_WIDTH { out.push(' '); }
            out.push_str(&format!("{s:>NUM_WIDTH$}"));
        }
        out.push('\n');
    }
}
