//! POST `$tab` namelist tables.
//!
//! A file is a sequence of namelist groups.  Each group opens with a line
//! whose text after the first column is `$tab` (` $tab`, `p$tab`, `l$tab`)
//! and closes with ` $`:
//!
//! ```text
//!  $
//! p$tab
//! c comment lines directly after the $tab line are file notes
//!  table = 'CL', 2, 'ALPHA', 'MACH', 3, 2, 8*1,
//!       0.3,
//!           -4.0,  0.12,
//!           ...
//!  $
//! ```
//!
//! The header lists the independents fastest first, so they are reversed
//! into storage order.  Every level but the last prints its breakpoint on a
//! line of its own; the last level prints `breakpoint, value` pairs.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::array::ArrayNd;
use crate::database::TableDatabase;
use crate::table::Table;

use super::text::{self, Lines};
use super::{Codec, Confidence, FormatError};

const MAX_DIMS: usize = 3;
const BP_WIDTH: usize = 8;
const VALUE_WIDTH: usize = 16;

pub struct PostCodec;

impl Codec for PostCodec {
    fn tag(&self) -> &'static str { "post" }
    fn description(&self) -> &'static str { "POST Table" }
    fn extension(&self) -> &'static str { "dat" }
    fn can_write(&self) -> bool { true }

    fn can_read(&self, _name: &str, input: &mut dyn BufRead) -> io::Result<Confidence> {
        let source = text::read_text(input)?;
        Ok(if source.lines().any(is_tab_line) { Confidence::Yes } else { Confidence::No })
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        let mut lines = Lines::read(input)?;
        let mut db = TableDatabase::new();

        if !skip_to_namelist(&mut lines) {
            return Err(FormatError::Unrecognized("no $tab namelist found".into()));
        }
        loop {
            while lines.peek().is_some_and(is_comment) {
                if let Some(line) = lines.next_line() {
                    db.add_note(&line[1..]);
                }
            }
            let header = lines.require()?;
            if let Some(table) = read_table(&mut lines, &header)? {
                db.put(table);
            }
            if !skip_to_namelist(&mut lines) { break; }
        }
        Ok(db)
    }

    fn encode(&self, output: &mut dyn Write, db: &TableDatabase) -> Result<(), FormatError> {
        for table in db {
            let dims = table.dimensions();
            if !(1..=MAX_DIMS).contains(&dims) {
                return Err(FormatError::Structure(format!(
                    "POST tables have 1 to {MAX_DIMS} independents, \"{}\" has {dims}",
                    table.name(),
                )));
            }
        }
        if db.is_empty() {
            return Ok(());
        }

        let mut out = String::from(" $\np$tab\n");
        for note in db.notes() {
            out.push_str(&format!("c{note}\n"));
        }
        out.push_str(&format!(
            "c Date and time written: {}\nc\n",
            text::timestamp("%b %-d, %Y %-I:%M:%S %p"),
        ));
        for (i, table) in db.iter().enumerate() {
            if i > 0 { out.push_str(" $\np$tab\n"); }
            write_table(&mut out, table);
        }
        output.write_all(out.as_bytes())?;
        output.flush()?;
        Ok(())
    }
}

fn is_tab_line(line: &str) -> bool {
    line.chars().count() >= 5 && line.chars().skip(1).collect::<String>().trim() == "$tab"
}

fn is_comment(line: &str) -> bool { line.starts_with(['c', '/']) }

/// Advance past the next `$tab` line.  False when the input runs out first.
fn skip_to_namelist(lines: &mut Lines) -> bool {
    while let Some(line) = lines.next_line() {
        if is_tab_line(&line) { return true; }
    }
    false
}

// ── Reading ──────────────────────────────────────────────────────────────────

fn read_table(lines: &mut Lines, header: &str) -> Result<Option<Table>, FormatError> {
    let mut fields = header.trim().split(',').map(str::trim);

    let first = fields.next().unwrap_or("");
    if !first.starts_with("table") || !first.contains('=') {
        return Err(lines.malformed("could not find the table name"));
    }
    let name = quoted(first)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| lines.malformed("could not parse the table name"))?
        .to_string();

    let dims = fields
        .next()
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(|| lines.malformed("could not parse the number of dimensions"))?;
    if dims > MAX_DIMS {
        return Err(FormatError::Structure(format!(
            "table \"{name}\" has {dims} dimensions, POST tables have at most {MAX_DIMS}",
        )));
    }
    if dims == 0 {
        warn!(table = %name, "POST table has dimension 0, skipped");
        return Ok(None);
    }

    let mut indeps = Vec::new();
    for _ in 0..dims {
        let var = fields
            .next()
            .and_then(quoted)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| lines.malformed("could not parse an independent variable name"))?;
        indeps.push(var.to_string());
    }
    let mut counts = Vec::new();
    for _ in 0..dims {
        let n = fields
            .next()
            .and_then(|t| t.parse::<usize>().ok())
            .filter(|&n| n >= 1)
            .ok_or_else(|| lines.malformed("invalid number of breakpoints"))?;
        counts.push(n);
    }
    if text::element_count(&counts).is_none() {
        return Err(lines.malformed(format!("table \"{name}\" has too many values")));
    }
    indeps.reverse();
    counts.reverse();

    let mut reader = Values { lines, pending: VecDeque::new() };
    let mut breakpoints: Vec<Vec<f64>> = vec![Vec::new(); dims];
    let mut values = Vec::new();
    read_level(&mut reader, 0, &counts, &mut breakpoints, &mut values)?;

    let name_refs: Vec<&str> = indeps.iter().map(String::as_str).collect();
    let values = ArrayNd::from_vec(&counts, values)?;
    Ok(Some(Table::with_values(name, &name_refs, breakpoints, values)?))
}

/// Values are produced in row-major order, matching the nesting of the
/// namelist body.  Each axis is filled by the first pass over its level.
fn read_level(
    reader: &mut Values,
    dim:    usize,
    counts: &[usize],
    seen:   &mut [Vec<f64>],
    values: &mut Vec<f64>,
) -> Result<(), FormatError> {
    let last = dim + 1 == counts.len();
    for i in 0..counts[dim] {
        let x = reader.next()?;
        match seen[dim].get(i) {
            None => seen[dim].push(x),
            Some(&prev) if prev != x => {
                return Err(reader.lines.malformed(format!(
                    "inconsistent independent variable value {x}, expected {prev}",
                )));
            }
            Some(_) => {}
        }
        if last {
            values.push(reader.next()?);
        } else {
            read_level(reader, dim + 1, counts, seen, values)?;
        }
    }
    Ok(())
}

/// Comma separated numbers drawn from as many lines as needed.  Comment
/// lines are skipped and anything after `/` on a data line is dropped.
struct Values<'a> {
    lines:   &'a mut Lines,
    pending: VecDeque<String>,
}

impl Values<'_> {
    fn next(&mut self) -> Result<f64, FormatError> {
        while self.pending.is_empty() {
            let line = self.lines.require_where(is_comment)?;
            let data = line.split('/').next().unwrap_or("");
            self.pending.extend(
                data.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from),
            );
        }
        let token = self.pending.pop_front().unwrap_or_default();
        token
            .parse::<f64>()
            .map_err(|_| self.lines.malformed(format!("\"{token}\" is not a number")))
    }
}

/// Text between the first and last `'`.
fn quoted(s: &str) -> Option<&str> {
    let start = s.find('\'')? + 1;
    let end = s.rfind('\'')?;
    s.get(start..end)
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn write_table(out: &mut String, table: &Table) {
    let dims = table.dimensions();
    out.push_str(&format!(" table = '{}', {dims}, ", table.name()));
    for d in (0..dims).rev() {
        out.push_str(&format!("'{}', ", table.indep_name(d)));
    }
    for d in (0..dims).rev() {
        out.push_str(&format!("{}, ", table.num_breakpoints(d)));
    }
    out.push_str("8*1,\n");

    let mut cursor = 0usize;
    write_level(out, table, 0, &mut cursor);
    out.push_str(" $\n");
}

fn write_level(out: &mut String, table: &Table, dim: usize, cursor: &mut usize) {
    let last = dim + 1 == table.dimensions();
    for &x in table.breakpoints(dim) {
        if last {
            let y = table.values().as_slice()[*cursor];
            *cursor += 1;
            out.push_str(&format!("          {},  {},\n", number(BP_WIDTH, x), number(VALUE_WIDTH, y)));
        } else {
            out.push_str(&format!("      {},\n", number(BP_WIDTH, x)));
            write_level(out, table, dim + 1, cursor);
        }
    }
}

/// Shortest representation that reads back to the same value, right
/// aligned in `width` columns.
fn number(width: usize, v: f64) -> String {
    format!("{:>width$}", format!("{v:?}"))
}
