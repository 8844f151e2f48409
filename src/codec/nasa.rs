//! NASA 2, 3 and 4 argument multi-table format.
//!
//! # Layout
//! Numbers live in fixed 10-column fields: the value right-aligned and
//! terminated by a comma.  Each line holds at most six fields and data lines
//! start with ten blank columns.  A table is laid out as:
//!
//! ```text
//! CL(MACH, ALPHA)                      names line (optional)
//! CL                                   table name
//!  32                                  element count (ignored on read)
//!  &TABLE DNASA=
//!               1.000,    0.000,       filler, one per missing dimension
//!               3.000,     .300, ...   count + breakpoints of each slow dimension
//!               2.000,    3.000, ...   counts + breakpoints of the two fast
//!               ...                    dimensions, repeated before every block
//!  &END
//! ```
//!
//! Lines before the three header lines of the first table are file notes.

use std::io::{self, BufRead, Write};

use crate::array::row_major_indices;
use crate::database::TableDatabase;
use crate::table::Table;

use super::text::{self, Lines};
use super::{Codec, Confidence, FormatError};

const FIELD: usize = 10;
const PER_LINE: usize = 6;
const TEN_SPACES: &str = "          ";
const FILLER: &str = "              1.000,    0.000,";
const BP_DECIMALS: usize = 3;
const VALUE_DECIMALS: usize = 5;

pub struct NasaCodec;

impl Codec for NasaCodec {
    fn tag(&self) -> &'static str { "nasa" }
    fn description(&self) -> &'static str { "NASA 2,3,4 Argument" }
    fn extension(&self) -> &'static str { "nasa" }
    fn can_write(&self) -> bool { true }

    fn can_read(&self, name: &str, _input: &mut dyn BufRead) -> io::Result<Confidence> {
        Ok(if text::has_extension(name, &["nasa"]) { Confidence::Maybe } else { Confidence::No })
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        let mut lines = Lines::read(input)?;
        let mut db = TableDatabase::new();

        let (first, notes) = read_table(&mut lines)?;
        db.add_all_notes(notes.iter().map(|n| n.trim().to_string()));
        db.put(first);
        while lines.has_content() {
            let (table, _) = read_table(&mut lines)?;
            db.put(table);
        }
        Ok(db)
    }

    fn encode(&self, output: &mut dyn Write, db: &TableDatabase) -> Result<(), FormatError> {
        check_tables(db)?;
        let rendered = render(db)?;
        output.write_all(rendered.as_bytes())?;
        output.flush()?;
        Ok(())
    }
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Sequential reader of comma-terminated fields that wraps onto the next line
/// after six fields.  Data rows also wrap when the current line runs out;
/// trailing blanks do not count as columns.
struct Fields<'a> {
    lines:      &'a mut Lines,
    line:       Vec<char>,
    pos:        usize,
    count:      usize,
    wrap_short: bool,
    lines_used: usize,
}

impl<'a> Fields<'a> {
    /// Continue on `line` after the field that ends at column `pos`.
    fn continuing(lines: &'a mut Lines, line: &str, pos: usize) -> Self {
        Self {
            lines,
            line: line.chars().collect(),
            pos,
            count: pos / FIELD,
            wrap_short: false,
            lines_used: 1,
        }
    }

    fn data(lines: &'a mut Lines) -> Result<Self, FormatError> {
        let line = lines.require()?;
        Ok(Self {
            lines,
            line: line.trim_end().chars().collect(),
            pos: 0,
            count: 0,
            wrap_short: true,
            lines_used: 1,
        })
    }

    fn next(&mut self) -> Result<f64, FormatError> {
        if self.count == PER_LINE || (self.wrap_short && self.pos + FIELD >= self.line.len()) {
            self.line = self.lines.require()?.trim_end().chars().collect();
            self.pos = 0;
            self.count = 0;
            self.lines_used += 1;
        }
        self.pos += FIELD;
        self.count += 1;
        parse_field(&self.line, self.pos, self.lines.line_number())
    }

    fn take(&mut self, n: usize) -> Result<Vec<f64>, FormatError> {
        (0..n).map(|_| self.next()).collect()
    }
}

fn parse_field(line: &[char], pos: usize, line_no: usize) -> Result<f64, FormatError> {
    let end = (pos + FIELD - 1).min(line.len());
    let raw: String = line.get(pos..end).map(|s| s.iter().collect()).unwrap_or_default();
    let field = raw.trim().trim_end_matches(',');
    field.parse::<f64>().map_err(|_| FormatError::Malformed {
        line:   line_no,
        detail: format!("invalid numeric field \"{field}\" at column {}", pos + 1),
    })
}

fn parse_count(line: &str, pos: usize, line_no: usize) -> Result<usize, FormatError> {
    let chars: Vec<char> = line.chars().collect();
    let v = parse_field(&chars, pos, line_no)?;
    text::as_count(v.max(0.0).trunc()).ok_or_else(|| FormatError::Malformed {
        line:   line_no,
        detail: format!("breakpoint count {v} is out of range"),
    })
}

/// Read one table.  Also returns the lines that preceded its three header
/// lines.
fn read_table(lines: &mut Lines) -> Result<(Table, Vec<String>), FormatError> {
    let mut preamble = Vec::new();
    let mut window: [Option<String>; 3] = [None, None, None];
    loop {
        let line = lines.require()?;
        if line.trim_start().starts_with('&') { break; }
        if let Some(dropped) = window[0].take() { preamble.push(dropped); }
        window.rotate_left(1);
        window[2] = Some(line);
    }
    let [names_line, name_line, _count_line] = window;
    let name = name_line
        .map(|l| l.trim().to_string())
        .ok_or_else(|| lines.malformed("table card without a table name line"))?;

    // Slow dimensions: a count of 1 marks a filler line.
    let mut breakpoints: Vec<Vec<f64>> = Vec::new();
    for _ in 0..2 {
        let line = lines.require()?;
        let n = parse_count(&line, FIELD, lines.line_number())?;
        if n > 1 {
            breakpoints.push(Fields::continuing(lines, &line, FIELD).take(n)?);
        }
    }

    // The two fast dimensions; remember how many lines their block header spans.
    let mark = lines.mark();
    let line = lines.require()?;
    let line_no = lines.line_number();
    let n1 = parse_count(&line, FIELD, line_no)?;
    let n2 = parse_count(&line, 2 * FIELD, line_no)?;
    if n1 < 2 || n2 < 2 {
        return Err(lines.malformed(format!(
            "invalid number of breakpoints ({n1}, {n2}); at least 2 are required",
        )));
    }
    let bp_lines = {
        let mut fields = Fields::continuing(lines, &line, 2 * FIELD);
        breakpoints.push(fields.take(n1)?);
        breakpoints.push(fields.take(n2)?);
        fields.lines_used
    };
    lines.reset(mark);

    let dims = breakpoints.len();
    let names: Vec<String> = match names_line.as_deref().and_then(parse_indep_names) {
        Some(n) if n.len() == dims => n,
        _ => (1..=dims).map(|i| format!("Indep{i}")).collect(),
    };
    let shape: Vec<usize> = breakpoints.iter().map(Vec::len).collect();
    if text::element_count(&shape).is_none() {
        return Err(lines.malformed(format!("table \"{name}\" of shape {shape:?} is too large")));
    }
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut table = Table::new(name, &name_refs, breakpoints)?;

    let slow = table.shape()[..dims - 2].to_vec();
    for prefix in row_major_indices(&slow) {
        read_block(lines, &mut table, prefix, bp_lines)?;
    }

    let end = lines.require()?;
    if !end.trim_start().starts_with('&') {
        return Err(lines.malformed(format!("expected &END card, found \"{}\"", end.trim())));
    }
    Ok((table, preamble))
}

fn read_block(
    lines: &mut Lines,
    table: &mut Table,
    prefix: Vec<usize>,
    bp_lines: usize,
) -> Result<(), FormatError> {
    for _ in 0..bp_lines {
        lines.require()?;
    }
    let n = table.dimensions();
    let (len1, len2) = (table.num_breakpoints(n - 2), table.num_breakpoints(n - 1));
    let mut idx = prefix;
    idx.extend([0, 0]);

    let mut fields = Fields::data(lines)?;
    for i in 0..len1 {
        for j in 0..len2 {
            idx[n - 2] = i;
            idx[n - 1] = j;
            let v = fields.next()?;
            table.set(&idx, v)?;
        }
    }
    Ok(())
}

/// `CL(MACH, ALPHA)` → `["MACH", "ALPHA"]`
fn parse_indep_names(line: &str) -> Option<Vec<String>> {
    let open = line.find('(')?;
    let close = line.find(')')?;
    if close <= open { return None; }
    let inner = &line[open + 1..close];
    if inner.is_empty() { return Some(Vec::new()); }
    Some(inner.split(',').map(|s| s.trim().to_string()).collect())
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn check_tables(db: &TableDatabase) -> Result<(), FormatError> {
    for table in db {
        let dims = table.dimensions();
        if !(2..=4).contains(&dims) {
            return Err(FormatError::Structure(format!(
                "NASA tables must have 2 to 4 independent variables; table \"{}\" has {dims}",
                table.name(),
            )));
        }
        if table.shape().iter().any(|&n| n < 2) {
            return Err(FormatError::Structure(format!(
                "every dimension of a NASA table needs at least 2 breakpoints; table \"{}\" does not",
                table.name(),
            )));
        }
    }
    Ok(())
}

fn render(db: &TableDatabase) -> Result<String, FormatError> {
    let mut out = String::new();
    write_file_comments(&mut out, db);

    for (k, table) in db.iter().enumerate() {
        if k > 0 { out.push_str("\n\n"); }
        let dims = table.dimensions();

        out.push_str(&format!("{}({})\n", table.name(), table.indep_names().join(", ")));
        out.push_str(table.name());
        out.push('\n');
        out.push_str(&format!(" {}\n", element_count(table.shape())));
        out.push_str(" &TABLE DNASA=\n");
        for _ in dims..4 {
            out.push_str(FILLER);
            out.push('\n');
        }

        for dim in 0..dims - 2 {
            let bp = table.breakpoints(dim);
            out.push_str(TEN_SPACES);
            out.push_str(&field(bp.len() as f64, BP_DECIMALS)?);
            let mut count = 1;
            for &v in bp {
                if count == PER_LINE {
                    out.push('\n');
                    out.push_str(TEN_SPACES);
                    count = 0;
                }
                out.push_str(&field(v, BP_DECIMALS)?);
                count += 1;
            }
            out.push('\n');
        }

        for prefix in row_major_indices(&table.shape()[..dims - 2]) {
            write_block(&mut out, table, prefix)?;
        }
        out.push_str(" &END\n");
    }
    Ok(out)
}

fn write_block(out: &mut String, table: &Table, prefix: Vec<usize>) -> Result<(), FormatError> {
    let n = table.dimensions();
    let (bp1, bp2) = (table.breakpoints(n - 2), table.breakpoints(n - 1));

    out.push_str(TEN_SPACES);
    out.push_str(&field(bp1.len() as f64, BP_DECIMALS)?);
    out.push_str(&field(bp2.len() as f64, BP_DECIMALS)?);
    let mut count = 2;
    for &v in bp1.iter().chain(bp2) {
        if count == PER_LINE {
            out.push('\n');
            out.push_str(TEN_SPACES);
            count = 0;
        }
        count += 1;
        out.push_str(&field(v, BP_DECIMALS)?);
    }
    out.push('\n');

    let mut idx = prefix;
    idx.extend([0, 0]);
    out.push_str(TEN_SPACES);
    for i in 0..bp1.len() {
        idx[n - 2] = i;
        let mut count = 0;
        for j in 0..bp2.len() {
            idx[n - 1] = j;
            if count == PER_LINE {
                out.push('\n');
                out.push_str(TEN_SPACES);
                count = 0;
            }
            count += 1;
            out.push_str(&field(table.get(&idx)?, VALUE_DECIMALS)?);
        }
        out.push('\n');
        if i + 1 < bp1.len() { out.push_str(TEN_SPACES); }
    }
    Ok(())
}

/// A NASA field: the number without a leading zero, a comma, left-padded to
/// ten columns.
fn field(value: f64, decimals: usize) -> Result<String, FormatError> {
    let mut s = text::fixed(value, decimals);
    if let Some(rest) = s.strip_prefix("0.") {
        s = format!(".{rest}");
    } else if let Some(rest) = s.strip_prefix("-0.") {
        s = format!("-.{rest}");
    }
    s.push(',');
    if s.len() > FIELD {
        return Err(FormatError::Structure(format!(
            "value {value} does not fit a {FIELD} column NASA field",
        )));
    }
    Ok(format!("{s:>FIELD$}"))
}

/// Number of elements between the `&TABLE` and `&END` cards, counting the
/// repeated breakpoint headers and the filler pairs of missing dimensions.
pub fn element_count(shape: &[usize]) -> usize {
    let dims = shape.len();
    let mut n: usize = shape.iter().product();
    let slow = &shape[..dims - 2];
    n += slow.iter().map(|&c| c + 1).sum::<usize>();
    let blocks: usize = slow.iter().product();
    n += (shape[dims - 2] + shape[dims - 1] + 2) * blocks;
    n + 2 * 4usize.saturating_sub(dims)
}

fn write_file_comments(out: &mut String, db: &TableDatabase) {
    let date = text::timestamp("%-m/%-d/%y");
    let time = text::timestamp("%-I:%M:%S %p");
    match db.notes() {
        [] => {
            out.push_str(&format!("{db}\nDate:, {date}, {time}\n"));
        }
        [only] => {
            out.push_str(&format!("{only}\n{date}, {time}\n"));
        }
        [first, second, ..] => {
            out.push_str(&format!("{first}\n{second}\n"));
        }
    }
}
