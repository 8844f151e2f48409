//! C-81 airfoil tables: lift, drag and moment coefficients against Mach
//! number and angle of attack, in fixed 7-column fields.
//!
//! ```text
//! <airfoil name, columns 1-30><ML><NL><MD><ND><MM><NM>
//!        <Mach 1><Mach 2>...                 up to 9 per line
//! <alpha><CL(M1)><CL(M2)>...                 one row per angle of attack
//! ```
//!
//! Every count is two columns wide.  The CL block is followed by the CD and
//! CM blocks with the same layout.  Rows longer than nine values continue on
//! the next line, indented seven columns.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::database::TableDatabase;
use crate::table::Table;

use super::text::{self, Lines};
use super::{Codec, Confidence, FormatError};

const NAME_WIDTH: usize = 30;
const COUNT_WIDTH: usize = 2;
const FIELD: usize = 7;
const PER_LINE: usize = 9;
const MAX_COUNT: usize = 99;
const MAX_DECIMALS: usize = 4;
const DEFAULT_NAME: &str = "AIRFOIL";

/// Coefficient tables in file order.
const BLOCKS: [&str; 3] = ["CL", "CD", "CM"];
const MACH: &str = "MACH";
const ALPHA: &str = "ALPHA";

pub struct C81Codec;

impl Codec for C81Codec {
    fn tag(&self) -> &'static str { "c81" }
    fn description(&self) -> &'static str { "C-81 Airfoil" }
    fn extension(&self) -> &'static str { "c81" }
    fn can_write(&self) -> bool { true }

    fn can_read(&self, name: &str, _input: &mut dyn BufRead) -> io::Result<Confidence> {
        Ok(if text::has_extension(name, &["c81"]) { Confidence::Maybe } else { Confidence::No })
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        let mut lines = Lines::read(input)?;
        let header = lines.require()?;
        let (airfoil, counts) = parse_header(&lines, &header)?;

        let mut db = TableDatabase::new();
        if !airfoil.is_empty() {
            db.add_note(airfoil);
        }
        for (name, (n_mach, n_alpha)) in BLOCKS.iter().zip(counts) {
            db.put(read_block(&mut lines, name, n_mach, n_alpha)?);
        }
        Ok(db)
    }

    fn encode(&self, output: &mut dyn Write, db: &TableDatabase) -> Result<(), FormatError> {
        let tables = check_tables(db).map_err(FormatError::Structure)?;
        let airfoil = db.note(0).map(str::trim).unwrap_or(DEFAULT_NAME);

        let mut out: String = airfoil.chars().take(NAME_WIDTH).collect();
        out = format!("{out:<NAME_WIDTH$}");
        for t in &tables {
            out.push_str(&format!("{:>COUNT_WIDTH$}", t.num_breakpoints(0)));
            out.push_str(&format!("{:>COUNT_WIDTH$}", t.num_breakpoints(1)));
        }
        out.push('\n');
        for t in &tables {
            write_block(&mut out, t)?;
        }
        output.write_all(out.as_bytes())?;
        output.flush()?;
        Ok(())
    }
}

// ── Reading ──────────────────────────────────────────────────────────────────

type Counts = [(usize, usize); 3];

fn parse_header(lines: &Lines, header: &str) -> Result<(String, Counts), FormatError> {
    let count = |k: usize| -> Result<usize, FormatError> {
        columns(header, NAME_WIDTH + k * COUNT_WIDTH, COUNT_WIDTH)
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| lines.malformed(format!("header count {} is missing or invalid", k + 1)))
    };
    let name = columns(header, 0, NAME_WIDTH).trim().to_string();
    let counts = [
        (count(0)?, count(1)?),
        (count(2)?, count(3)?),
        (count(4)?, count(5)?),
    ];
    Ok((name, counts))
}

fn read_block(lines: &mut Lines, name: &str, n_mach: usize, n_alpha: usize) -> Result<Table, FormatError> {
    let first = lines.require()?;
    let mach = read_row(lines, first, n_mach)?;

    let mut alpha = Vec::new();
    let mut rows = Vec::new();
    for _ in 0..n_alpha {
        let line = lines.require()?;
        alpha.push(parse_field(lines, &line, 0)?);
        rows.push(read_row(lines, line, n_mach)?);
    }

    let mut table = Table::new(name, &[MACH, ALPHA], vec![mach, alpha])?;
    for (j, row) in rows.iter().enumerate() {
        for (i, &v) in row.iter().enumerate() {
            table.set(&[i, j], v)?;
        }
    }
    Ok(table)
}

/// `count` fields starting in column 8 of `line`, nine per line.
fn read_row(lines: &mut Lines, mut line: String, count: usize) -> Result<Vec<f64>, FormatError> {
    let mut out = Vec::new();
    loop {
        let take = (count - out.len()).min(PER_LINE);
        for k in 0..take {
            out.push(parse_field(lines, &line, FIELD * (k + 1))?);
        }
        if out.len() == count {
            return Ok(out);
        }
        line = lines.require()?;
    }
}

/// Columns are counted in characters, the unit the writer pads in.
fn columns(line: &str, start: usize, width: usize) -> String {
    line.chars().skip(start).take(width).collect()
}

fn parse_field(lines: &Lines, line: &str, start: usize) -> Result<f64, FormatError> {
    let field = columns(line, start, FIELD);
    let raw = field.trim();
    if raw.is_empty() {
        return Err(lines.malformed(format!("missing value in columns {}-{}", start + 1, start + FIELD)));
    }
    raw.parse::<f64>()
        .map_err(|_| lines.malformed(format!("\"{raw}\" is not a number")))
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn check_tables(db: &TableDatabase) -> Result<Vec<&Table>, String> {
    let mut out = Vec::with_capacity(BLOCKS.len());
    for name in BLOCKS {
        let t = db.get(name).ok_or_else(|| format!("C-81 files need a \"{name}\" table"))?;
        if t.dimensions() != 2 {
            return Err(format!("table \"{name}\" must be 2-D, found {} dimensions", t.dimensions()));
        }
        for d in 0..2 {
            let n = t.num_breakpoints(d);
            if !(1..=MAX_COUNT).contains(&n) {
                return Err(format!("table \"{name}\" has {n} breakpoints in dimension {d}, limit is {MAX_COUNT}"));
            }
        }
        out.push(t);
    }
    for t in db {
        if !BLOCKS.contains(&t.name()) {
            debug!(table = t.name(), "table has no place in a C-81 file, skipped");
        }
    }
    Ok(out)
}

fn write_block(out: &mut String, table: &Table) -> Result<(), FormatError> {
    write_row(out, &" ".repeat(FIELD), table.breakpoints(0))?;
    let n_mach = table.num_breakpoints(0);
    for (j, &alpha) in table.breakpoints(1).iter().enumerate() {
        let row: Vec<f64> = (0..n_mach)
            .map(|i| table.get(&[i, j]))
            .collect::<Result<_, _>>()?;
        write_row(out, &field(alpha)?, &row)?;
    }
    Ok(())
}

fn write_row(out: &mut String, lead: &str, values: &[f64]) -> Result<(), FormatError> {
    for (n, chunk) in values.chunks(PER_LINE).enumerate() {
        out.push_str(if n == 0 { lead } else { "       " });
        for &v in chunk {
            out.push_str(&field(v)?);
        }
        out.push('\n');
    }
    Ok(())
}

/// Right-aligned in seven columns with as many decimals as fit.
fn field(v: f64) -> Result<String, FormatError> {
    (0..=MAX_DECIMALS)
        .rev()
        .map(|d| text::fixed(v, d))
        .find(|s| s.len() <= FIELD)
        .map(|s| format!("{s:>FIELD$}"))
        .ok_or_else(|| FormatError::Structure(format!("{v} does not fit a {FIELD}-column field")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn coefficient(name: &str, machs: &[f64], alphas: &[f64], scale: f64) -> Table {
        let values = machs
            .iter()
            .flat_map(|m| alphas.iter().map(move |a| scale * (a * 0.1 + m)))
            .map(|v| text::round_to(v, 4))
            .collect();
        Table::two_d(name, [MACH, ALPHA], machs.to_vec(), alphas.to_vec(), values).unwrap()
    }

    #[test]
    fn field_fits_seven_columns() {
        assert_eq!(field(0.3).unwrap(), " 0.3000");
        assert_eq!(field(-0.1234).unwrap(), "-0.1234");
        assert_eq!(field(-180.0).unwrap(), "-180.00");
        assert_eq!(field(123456.0).unwrap(), " 123456");
        assert!(matches!(field(12345678.0), Err(FormatError::Structure(_))));
    }

    #[test]
    fn round_trip_with_continuation_lines() {
        let machs: Vec<f64> = (0..11).map(|k| text::round_to(0.1 * k as f64, 4)).collect();
        let alphas = [-180.0, -10.0, 0.0, 10.0, 180.0];
        let mut db = TableDatabase::from_tables([
            coefficient("CL", &machs, &alphas, 1.0),
            coefficient("CD", &machs[..3], &alphas[1..4], 0.01),
            coefficient("CM", &machs[..2], &alphas, -0.02),
        ]);
        db.add_note("NACA 0012");

        let mut buf = Vec::new();
        C81Codec.encode(&mut buf, &db).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, format!("{:<30}{}", "NACA 0012", "11 5 3 3 2 5"));

        let back = C81Codec.decode(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.notes(), &["NACA 0012".to_string()]);
        for name in BLOCKS {
            let (a, b) = (db.get(name).unwrap(), back.get(name).unwrap());
            assert_eq!(a.axes(), b.axes());
            for (x, y) in a.values().as_slice().iter().zip(b.values().as_slice()) {
                assert!((x - y).abs() < 1e-9, "{name}: {x} vs {y}");
            }
        }
    }

    #[test]
    fn missing_moment_table_is_structural() {
        let db = TableDatabase::from_tables([
            coefficient("CL", &[0.3], &[0.0], 1.0),
            coefficient("CD", &[0.3], &[0.0], 1.0),
        ]);
        let mut buf = Vec::new();
        assert!(matches!(C81Codec.encode(&mut buf, &db), Err(FormatError::Structure(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn short_row_is_malformed() {
        let src = format!("{:<30} 2 1 1 1 1 1\n        0.3000 0.6000\n 0.0000 0.1000\n", "X");
        assert!(matches!(
            C81Codec.decode(&mut Cursor::new(src)),
            Err(FormatError::Malformed { line: 3, .. }),
        ));
    }

    #[test]
    fn non_ascii_airfoil_name_keeps_columns() {
        let mut db = TableDatabase::from_tables([
            coefficient("CL", &[0.3, 0.6], &[-4.0, 0.0, 4.0], 1.0),
            coefficient("CD", &[0.3], &[0.0, 4.0], 0.01),
            coefficient("CM", &[0.3, 0.6], &[0.0], -0.02),
        ]);
        db.add_note("Profil Göttingen 398");

        let mut buf = Vec::new();
        C81Codec.encode(&mut buf, &db).unwrap();
        let back = C81Codec.decode(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.notes(), &["Profil Göttingen 398".to_string()]);
        assert_eq!(back.get("CL").unwrap().axes(), db.get("CL").unwrap().axes());
        assert_eq!(back.get("CM").unwrap().shape(), &[2, 1]);
    }

    #[test]
    fn header_count_must_be_positive() {
        let src = format!("{:<30} 1 0 1 1 1 1\n        0.3000\n", "X");
        assert!(matches!(
            C81Codec.decode(&mut Cursor::new(src)),
            Err(FormatError::Malformed { line: 1, .. }),
        ));
        let src = format!("{:<30} 1xx 1 1 1 1\n", "X");
        assert!(matches!(
            C81Codec.decode(&mut Cursor::new(src)),
            Err(FormatError::Malformed { line: 1, .. }),
        ));
    }
}
