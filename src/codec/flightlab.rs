//! FlightLab SAV table sets.
//!
//! A SAV file stores one fixed set of tables: either the airfoil high/low
//! angle-of-attack set (6 tables) or the fuselage 2-D uniform-increment set
//! (18 tables).  The first independent name in the file selects the set.
//!
//! ```text
//! # comment                    '#' and ';' start comments
//! AOATL 3 1 0                  independent block: name, "3 1 0"
//!   -1.8E+02  1.8E+02  1.0E+01 min, max, step
//!
//! CLL 37 5 0                   table block: name, fast count, slow count (1 for 1-D), 0
//!   <values, slow dimension outermost>
//! ```
//!
//! Breakpoints are never stored; they are rebuilt as `min + step * i`.

use std::io::{self, BufRead, Write};

use crate::array::row_major_indices;
use crate::database::TableDatabase;
use crate::table::Table;

use super::text::{self, Token, Tokenizer};
use super::{Codec, Confidence, FormatError};

const COMMENTS: &[char] = &['#', ';'];

/// Relative spacing tolerance, in units of the step, when writing ranges.
const SPACING_TOLERANCE: f64 = 1e-6;

// ── Table set definitions ────────────────────────────────────────────────────

struct TableSpec {
    name:   &'static str,
    indeps: &'static [&'static str],
}

/// Independent variable plus the table/dimension its range is taken from
/// when writing.
struct IndepSpec {
    name:   &'static str,
    source: (&'static str, usize),
}

struct SubType {
    label:  &'static str,
    indeps: &'static [IndepSpec],
    tables: &'static [TableSpec],
}

const fn spec(name: &'static str, indeps: &'static [&'static str]) -> TableSpec {
    TableSpec { name, indeps }
}

const fn range_from(name: &'static str, table: &'static str, dim: usize) -> IndepSpec {
    IndepSpec { name, source: (table, dim) }
}

const LOW:  &[&str] = &["MACHT", "AOATL"];
const HIGH: &[&str] = &["AOATH"];

static AIRFOIL: SubType = SubType {
    label:  "airfoil high/low",
    indeps: &[
        range_from("AOATL", "CLL", 1),
        range_from("AOATH", "CLH", 0),
        range_from("MACHT", "CLL", 0),
    ],
    tables: &[
        spec("CLL", LOW), spec("CDL", LOW), spec("CML", LOW),
        spec("CLH", HIGH), spec("CDH", HIGH), spec("CMH", HIGH),
    ],
};

const AT1: &[&str] = &["FAOAT1"];
const AT2: &[&str] = &["FAOAT2"];
const ST1: &[&str] = &["FAOST1"];
const ST2: &[&str] = &["FAOST2"];
const LAS: &[&str] = &["FAOAT3", "FAOST1"];
const HAS: &[&str] = &["FAOAT3", "FAOST2"];

static FUSELAGE: SubType = SubType {
    label:  "fuselage 2-D uniform",
    indeps: &[
        range_from("FAOAT1", "CLFAL", 0),
        range_from("FAOAT2", "CLFAH", 0),
        range_from("FAOAT3", "CLFBAH", 0),
        range_from("FAOST1", "CDFBL", 0),
        range_from("FAOST2", "CDFBH", 0),
    ],
    tables: &[
        spec("CDFAH", AT2), spec("CDFAL", AT1), spec("CDFBH", ST2), spec("CDFBL", ST1),
        spec("CLFAH", AT2), spec("CLFAL", AT1), spec("CLFBAH", HAS), spec("CLFBAL", LAS),
        spec("CMFAL", AT1), spec("CMFAH", AT2), spec("CMFBAH", HAS), spec("CMFBAL", LAS),
        spec("CNFBAH", HAS), spec("CNFBAL", LAS), spec("CRFBAH", HAS), spec("CRFBAL", LAS),
        spec("CYFBAH", HAS), spec("CYFBAL", LAS),
    ],
};

fn sub_type(first_word: &str) -> Option<&'static SubType> {
    if first_word == "AOATL" {
        Some(&AIRFOIL)
    } else if first_word.starts_with("FAOA") || first_word.starts_with("FAOS") {
        Some(&FUSELAGE)
    } else {
        None
    }
}

/// Sub-type from the first significant token.
fn detect(tok: &mut Tokenizer) -> Result<&'static SubType, FormatError> {
    match tok.next_significant() {
        Token::Eof       => Err(FormatError::UnexpectedEof { line: tok.line() }),
        Token::Number(v) => Err(FormatError::Malformed {
            line:   tok.line(),
            detail: format!("expected an independent name, found {v}"),
        }),
        Token::Word(w) => {
            let found = sub_type(&w);
            tok.push_back(Token::Word(w));
            found.ok_or_else(|| FormatError::Unrecognized("unknown SAV file sub-type".into()))
        }
        _ => Err(FormatError::Unrecognized("unknown SAV file sub-type".into())),
    }
}

// ── Codec ────────────────────────────────────────────────────────────────────

pub struct FlightLabSavCodec;

impl Codec for FlightLabSavCodec {
    fn tag(&self) -> &'static str { "sav" }
    fn description(&self) -> &'static str { "FlightLab SAV" }
    fn extension(&self) -> &'static str { "sav" }
    fn can_write(&self) -> bool { true }

    fn can_read(&self, name: &str, input: &mut dyn BufRead) -> io::Result<Confidence> {
        let source = text::read_text(input)?;
        let mut tok = Tokenizer::new(&source, COMMENTS);
        if detect(&mut tok).is_ok() {
            return Ok(Confidence::Yes);
        }
        Ok(if text::has_extension(name, &["sav"]) { Confidence::Maybe } else { Confidence::No })
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError> {
        let source = text::read_text(input)?;
        let mut tok = Tokenizer::new(&source, COMMENTS);
        let set = detect(&mut tok)?;
        read_set(&mut tok, set)
    }

    fn encode(&self, output: &mut dyn Write, db: &TableDatabase) -> Result<(), FormatError> {
        let set = match (check_set(db, &AIRFOIL), check_set(db, &FUSELAGE)) {
            (Ok(()), _) => &AIRFOIL,
            (_, Ok(())) => &FUSELAGE,
            (Err(a), Err(f)) => {
                return Err(FormatError::Structure(format!(
                    "tables do not form a FlightLab SAV set ({a}; {f})",
                )));
            }
        };
        let rendered = render(db, set)?;
        output.write_all(rendered.as_bytes())?;
        output.flush()?;
        Ok(())
    }
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Position of `name` among the entries of `list` not yet found.
fn claim(
    tok: &Tokenizer,
    name: &str,
    list: &[&str],
    found: &mut [bool],
    what: &str,
) -> Result<usize, FormatError> {
    match list.iter().enumerate().position(|(k, n)| !found[k] && *n == name) {
        Some(k) => {
            found[k] = true;
            Ok(k)
        }
        None => {
            let remaining: Vec<&str> = list
                .iter()
                .zip(found.iter())
                .filter(|(_, f)| !**f)
                .map(|(n, _)| *n)
                .collect();
            Err(FormatError::Malformed {
                line:   tok.line(),
                detail: format!(
                    "unexpected {what} table name \"{name}\", expected one of {}",
                    remaining.join(", "),
                ),
            })
        }
    }
}

/// Breakpoints of a uniform `min/max/step` range.
fn uniform_breakpoints(min: f64, max: f64, step: f64, line: usize) -> Result<Vec<f64>, FormatError> {
    if !(step > 0.0) || max < min {
        return Err(FormatError::Malformed {
            line,
            detail: format!("invalid breakpoint range {min} .. {max} by {step}"),
        });
    }
    // Tolerance absorbs the rounding of the written range values.
    let steps = ((max - min) / step + 1e-6).floor();
    let n = if steps.is_finite() && steps < text::MAX_COUNT as f64 {
        (steps as usize).checked_add(1)
    } else {
        None
    };
    let n = n.ok_or_else(|| FormatError::Malformed {
        line,
        detail: format!("breakpoint range {min} .. {max} by {step} exceeds {} points", text::MAX_COUNT),
    })?;
    Ok((0..n).map(|k| min + step * k as f64).collect())
}

fn read_set(tok: &mut Tokenizer, set: &SubType) -> Result<TableDatabase, FormatError> {
    let indep_names: Vec<&str> = set.indeps.iter().map(|s| s.name).collect();
    let mut found = vec![false; indep_names.len()];
    let mut ranges: Vec<Vec<f64>> = vec![Vec::new(); indep_names.len()];
    for _ in 0..indep_names.len() {
        let word = tok.next_word()?;
        let k = claim(tok, &word, &indep_names, &mut found, "independent")?;
        // Parameter counts are always "3 1 0".
        tok.next_line();
        let min = tok.next_number()?;
        let max = tok.next_number()?;
        let step = tok.next_number()?;
        ranges[k] = uniform_breakpoints(min, max, step, tok.line())?;
        tok.next_line();
    }
    let range_of = |name: &str| -> Vec<f64> {
        indep_names
            .iter()
            .position(|n| *n == name)
            .map(|k| ranges[k].clone())
            .unwrap_or_default()
    };

    let table_names: Vec<&str> = set.tables.iter().map(|s| s.name).collect();
    let mut found = vec![false; table_names.len()];
    let mut tables: Vec<Option<Table>> = vec![None; table_names.len()];
    for _ in 0..table_names.len() {
        let word = tok.next_word()?;
        let k = claim(tok, &word, &table_names, &mut found, "dependent")?;
        let entry = &set.tables[k];
        let bps: Vec<Vec<f64>> = entry.indeps.iter().map(|n| range_of(n)).collect();
        let shape: Vec<usize> = bps.iter().map(Vec::len).collect();
        if text::element_count(&shape).is_none() {
            return Err(FormatError::Malformed {
                line:   tok.line(),
                detail: format!("table {} of shape {shape:?} is too large", entry.name),
            });
        }
        let mut table = Table::new(entry.name, entry.indeps, bps)?;

        let fast = entry.indeps[entry.indeps.len() - 1];
        let n_fast = table.num_breakpoints(table.dimensions() - 1);
        if tok.next_count()? != n_fast {
            return Err(FormatError::Malformed {
                line:   tok.line(),
                detail: format!("inconsistent number of breakpoints for {} and {fast}", entry.name),
            });
        }
        let n_slow = if table.dimensions() == 2 { table.num_breakpoints(0) } else { 1 };
        if tok.next_count()? != n_slow {
            let detail = if table.dimensions() == 2 {
                format!("inconsistent number of breakpoints for {} and {}", entry.name, entry.indeps[0])
            } else {
                format!("wrong number of dimensions for {}; expected 1", entry.name)
            };
            return Err(FormatError::Malformed { line: tok.line(), detail });
        }
        tok.next_line();

        let shape = table.shape().to_vec();
        for idx in row_major_indices(&shape) {
            let v = tok.next_number()?;
            table.set(&idx, v)?;
        }
        tables[k] = Some(table);
    }
    Ok(TableDatabase::from_tables(tables.into_iter().flatten()))
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn check_set(db: &TableDatabase, set: &SubType) -> Result<(), String> {
    if db.len() != set.tables.len() {
        return Err(format!(
            "{} set needs {} tables, found {}",
            set.label, set.tables.len(), db.len(),
        ));
    }
    for entry in set.tables {
        let table = db
            .get(entry.name)
            .ok_or_else(|| format!("{} set is missing table {}", set.label, entry.name))?;
        if table.indep_names() != entry.indeps {
            return Err(format!(
                "table {} must have independents {:?}, found {:?}",
                entry.name, entry.indeps, table.indep_names(),
            ));
        }
    }
    for indep in set.indeps {
        let source = source_breakpoints(db, indep)
            .ok_or_else(|| format!("no source table for {}", indep.name))?;
        if source.len() < 2 {
            return Err(format!("{} needs at least 2 breakpoints", indep.name));
        }
        let (min, step) = (source[0], source[1] - source[0]);
        let uniform = step > 0.0
            && source.iter().enumerate().all(|(i, bp)| {
                (bp - (min + step * i as f64)).abs() <= SPACING_TOLERANCE * step
            });
        if !uniform {
            return Err(format!("{} breakpoints are not evenly increasing", indep.name));
        }
        for entry in set.tables {
            let Some(table) = db.get(entry.name) else { continue };
            for (d, name) in entry.indeps.iter().enumerate() {
                if *name == indep.name && table.num_breakpoints(d) != source.len() {
                    return Err(format!(
                        "table {} has {} breakpoints for {}, expected {}",
                        entry.name, table.num_breakpoints(d), indep.name, source.len(),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn source_breakpoints<'a>(db: &'a TableDatabase, indep: &IndepSpec) -> Option<&'a [f64]> {
    let (table, dim) = indep.source;
    db.get(table)
        .filter(|t| dim < t.dimensions())
        .map(|t| t.breakpoints(dim))
}

/// Rounded to 8 places, 16 fraction digits, signed two-digit exponent.
fn sci(value: f64) -> String {
    let mut v = text::round_to(value, 8);
    if v == 0.0 { v = 0.0; }
    let s = format!("{v:.16E}");
    match s.split_once('E') {
        Some((mantissa, exp)) => {
            let e: i32 = exp.parse().unwrap_or(0);
            let sign = if e < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", e.abs())
        }
        None => s,
    }
}

fn render(db: &TableDatabase, set: &SubType) -> Result<String, FormatError> {
    let mut out = String::new();
    for note in db.notes() {
        out.push_str(&format!("# {note}\n"));
    }
    out.push_str("#.dat\n");
    out.push_str(&format!(
        "# Date:, {}, {}\n",
        text::timestamp("%-m/%-d/%y"),
        text::timestamp("%-I:%M:%S %p"),
    ));
    out.push_str("# File created by TableReader.\n");

    out.push_str("#Contents:\n");
    for indep in set.indeps {
        out.push_str(&format!("# {}\n", indep.name));
    }
    for entry in set.tables {
        out.push_str(&format!("# {}\n", entry.name));
    }

    for indep in set.indeps {
        let bp = source_breakpoints(db, indep).ok_or_else(|| {
            FormatError::Structure(format!("no source table for {}", indep.name))
        })?;
        let (min, max, step) = (bp[0], bp[bp.len() - 1], bp[1] - bp[0]);
        out.push_str(&format!("{} 3 1 0\n", indep.name));
        out.push_str(&format!("{:>24}{:>25}{:>25}\n\n", sci(min), sci(max), sci(step)));
    }

    for entry in set.tables {
        let table = db.get(entry.name).ok_or_else(|| {
            FormatError::Structure(format!("missing table {}", entry.name))
        })?;
        let dims = table.dimensions();
        let n_fast = table.num_breakpoints(dims - 1);
        let n_slow = if dims == 2 { table.num_breakpoints(0) } else { 1 };
        out.push_str(&format!("{} {n_fast} {n_slow} 0\n", entry.name));

        let mut count = 0;
        for &v in table.values().as_slice() {
            out.push_str(&format!("{:>24}", sci(v)));
            count += 1;
            if count == 3 {
                count = 0;
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push('\n');
    }
    Ok(out)
}
