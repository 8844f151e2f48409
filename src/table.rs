//! Named N-dimensional breakpoint table.
//!
//! A table has one axis per dimension (independent variable name plus its
//! breakpoints) and a dependent [`ArrayNd`] whose shape is the vector of
//! breakpoint counts.  Breakpoints are expected to be strictly increasing;
//! construction does not enforce it, use [`Table::is_monotonic`] to check.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::array::{ArrayNd, IndexError};

/// One independent variable of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name:        String,
    pub breakpoints: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    name:   String,
    axes:   Vec<Axis>,
    values: ArrayNd,
    #[serde(default)]
    notes:  Vec<String>,
}

/// Unchecked serialized form; deserialization goes through [`Table::with_values`].
#[derive(Deserialize)]
struct RawTable {
    name:   String,
    axes:   Vec<Axis>,
    values: ArrayNd,
    #[serde(default)]
    notes:  Vec<String>,
}

impl TryFrom<RawTable> for Table {
    type Error = IndexError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let names: Vec<&str> = raw.axes.iter().map(|a| a.name.as_str()).collect();
        let breakpoints = raw.axes.iter().map(|a| a.breakpoints.clone()).collect();
        let mut table = Self::with_values(raw.name, &names, breakpoints, raw.values)?;
        table.notes = raw.notes;
        Ok(table)
    }
}

impl Table {
    /// N-D table with every dependent value set to zero, to be filled with
    /// [`Table::set`].
    pub fn new<S: Into<String>>(
        name: S,
        indep_names: &[&str],
        breakpoints: Vec<Vec<f64>>,
    ) -> Result<Self, IndexError> {
        let shape = axis_shape(indep_names, &breakpoints)?;
        let values = ArrayNd::new(&shape)?;
        Ok(Self::assemble(name.into(), indep_names, breakpoints, values))
    }

    /// N-D table around a pre-built dependent array.  The array shape must
    /// equal the breakpoint counts.
    pub fn with_values<S: Into<String>>(
        name: S,
        indep_names: &[&str],
        breakpoints: Vec<Vec<f64>>,
        values: ArrayNd,
    ) -> Result<Self, IndexError> {
        let shape = axis_shape(indep_names, &breakpoints)?;
        if values.shape() != shape.as_slice() {
            return Err(IndexError::InvalidShape(format!(
                "dependent shape {:?} does not match breakpoint counts {:?}",
                values.shape(), shape,
            )));
        }
        Ok(Self::assemble(name.into(), indep_names, breakpoints, values))
    }

    pub fn one_d<S: Into<String>>(
        name: S,
        indep: &str,
        breakpoints: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, IndexError> {
        let arr = ArrayNd::from_vec(&[breakpoints.len()], values)?;
        Self::with_values(name, &[indep], vec![breakpoints], arr)
    }

    /// 2-D table; `values` is row-major with `indep[0]` varying slowest.
    pub fn two_d<S: Into<String>>(
        name: S,
        indep: [&str; 2],
        bp0: Vec<f64>,
        bp1: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, IndexError> {
        let arr = ArrayNd::from_vec(&[bp0.len(), bp1.len()], values)?;
        Self::with_values(name, &indep, vec![bp0, bp1], arr)
    }

    fn assemble(name: String, indep_names: &[&str], breakpoints: Vec<Vec<f64>>, values: ArrayNd) -> Self {
        let axes = indep_names
            .iter()
            .zip(breakpoints)
            .map(|(n, bp)| Axis { name: (*n).to_string(), breakpoints: bp })
            .collect();
        Self { name, axes, values, notes: Vec::new() }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str { &self.name }

    pub fn set_name<S: Into<String>>(&mut self, name: S) { self.name = name.into(); }

    #[inline]
    pub fn dimensions(&self) -> usize { self.axes.len() }

    pub fn num_breakpoints(&self, dim: usize) -> usize { self.axes[dim].breakpoints.len() }

    pub fn breakpoints(&self, dim: usize) -> &[f64] { &self.axes[dim].breakpoints }

    pub fn indep_name(&self, dim: usize) -> &str { &self.axes[dim].name }

    pub fn indep_names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn axes(&self) -> &[Axis] { &self.axes }

    /// Breakpoint count of every dimension, slowest first.
    pub fn shape(&self) -> &[usize] { self.values.shape() }

    pub fn values(&self) -> &ArrayNd { &self.values }

    pub fn get(&self, index: &[usize]) -> Result<f64, IndexError> { self.values.get(index) }

    pub fn set(&mut self, index: &[usize], value: f64) -> Result<(), IndexError> {
        self.values.set(index, value)
    }

    pub fn add_note<S: Into<String>>(&mut self, note: S) { self.notes.push(note.into()); }

    pub fn notes(&self) -> &[String] { &self.notes }

    /// True when every breakpoint array is strictly increasing.
    pub fn is_monotonic(&self) -> bool {
        self.axes
            .iter()
            .all(|a| a.breakpoints.windows(2).all(|w| w[0] < w[1]))
    }
}

impl fmt::Display for Table {
    /// `CL(ALPHA[-10,20], MACH[0,0.9])`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, axis) in self.axes.iter().enumerate() {
            if i > 0 { f.write_str(", ")?; }
            let first = axis.breakpoints.first().copied().unwrap_or(0.0);
            let last  = axis.breakpoints.last().copied().unwrap_or(0.0);
            write!(f, "{}[{},{}]", axis.name, first, last)?;
        }
        f.write_str(")")
    }
}

fn axis_shape(indep_names: &[&str], breakpoints: &[Vec<f64>]) -> Result<Vec<usize>, IndexError> {
    if indep_names.len() != breakpoints.len() {
        return Err(IndexError::InvalidShape(format!(
            "{} independent names for {} breakpoint arrays",
            indep_names.len(), breakpoints.len(),
        )));
    }
    Ok(breakpoints.iter().map(Vec::len).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_d_table_accessors() {
        let t = Table::two_d(
            "CL", ["MACH", "ALPHA"],
            vec![0.3, 0.6], vec![-5.0, 0.0, 5.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        ).unwrap();
        assert_eq!(t.dimensions(), 2);
        assert_eq!(t.num_breakpoints(1), 3);
        assert_eq!(t.indep_names(), vec!["MACH", "ALPHA"]);
        assert_eq!(t.get(&[1, 0]).unwrap(), 4.0);
        assert_eq!(t.values().len(), 6);
        assert_eq!(t.to_string(), "CL(MACH[0.3,0.6], ALPHA[-5,5])");
    }

    #[test]
    fn empty_breakpoint_array_is_rejected() {
        assert!(Table::new("X", &["A"], vec![vec![]]).is_err());
        assert!(Table::new("X", &["A", "B"], vec![vec![1.0]]).is_err());
    }

    #[test]
    fn monotonic_check_is_advisory() {
        let t = Table::one_d("T", "X", vec![2.0, 1.0], vec![0.0, 0.0]).unwrap();
        assert!(!t.is_monotonic());
    }

    #[test]
    fn deserialization_keeps_axes_and_values_in_step() {
        let no_axes = r#"{"name":"T","axes":[],"values":{"shape":[1],"data":[0.0]}}"#;
        assert!(serde_json::from_str::<Table>(no_axes).is_err());

        let short = r#"{"name":"T","axes":[{"name":"X","breakpoints":[0.0,1.0,2.0]}],
                        "values":{"shape":[2],"data":[0.0,1.0]}}"#;
        assert!(serde_json::from_str::<Table>(short).is_err());

        let ok = r#"{"name":"T","axes":[{"name":"X","breakpoints":[0.0,1.0]}],
                     "values":{"shape":[2],"data":[5.0,6.0]},"notes":["n"]}"#;
        let t: Table = serde_json::from_str(ok).unwrap();
        assert_eq!(t.get(&[1]).unwrap(), 6.0);
        assert_eq!(t.notes(), &["n".to_string()]);
    }
}
