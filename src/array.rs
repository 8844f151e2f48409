//! Dense N-dimensional `f64` storage.
//!
//! # Layout
//! Values are stored row-major in one flat buffer: dimension 0 varies
//! slowest, the last dimension fastest.  The shape is fixed at construction
//! and never changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index has {found} components but the array has rank {expected}")]
    RankMismatch { expected: usize, found: usize },
    #[error("index {index} is out of range for dimension {dim} (extent {extent})")]
    OutOfRange { dim: usize, index: usize, extent: usize },
    #[error("invalid shape: {0}")]
    InvalidShape(String),
}

// ── ArrayNd ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArray")]
pub struct ArrayNd {
    shape: Vec<usize>,
    data:  Vec<f64>,
}

/// Unchecked serialized form; deserialization goes through [`ArrayNd::from_vec`].
#[derive(Deserialize)]
struct RawArray {
    shape: Vec<usize>,
    data:  Vec<f64>,
}

impl TryFrom<RawArray> for ArrayNd {
    type Error = IndexError;

    fn try_from(raw: RawArray) -> Result<Self, Self::Error> {
        Self::from_vec(&raw.shape, raw.data)
    }
}

impl ArrayNd {
    /// Zero-filled array.  Rank must be at least 1 and every extent at least 1.
    pub fn new(shape: &[usize]) -> Result<Self, IndexError> {
        let len = checked_len(shape)?;
        Ok(Self { shape: shape.to_vec(), data: vec![0.0; len] })
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self, IndexError> {
        let len = checked_len(shape)?;
        if data.len() != len {
            return Err(IndexError::InvalidShape(format!(
                "{} values supplied for shape {:?} ({} cells)",
                data.len(), shape, len,
            )));
        }
        Ok(Self { shape: shape.to_vec(), data })
    }

    #[inline]
    pub fn rank(&self) -> usize { self.shape.len() }

    #[inline]
    pub fn shape(&self) -> &[usize] { &self.shape }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    /// Always false: every extent is at least one.
    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn get(&self, index: &[usize]) -> Result<f64, IndexError> {
        let off = self.offset(index)?;
        Ok(self.data[off])
    }

    pub fn set(&mut self, index: &[usize], value: f64) -> Result<(), IndexError> {
        let off = self.offset(index)?;
        self.data[off] = value;
        Ok(())
    }

    /// Flat row-major view.
    pub fn as_slice(&self) -> &[f64] { &self.data }

    pub fn as_mut_slice(&mut self) -> &mut [f64] { &mut self.data }

    fn offset(&self, index: &[usize]) -> Result<usize, IndexError> {
        if index.len() != self.shape.len() {
            return Err(IndexError::RankMismatch {
                expected: self.shape.len(),
                found:    index.len(),
            });
        }
        let mut off = 0usize;
        for (dim, (&i, &extent)) in index.iter().zip(&self.shape).enumerate() {
            if i >= extent {
                return Err(IndexError::OutOfRange { dim, index: i, extent });
            }
            off = off * extent + i;
        }
        Ok(off)
    }
}

// ── Index iteration ──────────────────────────────────────────────────────────

/// Every index vector of `shape` in row-major order.  An empty shape yields a
/// single empty index, so callers can iterate "the slow dimensions" of a
/// table that has none.
pub fn row_major_indices(shape: &[usize]) -> RowMajor {
    let done = shape.iter().any(|&e| e == 0);
    RowMajor { shape: shape.to_vec(), next: Some(vec![0; shape.len()]).filter(|_| !done) }
}

pub struct RowMajor {
    shape: Vec<usize>,
    next:  Option<Vec<usize>>,
}

impl Iterator for RowMajor {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for d in (0..succ.len()).rev() {
            succ[d] += 1;
            if succ[d] < self.shape[d] {
                self.next = Some(succ);
                return Some(current);
            }
            succ[d] = 0;
        }
        Some(current)
    }
}

fn checked_len(shape: &[usize]) -> Result<usize, IndexError> {
    if shape.is_empty() {
        return Err(IndexError::InvalidShape("rank must be at least 1".into()));
    }
    let mut len = 1usize;
    for (dim, &extent) in shape.iter().enumerate() {
        if extent == 0 {
            return Err(IndexError::InvalidShape(format!("dimension {dim} has zero extent")));
        }
        len = len.checked_mul(extent).ok_or_else(|| {
            IndexError::InvalidShape(format!("shape {shape:?} overflows usize"))
        })?;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let mut a = ArrayNd::new(&[2, 3]).unwrap();
        a.set(&[1, 0], 7.0).unwrap();
        a.set(&[0, 2], 5.0).unwrap();
        assert_eq!(a.as_slice(), &[0.0, 0.0, 5.0, 7.0, 0.0, 0.0]);
        assert_eq!(a.get(&[1, 0]).unwrap(), 7.0);
    }

    #[test]
    fn rank_and_range_errors_are_distinct() {
        let a = ArrayNd::new(&[2, 2]).unwrap();
        assert_eq!(a.get(&[0]), Err(IndexError::RankMismatch { expected: 2, found: 1 }));
        assert_eq!(
            a.get(&[0, 2]),
            Err(IndexError::OutOfRange { dim: 1, index: 2, extent: 2 }),
        );
    }

    #[test]
    fn indices_follow_storage_order() {
        let a = ArrayNd::from_vec(&[2, 3], (0..6).map(f64::from).collect()).unwrap();
        let seen: Vec<f64> = row_major_indices(a.shape())
            .map(|i| a.get(&i).unwrap())
            .collect();
        assert_eq!(seen, a.as_slice());
        assert_eq!(row_major_indices(&[]).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(ArrayNd::new(&[]), Err(IndexError::InvalidShape(_))));
        assert!(matches!(ArrayNd::new(&[3, 0]), Err(IndexError::InvalidShape(_))));
        assert!(ArrayNd::from_vec(&[2, 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn deserialization_checks_the_shape() {
        let a: ArrayNd = serde_json::from_str(r#"{"shape":[2],"data":[1.0,2.0]}"#).unwrap();
        assert_eq!(a.as_slice(), &[1.0, 2.0]);
        assert!(serde_json::from_str::<ArrayNd>(r#"{"shape":[3],"data":[1.0]}"#).is_err());
        assert!(serde_json::from_str::<ArrayNd>(r#"{"shape":[],"data":[0.0]}"#).is_err());
    }
}
