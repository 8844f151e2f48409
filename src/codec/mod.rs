//! Table file codecs: identities, the shared trait and the static factory.
//!
//! # Identity rules
//! Every codec has a short format tag (`"nasa"`, `"fdhs"`, …) used by the
//! registry mapping files and by `save` calls, and a human-readable
//! description that fixes the registry's sort order.
//!
//! # Probing
//! [`Codec::can_read`] answers [`Confidence::Yes`] only on an unambiguous
//! signature inside the stream.  Extension matches answer `Maybe`.  A probe
//! may consume its input freely; the registry rewinds between probes.
//!
//! # Encoding
//! Writable codecs validate the whole database and render the complete file
//! in memory before writing.  A structural violation produces no output.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::array::IndexError;
use crate::database::TableDatabase;

pub mod text;
pub mod nasa;
pub mod fdhs;
pub mod flightlab;
pub mod otis;
pub mod post;
pub mod c81;

pub use c81::C81Codec;
pub use fdhs::FdhsCodec;
pub use flightlab::FlightLabSavCodec;
pub use nasa::NasaCodec;
pub use otis::OtisCodec;
pub use post::PostCodec;

// ── Probe confidence ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    No,
    Maybe,
    Yes,
}

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// Built-in codec discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Nasa,
    Fdhs,
    FlightLabSav,
    Otis,
    Post,
    C81,
}

impl CodecId {
    pub const ALL: [CodecId; 6] = [
        CodecId::Nasa,
        CodecId::Fdhs,
        CodecId::FlightLabSav,
        CodecId::Otis,
        CodecId::Post,
        CodecId::C81,
    ];

    /// Format tag; also the codec identifier in mapping files.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Nasa         => "nasa",
            CodecId::Fdhs         => "fdhs",
            CodecId::FlightLabSav => "sav",
            CodecId::Otis         => "otis",
            CodecId::Post         => "post",
            CodecId::C81          => "c81",
        }
    }

    /// Parse a tag or alias, case-insensitively.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "nasa"               => Some(CodecId::Nasa),
            "fdhs" | "fda"       => Some(CodecId::Fdhs),
            "sav"  | "flightlab" => Some(CodecId::FlightLabSav),
            "otis"               => Some(CodecId::Otis),
            "post"               => Some(CodecId::Post),
            "c81"  | "c-81"      => Some(CodecId::C81),
            _                    => None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unrecognized format: {0}")]
    Unrecognized(String),
    #[error("Ambiguous format, candidates: {}", candidates.join(", "))]
    Ambiguous { candidates: Vec<String> },
    #[error("Malformed input at line {line}: {detail}")]
    Malformed { line: usize, detail: String },
    #[error("Unexpected end of input at line {line}")]
    UnexpectedEof { line: usize },
    #[error("Structural constraint violated: {0}")]
    Structure(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Unknown format tag '{0}'")]
    UnknownFormat(String),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn tag(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Preferred file extension, without the dot.
    fn extension(&self) -> &'static str;
    fn can_write(&self) -> bool;
    fn can_read(&self, name: &str, input: &mut dyn BufRead) -> io::Result<Confidence>;
    fn decode(&self, input: &mut dyn BufRead) -> Result<TableDatabase, FormatError>;

    fn encode(&self, _output: &mut dyn Write, _db: &TableDatabase) -> Result<(), FormatError> {
        Err(FormatError::Unsupported(format!(
            "{} files can not be written",
            self.description(),
        )))
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Nasa         => Box::new(NasaCodec),
        CodecId::Fdhs         => Box::new(FdhsCodec),
        CodecId::FlightLabSav => Box::new(FlightLabSavCodec),
        CodecId::Otis         => Box::new(OtisCodec),
        CodecId::Post         => Box::new(PostCodec),
        CodecId::C81          => Box::new(C81Codec),
    }
}
