//! The codec registry: which codecs exist, and which one can read a stream.
//!
//! # Construction
//! A registry is built once, explicitly, and never changes afterwards.  It
//! is either the full built-in set or the set selected by `table-codecs.json`
//! mapping files found on a search path:
//!
//! ```json
//! { "nasa": "nasa", "fda": "fdhs", "flightlab": "sav" }
//! ```
//!
//! Keys are format tags, values are codec identifiers accepted by
//! [`CodecId::from_name`].  Every key becomes a tag [`CodecRegistry::get`]
//! answers to; the first file on the path to define a key wins.  A broken
//! file or entry is skipped with a warning.
//! When no mapping file exists anywhere on the path the built-in set is used.
//!
//! # Resolution
//! Codecs probe the stream one after another, in description order, each
//! seeing at most [`PROBE_LIMIT`] bytes from the starting position.  The
//! first `Yes` wins outright; otherwise the `Maybe` answers decide.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::{get_codec, Codec, CodecId, Confidence, FormatError};

/// File name looked up in every search path directory.
pub const MAPPING_FILE: &str = "table-codecs.json";
/// Environment variable holding the search path.
pub const CODEC_PATH_ENV: &str = "AEROTAB_CODEC_PATH";
/// Bytes a single probe may read.
pub const PROBE_LIMIT: u64 = 1_024_000;

/// Outcome of [`CodecRegistry::resolve`].
pub enum Resolution<'a> {
    Found(&'a dyn Codec),
    /// Several codecs answered `Maybe`; in registry order.
    Ambiguous(Vec<&'a dyn Codec>),
}

impl<'a> Resolution<'a> {
    /// The single codec, or `FormatError::Ambiguous` naming the candidates.
    pub fn into_codec(self) -> Result<&'a dyn Codec, FormatError> {
        match self {
            Resolution::Found(codec) => Ok(codec),
            Resolution::Ambiguous(candidates) => Err(FormatError::Ambiguous {
                candidates: candidates.iter().map(|c| c.tag().to_string()).collect(),
            }),
        }
    }
}

pub struct CodecRegistry {
    codecs:  Vec<Box<dyn Codec>>,
    /// Format tag from a mapping file → codec tag.
    aliases: BTreeMap<String, &'static str>,
}

impl CodecRegistry {
    /// Every built-in codec.
    pub fn builtin() -> Self {
        Self::with_codecs(CodecId::ALL.iter().map(|&id| get_codec(id)).collect())
    }

    /// Registry over an explicit codec list.  Later duplicates of a tag are
    /// dropped; the result is sorted by description.
    pub fn with_codecs(codecs: Vec<Box<dyn Codec>>) -> Self {
        let mut unique: Vec<Box<dyn Codec>> = Vec::with_capacity(codecs.len());
        for codec in codecs {
            if unique.iter().any(|c| c.tag() == codec.tag()) {
                debug!(tag = codec.tag(), "duplicate codec dropped");
                continue;
            }
            unique.push(codec);
        }
        unique.sort_by(|a, b| a.description().cmp(b.description()));
        Self { codecs: unique, aliases: BTreeMap::new() }
    }

    /// Registry selected by the mapping files on `search_path`.
    pub fn discover<P: AsRef<Path>>(search_path: &[P]) -> Self {
        let mut found_any = false;
        let mut ids = Vec::new();
        let mut aliases = BTreeMap::new();
        for dir in search_path {
            let file = dir.as_ref().join(MAPPING_FILE);
            if !file.is_file() {
                continue;
            }
            found_any = true;
            match read_mapping(&file) {
                Ok(mapping) => {
                    for (tag, ident) in mapping {
                        match CodecId::from_name(&ident) {
                            Some(id) => {
                                aliases.entry(tag.trim().to_lowercase()).or_insert(id.name());
                                ids.push(id);
                            }
                            None => warn!(
                                file = %file.display(), %tag, codec = %ident,
                                "unknown codec identifier, entry skipped"
                            ),
                        }
                    }
                }
                Err(e) => warn!(file = %file.display(), error = %e, "codec mapping skipped"),
            }
        }
        if !found_any {
            debug!("no codec mapping found on the search path, using built-in codecs");
            return Self::builtin();
        }
        let mut registry = Self::with_codecs(ids.into_iter().map(get_codec).collect());
        registry.aliases = aliases;
        registry
    }

    /// [`discover`](Self::discover) over `AEROTAB_CODEC_PATH`, or the
    /// built-in set when the variable is unset.
    pub fn from_env() -> Self {
        match env::var_os(CODEC_PATH_ENV) {
            Some(path) => Self::discover(&env::split_paths(&path).collect::<Vec<PathBuf>>()),
            None       => Self::builtin(),
        }
    }

    /// Codec for `tag`: a codec's own tag, a mapping file key, or a
    /// [`CodecId`] alias, in that order.  Case-insensitive.
    pub fn get(&self, tag: &str) -> Option<&dyn Codec> {
        let tag = tag.trim().to_lowercase();
        let find = |t: &str| self.codecs.iter().find(|c| c.tag() == t).map(|c| c.as_ref());
        find(tag.as_str())
            .or_else(|| self.aliases.get(&tag).and_then(|t| find(*t)))
            .or_else(|| CodecId::from_name(&tag).and_then(|id| find(id.name())))
    }

    pub fn codecs(&self) -> impl Iterator<Item = &dyn Codec> {
        self.codecs.iter().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize { self.codecs.len() }

    pub fn is_empty(&self) -> bool { self.codecs.is_empty() }

    /// Find the codec for `input`.  The stream is left where it started.
    pub fn resolve<R: Read + Seek>(&self, input: &mut R, name: &str) -> Result<Resolution<'_>, FormatError> {
        let start = input.stream_position()?;
        let mut candidates = Vec::new();
        for codec in &self.codecs {
            let answer = {
                let mut probe = BufReader::new((&mut *input).take(PROBE_LIMIT));
                codec.can_read(name, &mut probe)
            };
            input.seek(SeekFrom::Start(start))?;
            let answer = answer?;
            debug!(codec = codec.tag(), file = name, ?answer, "probe");
            match answer {
                Confidence::Yes   => return Ok(Resolution::Found(codec.as_ref())),
                Confidence::Maybe => candidates.push(codec.as_ref()),
                Confidence::No    => {}
            }
        }
        match candidates.len() {
            0 => Err(FormatError::Unrecognized(format!("no codec can read \"{name}\""))),
            1 => Ok(Resolution::Found(candidates[0])),
            _ => Ok(Resolution::Ambiguous(candidates)),
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self { Self::builtin() }
}

fn read_mapping(file: &Path) -> Result<BTreeMap<String, String>, Box<dyn std::error::Error>> {
    let bytes = fs::read(file)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn builtin_is_sorted_by_description() {
        let reg = CodecRegistry::builtin();
        assert_eq!(reg.len(), 6);
        let descs: Vec<&str> = reg.codecs().map(|c| c.description()).collect();
        let mut sorted = descs.clone();
        sorted.sort();
        assert_eq!(descs, sorted);
        assert_eq!(reg.get("SAV").map(|c| c.tag()), Some("sav"));
        assert_eq!(reg.get("fda").map(|c| c.tag()), Some("fdhs"));
        assert_eq!(reg.get("FlightLab").map(|c| c.tag()), Some("sav"));
        assert!(reg.get("zip").is_none());
    }

    #[test]
    fn duplicates_collapse() {
        let reg = CodecRegistry::with_codecs(vec![
            get_codec(CodecId::Post),
            get_codec(CodecId::Nasa),
            get_codec(CodecId::Post),
        ]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn signature_short_circuits_and_rewinds() {
        let reg = CodecRegistry::builtin();
        let mut input = Cursor::new(b" $\np$tab\n table = 'X', 1, 'A', 1, 8*1,\n 0, 1,\n $\n".to_vec());
        let codec = reg.resolve(&mut input, "deck.dat").unwrap().into_codec().unwrap();
        assert_eq!(codec.tag(), "post");
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn single_maybe_is_found() {
        let reg = CodecRegistry::builtin();
        let mut input = Cursor::new(b"CL\n".to_vec());
        let codec = reg.resolve(&mut input, "deck.itd").unwrap().into_codec().unwrap();
        assert_eq!(codec.tag(), "otis");
    }

    #[test]
    fn mapping_files_select_codecs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MAPPING_FILE),
            r#"{ "nasa": "nasa", "fda": "fdhs", "zip": "deflate" }"#,
        ).unwrap();
        let broken = tempfile::tempdir().unwrap();
        fs::write(broken.path().join(MAPPING_FILE), "{ not json").unwrap();

        let reg = CodecRegistry::discover(&[broken.path(), dir.path()]);
        let tags: Vec<&str> = reg.codecs().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["fdhs", "nasa"]);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(CodecRegistry::discover(&[empty.path()]).len(), 6);
    }

    #[test]
    fn nothing_matches() {
        let reg = CodecRegistry::builtin();
        let mut input = Cursor::new(b"hello".to_vec());
        assert!(matches!(
            reg.resolve(&mut input, "notes.txt"),
            Err(FormatError::Unrecognized(_)),
        ));
    }

    #[test]
    fn mapping_keys_name_their_codecs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MAPPING_FILE),
            r#"{ "aero-deck": "FDA", "ascent": "post" }"#,
        ).unwrap();
        let reg = CodecRegistry::discover(&[dir.path()]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("Aero-Deck").map(|c| c.tag()), Some("fdhs"));
        assert_eq!(reg.get("ascent").map(|c| c.tag()), Some("post"));
        assert_eq!(reg.get("fda").map(|c| c.tag()), Some("fdhs"));
        assert!(reg.get("nasa").is_none());
    }
}
