//! Open and save table files through a registry.
//!
//! Saving renders the whole file in memory first, so a database that the
//! target format can not represent leaves an existing file untouched.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use tracing::debug;

use crate::codec::{Codec, FormatError};
use crate::database::TableDatabase;
use crate::registry::CodecRegistry;

/// Resolve the codec for `input` and decode it.  `name` is the file name
/// used for extension hints.
pub fn open_stream<R: Read + Seek>(
    registry: &CodecRegistry,
    input: &mut R,
    name: &str,
) -> Result<TableDatabase, FormatError> {
    let codec = registry.resolve(input, name)?.into_codec()?;
    debug!(codec = codec.tag(), file = name, "decoding");
    codec.decode(&mut BufReader::new(input))
}

pub fn open_file<P: AsRef<Path>>(registry: &CodecRegistry, path: P) -> Result<TableDatabase, FormatError> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    open_stream(registry, &mut file, &file_name(path))
}

/// Decode with the codec registered under `tag`, skipping detection.
pub fn open_file_as<P: AsRef<Path>>(
    registry: &CodecRegistry,
    path: P,
    tag: &str,
) -> Result<TableDatabase, FormatError> {
    let codec = lookup(registry, tag)?;
    let file = File::open(path)?;
    codec.decode(&mut BufReader::new(file))
}

pub fn save_stream<W: Write>(
    registry: &CodecRegistry,
    output: &mut W,
    db: &TableDatabase,
    tag: &str,
) -> Result<(), FormatError> {
    let bytes = render(registry, db, tag)?;
    output.write_all(&bytes)?;
    output.flush()?;
    Ok(())
}

pub fn save_file<P: AsRef<Path>>(
    registry: &CodecRegistry,
    path: P,
    db: &TableDatabase,
    tag: &str,
) -> Result<(), FormatError> {
    let bytes = render(registry, db, tag)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn render(registry: &CodecRegistry, db: &TableDatabase, tag: &str) -> Result<Vec<u8>, FormatError> {
    let codec = lookup(registry, tag)?;
    if !codec.can_write() {
        return Err(FormatError::Unsupported(format!(
            "{} files can not be written",
            codec.description(),
        )));
    }
    let mut buf = Vec::new();
    codec.encode(&mut buf, db)?;
    debug!(codec = codec.tag(), tables = db.len(), bytes = buf.len(), "encoded");
    Ok(buf)
}

fn lookup<'a>(registry: &'a CodecRegistry, tag: &str) -> Result<&'a dyn Codec, FormatError> {
    registry.get(tag).ok_or_else(|| FormatError::UnknownFormat(tag.to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
