//! Gzipped JSON files holding one chemical system's catalog entries.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::CatalogEntry;

/// Path of the entry file for `chemsys` under `dir`.
#[must_use]
pub fn entries_path(dir: &Path, chemsys: &str) -> PathBuf {
    dir.join(format!("{chemsys}.json.gz"))
}

/// Writes `entries` as a gzipped JSON array, atomically.
pub fn write_entries(path: &Path, entries: &[CatalogEntry]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut encoder = GzEncoder::new(BufWriter::new(tmp.as_file_mut()), Compression::default());
        serde_json::to_writer(&mut encoder, entries)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reads an entry file written by [`write_entries`].
pub fn read_entries(path: &Path) -> io::Result<Vec<CatalogEntry>> {
    let file = File::open(path)?;
    let reader = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(reader).map_err(io::Error::from)
}
