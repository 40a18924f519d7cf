//! Directory-backed table storage addressed by canonical path strings.
//!
//! A stored table is a directory holding `metadata.json`, a zstd-compressed
//! `rows.json.zst` payload and, written last, the completion marker.

use crate::manifest::SUCCESS_MARKER;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use loftee_path::{PathDx, DRV_DNAX, DRV_LOCAL};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.json";
pub const ROWS_FILE: &str = "rows.json.zst";

/// Values that can be written as a table directory.
pub trait Stored: Serialize + DeserializeOwned {
    /// Kind recorded in the metadata and checked on read.
    const KIND: &'static str;

    /// Column keys.
    fn columns(&self) -> Vec<String>;

    fn n_rows(&self) -> usize;
}

/// Contents of `metadata.json`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Metadata {
    pub kind: String,
    pub created: DateTime<Utc>,
    pub columns: Vec<String>,
    pub n_rows: usize,
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

/// Reads and writes tables by canonical path string.
///
/// `file://` paths map to the host filesystem. `dnax://<id>/<path>` paths
/// map to `<dnax_root>/<id>/<path>`, the mounted view of the database.
///
/// ```rust
/// use loftee::table::Store;
/// use loftee_path::PathDx;
/// use std::path::PathBuf;
///
/// let store = Store::new(Some(PathBuf::from("/mnt/dnax")));
/// let path = PathDx::from_database_id("database-1", ["chr-1-b0.mt"]);
/// assert_eq!(store.locate(&path)?, PathBuf::from("/mnt/dnax/database-1/chr-1-b0.mt"));
///
/// let store = Store::default();
/// assert!(store.locate(&path).is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct Store {
    pub dnax_root: Option<PathBuf>,
}

impl Store {
    pub fn new(dnax_root: Option<PathBuf>) -> Self {
        Store { dnax_root }
    }

    /// Host location of a path, resolved from its canonical string.
    pub fn locate(&self, path: &PathDx) -> Result<PathBuf, Report> {
        let rstr = path.rstr()?;
        if let Some(local) = rstr.strip_prefix(DRV_LOCAL) {
            return Ok(PathBuf::from(local));
        }
        let Some(remote) = rstr.strip_prefix(DRV_DNAX) else {
            return Err(eyre!("Unsupported path scheme: {rstr}"));
        };
        let Some(root) = &self.dnax_root else {
            return Err(eyre!("No storage root is configured for database paths: {rstr}")
                .suggestion("Set dnax_root in the config to the mounted database directory."));
        };
        Ok(root.join(remote.trim_start_matches('/')))
    }

    /// Write a table directory, the completion marker last.
    pub fn write<T: Stored>(&self, value: &T, path: &PathDx, overwrite: bool) -> Result<(), Report> {
        let dir = self.locate(path)?;
        if dir.exists() {
            if !overwrite {
                return Err(eyre!("Table already exists: {path}")
                    .suggestion("Pass overwrite to replace it."));
            }
            debug!("Removing existing table: {dir:?}");
            std::fs::remove_dir_all(&dir).wrap_err_with(|| eyre!("Failed to remove: {dir:?}"))?;
        }
        std::fs::create_dir_all(&dir).wrap_err_with(|| eyre!("Failed to create: {dir:?}"))?;

        let metadata = Metadata {
            kind: T::KIND.to_string(),
            created: Utc::now(),
            columns: value.columns(),
            n_rows: value.n_rows(),
        };
        let metadata_path = dir.join(METADATA_FILE);
        let file = File::create(&metadata_path)
            .wrap_err_with(|| eyre!("Failed to create: {metadata_path:?}"))?;
        serde_json::to_writer_pretty(file, &metadata)
            .wrap_err_with(|| eyre!("Failed to write: {metadata_path:?}"))?;

        let rows_path = dir.join(ROWS_FILE);
        let file =
            File::create(&rows_path).wrap_err_with(|| eyre!("Failed to create: {rows_path:?}"))?;
        let mut encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), 3)?;
        serde_json::to_writer(&mut encoder, value)
            .wrap_err_with(|| eyre!("Failed to write: {rows_path:?}"))?;
        encoder.finish()?.flush()?;

        File::create(dir.join(SUCCESS_MARKER))
            .wrap_err_with(|| eyre!("Failed to write completion marker: {dir:?}"))?;
        debug!("Wrote {} {} rows to {path}", metadata.n_rows, T::KIND);
        Ok(())
    }

    /// Read the metadata of a complete table.
    pub fn read_metadata(&self, path: &PathDx) -> Result<Metadata, Report> {
        let dir = self.locate(path)?;
        if !dir.join(SUCCESS_MARKER).exists() {
            return Err(eyre!("Table is incomplete, no {SUCCESS_MARKER}: {path}"));
        }
        let metadata_path = dir.join(METADATA_FILE);
        let file = File::open(&metadata_path)
            .wrap_err_with(|| eyre!("Failed to read: {metadata_path:?}"))?;
        let metadata: Metadata = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| eyre!("Failed to parse: {metadata_path:?}"))?;
        Ok(metadata)
    }

    /// Column keys of a stored table, without decoding its rows.
    pub fn read_columns(&self, path: &PathDx) -> Result<Vec<String>, Report> {
        Ok(self.read_metadata(path)?.columns)
    }

    /// Read a complete table.
    pub fn read<T: Stored>(&self, path: &PathDx) -> Result<T, Report> {
        let metadata = self.read_metadata(path)?;
        if metadata.kind != T::KIND {
            return Err(eyre!("Expected a {}, found a {}: {path}", T::KIND, metadata.kind));
        }
        let rows_path = self.locate(path)?.join(ROWS_FILE);
        let file = File::open(&rows_path).wrap_err_with(|| eyre!("Failed to read: {rows_path:?}"))?;
        let decoder = zstd::stream::read::Decoder::new(file)
            .wrap_err_with(|| eyre!("Failed to decode: {rows_path:?}"))?;
        let value = serde_json::from_reader(BufReader::new(decoder))
            .wrap_err_with(|| eyre!("Failed to parse: {rows_path:?}"))?;
        Ok(value)
    }

    /// Write and read back, so later steps start from the persisted copy.
    pub fn checkpoint<T: Stored>(&self, value: T, path: &PathDx) -> Result<T, Report> {
        info!("Checkpoint: {path}");
        self.write(&value, path, true)?;
        drop(value);
        self.read(path)
    }

    /// Copy an input file into `staging_dir`. The copy is removed when the guard drops.
    pub fn stage(&self, input: &PathDx, staging_dir: &Path) -> Result<Staged, Report> {
        let source = self.locate(input)?;
        let name = source.file_name().ok_or_else(|| eyre!("Input has no file name: {input}"))?;
        std::fs::create_dir_all(staging_dir)
            .wrap_err_with(|| eyre!("Failed to create: {staging_dir:?}"))?;
        let path = staging_dir.join(name);
        info!("Copying {}...", PathDx::local([&path]).rstr()?);
        let copied = std::fs::copy(&source, &path)
            .wrap_err_with(|| eyre!("Failed to copy {source:?} to {path:?}"));
        if let Err(e) = copied {
            if path.exists() {
                if let Err(remove) = std::fs::remove_file(&path) {
                    warn!("Failed to remove partial copy {path:?}: {remove}");
                }
            }
            return Err(e);
        }
        Ok(Staged { path })
    }
}

// ----------------------------------------------------------------------------
// Staged
// ----------------------------------------------------------------------------

/// A staged local copy, deleted on drop.
#[derive(Debug)]
pub struct Staged {
    path: PathBuf,
}

impl Staged {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_dx(&self) -> PathDx {
        PathDx::local([&self.path])
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove staged copy {:?}: {e}", self.path);
        } else {
            debug!("Removed staged copy: {:?}", self.path);
        }
    }
}
