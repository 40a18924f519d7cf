//! Block-partitioned dense matrix of `f64`, stored as a directory of zstd-compressed blocks.
//!
//! ```text
//! result-1.bm/
//!   metadata.json        {"n_rows": .., "n_cols": .., "block_size": ..}
//!   block-0-0.zst        row-major little-endian f64, at most block_size x block_size
//!   block-0-1.zst
//!   ...
//! ```

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatrixMetadata {
    pub n_rows: usize,
    pub n_cols: usize,
    pub block_size: usize,
}

/// A stored block matrix, optionally viewed transposed.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockMatrix {
    dir: PathBuf,
    metadata: MatrixMetadata,
    transposed: bool,
}

impl BlockMatrix {
    /// Write an `n_rows x n_cols` matrix, filling each cell from `entry(row, col)`.
    pub fn write_from_entries<F>(
        dir: &Path,
        n_rows: usize,
        n_cols: usize,
        block_size: usize,
        overwrite: bool,
        entry: F,
    ) -> Result<BlockMatrix, Report>
    where
        F: Fn(usize, usize) -> f64,
    {
        if block_size == 0 {
            return Err(eyre!("Block size must be positive."));
        }
        if dir.exists() {
            if !overwrite {
                return Err(eyre!("Block matrix already exists: {dir:?}")
                    .suggestion("Pass overwrite to replace it."));
            }
            std::fs::remove_dir_all(dir).wrap_err_with(|| eyre!("Failed to remove: {dir:?}"))?;
        }
        std::fs::create_dir_all(dir).wrap_err_with(|| eyre!("Failed to create: {dir:?}"))?;

        let metadata = MatrixMetadata { n_rows, n_cols, block_size };
        for i in 0..n_rows.div_ceil(block_size) {
            for j in 0..n_cols.div_ceil(block_size) {
                let rows = block_range(i, block_size, n_rows);
                let cols = block_range(j, block_size, n_cols);
                let mut bytes = Vec::with_capacity(rows.len() * cols.len() * 8);
                for r in rows {
                    for c in cols.clone() {
                        bytes.extend_from_slice(&entry(r, c).to_le_bytes());
                    }
                }
                let path = dir.join(block_name(i, j));
                let compressed = zstd::stream::encode_all(bytes.as_slice(), 3)
                    .wrap_err_with(|| eyre!("Failed to compress: {path:?}"))?;
                let mut file =
                    File::create(&path).wrap_err_with(|| eyre!("Failed to create: {path:?}"))?;
                file.write_all(&compressed).wrap_err_with(|| eyre!("Failed to write: {path:?}"))?;
            }
        }

        let metadata_path = dir.join(METADATA_FILE);
        let file = File::create(&metadata_path)
            .wrap_err_with(|| eyre!("Failed to create: {metadata_path:?}"))?;
        serde_json::to_writer(file, &metadata)?;
        debug!("Wrote {n_rows} x {n_cols} block matrix to {dir:?}");

        Ok(BlockMatrix { dir: dir.to_path_buf(), metadata, transposed: false })
    }

    pub fn read(dir: &Path) -> Result<BlockMatrix, Report> {
        let metadata_path = dir.join(METADATA_FILE);
        let file = File::open(&metadata_path)
            .wrap_err_with(|| eyre!("Failed to read block matrix: {dir:?}"))?;
        let metadata: MatrixMetadata = serde_json::from_reader(file)
            .wrap_err_with(|| eyre!("Failed to parse: {metadata_path:?}"))?;
        Ok(BlockMatrix { dir: dir.to_path_buf(), metadata, transposed: false })
    }

    /// `(rows, cols)` of this view.
    pub fn shape(&self) -> (usize, usize) {
        match self.transposed {
            false => (self.metadata.n_rows, self.metadata.n_cols),
            true => (self.metadata.n_cols, self.metadata.n_rows),
        }
    }

    /// Transposed view, no data is moved.
    pub fn transpose(&self) -> BlockMatrix {
        BlockMatrix { transposed: !self.transposed, ..self.clone() }
    }

    /// Dense rows `rows` of this view, reading only the blocks they touch.
    pub fn slice_rows(&self, rows: Range<usize>) -> Result<Vec<Vec<f64>>, Report> {
        let (n_rows, n_cols) = self.shape();
        if rows.end > n_rows || rows.start > rows.end {
            return Err(eyre!("Row range {rows:?} is out of bounds for {n_rows} rows."));
        }
        let mut output = vec![vec![0.0; n_cols]; rows.len()];
        if rows.is_empty() || n_cols == 0 {
            return Ok(output);
        }

        let size = self.metadata.block_size;
        // blocks along the stored axis that this view's rows map to
        let first = rows.start / size;
        let last = (rows.end - 1) / size;
        let n_other = n_cols.div_ceil(size);

        for b in first..=last {
            for o in 0..n_other {
                let (i, j) = if self.transposed { (o, b) } else { (b, o) };
                let block = self.read_block(i, j)?;
                let stored_rows = block_range(i, size, self.metadata.n_rows);
                let stored_cols = block_range(j, size, self.metadata.n_cols);
                let width = stored_cols.len();

                for (k, value) in block.into_iter().enumerate() {
                    let (r, c) = (stored_rows.start + k / width, stored_cols.start + k % width);
                    let (view_r, view_c) = if self.transposed { (c, r) } else { (r, c) };
                    if rows.contains(&view_r) {
                        output[view_r - rows.start][view_c] = value;
                    }
                }
            }
        }
        Ok(output)
    }

    fn read_block(&self, i: usize, j: usize) -> Result<Vec<f64>, Report> {
        let path = self.dir.join(block_name(i, j));
        let file = File::open(&path).wrap_err_with(|| eyre!("Failed to read block: {path:?}"))?;
        let mut bytes = Vec::new();
        zstd::stream::read::Decoder::new(file)?
            .read_to_end(&mut bytes)
            .wrap_err_with(|| eyre!("Failed to decompress block: {path:?}"))?;
        let values = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buffer = [0u8; 8];
                buffer.copy_from_slice(chunk);
                f64::from_le_bytes(buffer)
            })
            .collect();
        Ok(values)
    }
}

fn block_name(i: usize, j: usize) -> String {
    format!("block-{i}-{j}.zst")
}

fn block_range(index: usize, size: usize, n: usize) -> Range<usize> {
    let start = index * size;
    start..(start + size).min(n)
}
