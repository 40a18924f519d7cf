//! Gzipped CSV export of a transposed score matrix.

use crate::matrix::BlockMatrix;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExportError {
    #[error("{declared} individuals are declared but the matrix has {matrix} rows.")]
    RowMismatch { declared: usize, matrix: usize },
    #[error("{declared} genes are declared but the matrix has {matrix} columns.")]
    ColumnMismatch { declared: usize, matrix: usize },
}

/// Header of the export: `s`, the scored genes, then the zero-variant genes.
pub fn header(genes: &[String], zero_genes: &[String]) -> Vec<String> {
    std::iter::once("s".to_string()).chain(genes.iter().cloned()).chain(zero_genes.iter().cloned()).collect()
}

/// Write `matrix` (individuals by genes) to `path`, `batch_rows` individuals at a time.
///
/// Every line is padded with one `0` per zero-variant gene.
pub fn write_csv(
    matrix: &BlockMatrix,
    samples: &[String],
    genes: &[String],
    zero_genes: &[String],
    path: &Path,
    batch_rows: usize,
) -> Result<(), Report> {
    let (n_rows, n_cols) = matrix.shape();
    if samples.len() != n_rows {
        return Err(ExportError::RowMismatch { declared: samples.len(), matrix: n_rows }.into());
    }
    if genes.len() != n_cols {
        return Err(ExportError::ColumnMismatch { declared: genes.len(), matrix: n_cols }.into());
    }

    let file = File::create(path).wrap_err_with(|| eyre!("Failed to create: {path:?}"))?;
    let mut writer = csv::WriterBuilder::new()
        .flexible(false)
        .from_writer(GzEncoder::new(file, Compression::default()));
    writer.write_record(header(genes, zero_genes))?;

    let batch_rows = batch_rows.max(1);
    for start in (0..n_rows).step_by(batch_rows) {
        let end = (start + batch_rows).min(n_rows);
        debug!("Exporting rows {start}..{end}");
        for (i, values) in matrix.slice_rows(start..end)?.into_iter().enumerate() {
            let record = std::iter::once(samples[start + i].clone())
                .chain(values.into_iter().map(|v| (v as i8).to_string()))
                .chain(zero_genes.iter().map(|_| "0".to_string()));
            writer.write_record(record)?;
        }
    }

    let encoder = writer.into_inner().map_err(|e| eyre!("Failed to flush: {path:?}: {e}"))?;
    encoder.finish().wrap_err_with(|| eyre!("Failed to finish: {path:?}"))?;
    Ok(())
}
