//! Per-chromosome aggregation of annotated units into a gene-by-individual LOF export.
//!
//! For each requested chromosome, once every unit output is complete:
//!
//! 1. Subset all units to the individuals they share (and the allow-list).
//! 2. Union units in balanced batches, keep canonical protein-coding LOF
//!    consequences passing the variant filters, and checkpoint each batch.
//! 3. Union the batches, score each (gene, individual) and checkpoint.
//! 4. Write the scores as a block matrix, read it back transposed and export
//!    `out-<chrom>-<hex>.csv.gz`.

pub mod export;
pub mod score;

#[doc(inline)]
pub use export::ExportError;
#[doc(inline)]
pub use score::{GeneScore, GeneScores};

use crate::config::Context;
use crate::filter::VariantFilter;
use crate::manifest::{self, batch_count, split_list, Contig, ContigList};
use crate::matrix::BlockMatrix;
use crate::table::MatrixTable;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use loftee_path::{is_empty_listing, Catalog, PathDx};
use log::{debug, error, info, warn};
use rand::Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Aggregate every requested chromosome whose units are all complete.
///
/// Returns the export paths. A chromosome with incomplete units is logged and
/// skipped. A chromosome that fails is logged and skipped, unless the failure
/// is an [`ExportError`]. A destination that does not map to storage fails
/// the run before any chromosome.
pub async fn aggregate<C>(
    context: &Context<C>,
    contigs: &ContigList,
    allow_list: Option<&[String]>,
) -> Result<Vec<PathBuf>, Report>
where
    C: Catalog,
{
    aggregate_with(context, contigs, allow_list, chromosome_table).await
}

/// [`aggregate`], building each ready chromosome with `build`.
pub async fn aggregate_with<C, F>(
    context: &Context<C>,
    contigs: &ContigList,
    allow_list: Option<&[String]>,
    build: F,
) -> Result<Vec<PathBuf>, Report>
where
    C: Catalog,
    F: Fn(&Context<C>, &Contig, &[PathDx], Option<&[String]>) -> Result<PathBuf, Report>,
{
    let dest = context.dest_root().await?;
    context.store.locate(&dest)?;
    let listed = match dest.list(&context.catalog).await {
        Ok(listed) => listed,
        Err(e) if is_empty_listing(&e) => {
            warn!("No VCF file is annotated: {e}");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let entries = manifest::scan(&context.manifest_root(), &context.catalog).await?;

    let mut exports = Vec::new();
    for contig in &contigs.0 {
        info!("Chr {contig}");
        let outputs = entries
            .iter()
            .filter(|entry| entry.unit.contig == *contig)
            .map(|entry| dest.join(entry.unit.table_name()))
            .collect_vec();
        if outputs.is_empty() {
            warn!("No input files for chromosome {contig}, skipping.");
            continue;
        }

        let mut ready = true;
        for output in &outputs {
            let readiness = manifest::readiness(output, &listed, &context.catalog).await;
            info!("{output} {readiness}");
            ready &= readiness.is_ready();
        }
        if !ready {
            warn!("Some VCF files are not ready");
            continue;
        }

        match build(context, contig, &outputs, allow_list) {
            Ok(path) => exports.push(path),
            Err(e) if e.downcast_ref::<ExportError>().is_some() => return Err(e),
            Err(e) => error!("Chr {contig} failed: {e:?}"),
        }
    }
    Ok(exports)
}

/// Individuals present in every unit and in the allow-list, in the first unit's order.
///
/// ```rust
/// use loftee::aggregate::common_samples;
///
/// let columns = [
///     vec!["A".to_string(), "B".to_string(), "C".to_string()],
///     vec!["C".to_string(), "A".to_string(), "D".to_string()],
/// ];
/// assert_eq!(common_samples(&columns, None), ["A", "C"]);
/// assert_eq!(common_samples(&columns, Some(&["C".to_string()][..])), ["C"]);
/// ```
pub fn common_samples(columns: &[Vec<String>], allow_list: Option<&[String]>) -> Vec<String> {
    let Some((first, rest)) = columns.split_first() else {
        return Vec::new();
    };
    let rest = rest.iter().map(|samples| samples.iter().collect::<HashSet<_>>()).collect_vec();
    let allowed = allow_list.map(|samples| samples.iter().collect::<HashSet<_>>());
    first
        .iter()
        .filter(|sample| rest.iter().all(|samples| samples.contains(sample)))
        .filter(|sample| allowed.as_ref().map_or(true, |allowed| allowed.contains(sample)))
        .unique()
        .cloned()
        .collect()
}

/// Positions of `samples` within `columns`.
fn column_indices(columns: &[String], samples: &[String]) -> Result<Vec<usize>, Report> {
    let positions: HashMap<&String, usize> =
        columns.iter().enumerate().map(|(i, sample)| (sample, i)).collect();
    samples
        .iter()
        .map(|sample| {
            positions.get(sample).copied().ok_or_else(|| eyre!("Individual {sample} is missing."))
        })
        .collect()
}

/// Canonical protein-coding LOF rows of one batch that pass `filter`.
///
/// Gene labels seen before LOF filtering are added to `universe`.
pub fn lof_batch(
    table: MatrixTable,
    filter: &VariantFilter,
    universe: &mut BTreeSet<String>,
) -> Result<MatrixTable, Report> {
    let table = table
        .explode_consequences()
        .filter_rows(|row| row.consequence.as_ref().is_some_and(|c| c.is_canonical_protein_coding()))
        .annotate_gene_names();
    universe.extend(table.gene_names());

    debug!("....filtering");
    let table = table.filter_rows(|row| row.consequence.as_ref().is_some_and(|c| c.lof.is_some()));
    let table = filter.apply(table)?;
    filter.drop_split(table)
}

/// Build and export the table of one chromosome from its complete unit outputs.
pub fn chromosome_table<C>(
    context: &Context<C>,
    contig: &Contig,
    units: &[PathDx],
    allow_list: Option<&[String]>,
) -> Result<PathBuf, Report>
where
    C: Catalog,
{
    let (config, store) = (&context.config, &context.store);

    info!("Unifying colnames...");
    let columns = units.iter().map(|unit| store.read_columns(unit)).collect::<Result<Vec<_>, _>>()?;
    let samples = common_samples(&columns, allow_list);
    info!("{} individuals shared by {} units", samples.len(), units.len());

    let k = batch_count(units.len(), config.min_batch);
    let mut universe = BTreeSet::new();
    let mut batches = Vec::with_capacity(k);
    for (i, (start, end)) in split_list(units.len(), k).into_iter().enumerate() {
        info!("Part {i}: [{start}:{end}]");
        let tables = units[start..end]
            .iter()
            .map(|unit| {
                let table: MatrixTable = store.read(unit)?;
                let indices = column_indices(&table.samples, &samples)
                    .wrap_err_with(|| eyre!("Failed to subset columns: {unit}"))?;
                table.choose_cols(&indices)
            })
            .collect::<Result<Vec<_>, Report>>()?;
        let table = lof_batch(MatrixTable::union_rows(tables)?, &config.filter, &mut universe)?;
        let path = context.scratch(&format!("result-{contig}-0-p{i}"));
        store.write(&table, &path, true)?;
        batches.push(path);
    }

    info!("Unioning all");
    let tables = batches.iter().map(|path| store.read(path)).collect::<Result<Vec<MatrixTable>, _>>()?;
    let table = MatrixTable::union_rows(tables)?;
    let table = store.checkpoint(table, &context.scratch(&format!("result-{contig}-0")))?;

    let scores = GeneScores::from_table(&table);
    drop(table);
    let scores = store.checkpoint(scores, &context.scratch(&format!("result-{contig}-1b")))?;

    info!("Save as block matrix");
    let dir = store.locate(&context.scratch(&format!("result-{contig}.bm")))?;
    BlockMatrix::write_from_entries(
        &dir,
        scores.genes.len(),
        scores.samples.len(),
        config.block_size,
        true,
        |gene, sample| f64::from(scores.value(gene, sample)),
    )?;
    let matrix = BlockMatrix::read(&dir)?.transpose();

    info!("Export to csv");
    let scored: BTreeSet<&String> = scores.genes.iter().collect();
    let zero_genes = universe.iter().filter(|gene| !scored.contains(gene)).cloned().collect_vec();
    let path = export_path(&config.output_dir, contig);
    export::write_csv(
        &matrix,
        &scores.samples,
        &scores.genes,
        &zero_genes,
        &path,
        config.block_size * config.export_blocks,
    )?;
    info!("Exported: {path:?}");
    Ok(path)
}

/// `out-<chrom>-<hex>.csv.gz` with a random suffix.
fn export_path(output_dir: &Path, contig: &Contig) -> PathBuf {
    let suffix: u16 = rand::thread_rng().gen();
    output_dir.join(format!("out-{contig}-{suffix:04x}.csv.gz"))
}

/// Individual ids of an allow-list file, one per line.
pub fn read_allow_list(path: &Path) -> Result<Vec<String>, Report> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| eyre!("Failed to read allow-list: {path:?}"))?;
    let samples = content.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect_vec();
    info!("Allow-list: {} individuals", samples.len());
    Ok(samples)
}
