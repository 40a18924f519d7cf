//! VCF import and multi-allelic splitting.

use crate::table::{Entry, Genotype, MatrixTable, Row};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use flate2::read::MultiGzDecoder;
use itertools::Itertools;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ----------------------------------------------------------------------------
// Import
// ----------------------------------------------------------------------------

/// Import a plain or (b)gzipped VCF file, keeping the `GT`, `DP` and `AD` fields.
///
/// Missing array elements are allowed: an `AD` with a `.` element is missing as a whole.
pub fn import_vcf(path: &Path) -> Result<MatrixTable, Report> {
    let file = File::open(path).wrap_err_with(|| eyre!("Failed to open VCF: {path:?}"))?;
    let mut reader = BufReader::new(file);
    let magic = reader.fill_buf().wrap_err_with(|| eyre!("Failed to read VCF: {path:?}"))?;

    let reader: Box<dyn BufRead> = if magic.starts_with(&GZIP_MAGIC) {
        Box::new(BufReader::new(MultiGzDecoder::new(reader)))
    } else {
        Box::new(reader)
    };
    let table = read_vcf(reader).wrap_err_with(|| eyre!("Failed to import VCF: {path:?}"))?;
    info!("Imported {} variants x {} samples from {path:?}", table.n_rows(), table.n_cols());
    Ok(table)
}

/// Parse VCF text from any reader.
///
/// ```rust
/// use loftee::vcf::read_vcf;
///
/// let text = "##fileformat=VCFv4.2\n\
///             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\n\
///             1\t100\t.\tA\tT\t.\tPASS\t.\tGT:DP:AD\t0/1:12:6,6\t./.:.:.\n";
/// let table = read_vcf(text.as_bytes())?;
/// assert_eq!(table.samples, ["A", "B"]);
/// assert_eq!(table.rows[0].entries[0].ad, Some(vec![6, 6]));
/// assert_eq!(table.rows[0].entries[1].gt, None);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn read_vcf<R: Read>(reader: R) -> Result<MatrixTable, Report> {
    let reader = BufReader::new(reader);
    let mut table: Option<MatrixTable> = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with("##") || line.trim().is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let samples = header.split('\t').skip(9).map(String::from).collect();
            table = Some(MatrixTable::new(samples));
            continue;
        }
        let Some(table) = table.as_mut() else {
            return Err(eyre!("VCF record before the #CHROM header line."));
        };
        let row = parse_record(&line, table.n_cols())
            .wrap_err_with(|| eyre!("Failed to parse VCF line {}", i + 1))?;
        table.rows.push(row);
    }

    table.ok_or_else(|| eyre!("VCF has no #CHROM header line."))
}

fn parse_record(line: &str, n_samples: usize) -> Result<Row, Report> {
    let fields = line.split('\t').collect_vec();
    if fields.len() < 8 {
        return Err(eyre!("Expected at least 8 columns, found {}", fields.len()));
    }
    let position: u64 = fields[1].parse().wrap_err_with(|| eyre!("Invalid POS: {}", fields[1]))?;
    let mut alleles = vec![fields[3]];
    if fields[4] != "." {
        alleles.extend(fields[4].split(','));
    }

    let format = fields.get(8).map(|f| f.split(':').collect_vec()).unwrap_or_default();
    let samples = fields.iter().skip(9).collect_vec();
    if samples.len() != n_samples {
        return Err(eyre!("Expected {n_samples} samples, found {}", samples.len()));
    }

    let entries = samples
        .into_iter()
        .map(|sample| parse_entry(&format, sample))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Row::new(fields[0], position, &alleles, entries))
}

fn parse_entry(format: &[&str], sample: &str) -> Result<Entry, Report> {
    let values: HashMap<&str, &str> = format.iter().copied().zip(sample.split(':')).collect();
    let mut entry = Entry::default();

    if let Some(gt) = values.get("GT") {
        let phased = gt.contains('|');
        let alleles: Option<Vec<u16>> = gt.split(['/', '|']).map(|a| a.parse().ok()).collect();
        entry.gt = alleles.map(|alleles| Genotype { alleles, phased });
    }
    if let Some(dp) = values.get("DP").filter(|dp| **dp != ".") {
        entry.dp = Some(dp.parse().wrap_err_with(|| eyre!("Invalid DP: {dp}"))?);
    }
    if let Some(ad) = values.get("AD").filter(|ad| **ad != ".") {
        // any missing element makes the whole array missing
        entry.ad = ad.split(',').map(|depth| depth.parse().ok()).collect();
    }
    Ok(entry)
}

// ----------------------------------------------------------------------------
// Split Multi-allelic
// ----------------------------------------------------------------------------

/// Minimal representation of a biallelic variant.
///
/// Trailing bases shared by ref and alt are removed first, then leading
/// bases, shifting the position.
///
/// ```rust
/// use loftee::vcf::min_rep;
/// assert_eq!(min_rep(100, "CTT", "CT"), (100, "CT".to_string(), "C".to_string()));
/// assert_eq!(min_rep(100, "ATG", "ACG"), (101, "T".to_string(), "C".to_string()));
/// assert_eq!(min_rep(100, "A", "T"), (100, "A".to_string(), "T".to_string()));
/// ```
pub fn min_rep(position: u64, reference: &str, alternate: &str) -> (u64, String, String) {
    let (mut r, mut a) = (reference.as_bytes(), alternate.as_bytes());
    while r.len() > 1 && a.len() > 1 && r.last() == a.last() {
        r = &r[..r.len() - 1];
        a = &a[..a.len() - 1];
    }
    let mut shift = 0;
    while r.len() > 1 && a.len() > 1 && r.first() == a.first() {
        r = &r[1..];
        a = &a[1..];
        shift += 1;
    }
    (position + shift, String::from_utf8_lossy(r).to_string(), String::from_utf8_lossy(a).to_string())
}

/// Split multi-allelic rows into one biallelic row per alternate allele.
///
/// Genotypes are downcoded to the split allele, `AD` becomes
/// `[sum(AD) - AD[i], AD[i]]`, `DP` is kept, and `was_split` is set.
/// Biallelic rows are kept with `was_split = false`. Star alleles are dropped.
///
/// Minimal representation can move a split row past its neighbours. Without
/// `permit_shuffle` that is an error; with it rows are re-sorted by locus.
pub fn split_multi(table: MatrixTable, permit_shuffle: bool) -> Result<MatrixTable, Report> {
    let MatrixTable { samples, rows } = table;
    let mut output = Vec::with_capacity(rows.len());

    for row in rows {
        if row.alleles.len() <= 2 {
            output.push(Row { was_split: Some(false), ..row });
            continue;
        }
        for (i, alternate) in row.alleles.iter().enumerate().skip(1) {
            if alternate == "*" {
                continue;
            }
            let (position, reference, alternate) =
                min_rep(row.locus.position, &row.alleles[0], alternate);
            let entries = row.entries.iter().map(|entry| downcode(entry, i)).collect();
            let mut split = row.clone();
            split.locus.position = position;
            split.alleles = vec![reference, alternate];
            split.was_split = Some(true);
            split.entries = entries;
            output.push(split);
        }
    }

    // contigs keep their order of first appearance
    let contig_rank: HashMap<String, usize> = output
        .iter()
        .map(|row| row.locus.contig.clone())
        .unique()
        .enumerate()
        .map(|(rank, contig)| (contig, rank))
        .collect();
    let sort_key = |row: &Row| (contig_rank.get(&row.locus.contig).copied(), row.locus.position);

    if let Some((previous, next)) =
        output.iter().tuple_windows().find(|(a, b)| sort_key(a) > sort_key(b))
    {
        if !permit_shuffle {
            return Err(eyre!("Split rows are out of order: {previous} precedes {next}")
                .suggestion("Retry with permit_shuffle to re-sort rows after splitting."));
        }
        debug!("Re-sorting split rows, first out of order: {next}");
        output.sort_by_key(sort_key);
    }

    Ok(MatrixTable { samples, rows: output })
}

fn downcode(entry: &Entry, i: usize) -> Entry {
    let gt = entry.gt.as_ref().map(|gt| Genotype {
        alleles: gt.alleles.iter().map(|a| u16::from(usize::from(*a) == i)).collect(),
        phased: gt.phased,
    });
    let ad = entry.ad.as_ref().and_then(|ad| {
        let depth = *ad.get(i)?;
        Some(vec![ad.iter().sum::<u32>() - depth, depth])
    });
    Entry { gt, dp: entry.dp, ad }
}
