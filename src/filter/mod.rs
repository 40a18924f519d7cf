//! Variant quality filters and per-variant call statistics.
//!
//! Each filter checks its prerequisites up front: a filter that reads a row
//! field produced by an earlier step fails with
//! [`FilterError::PrerequisiteMissing`] when any row lacks that field.

use crate::table::{MatrixTable, Row, VariantQc};
use color_eyre::eyre::{Report, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FilterError {
    /// A row field required by a filter has not been computed.
    #[error("Matrix table has no '{field}' row field, run {step} first.")]
    PrerequisiteMissing { field: &'static str, step: &'static str },
}

fn require(
    table: &MatrixTable,
    field: &'static str,
    step: &'static str,
    present: fn(&Row) -> bool,
) -> Result<(), Report> {
    match table.rows.iter().all(present) {
        true => Ok(()),
        false => Err(FilterError::PrerequisiteMissing { field, step }.into()),
    }
}

fn require_variant_qc(table: &MatrixTable) -> Result<(), Report> {
    require(table, "variant_qc", "variant_qc", |row| row.variant_qc.is_some())
}

fn require_split(table: &MatrixTable) -> Result<(), Report> {
    require(table, "was_split", "split_multi", |row| row.was_split.is_some())
}

// ----------------------------------------------------------------------------
// Variant Filter
// ----------------------------------------------------------------------------

/// Thresholds of the variant quality filters.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct VariantFilter {
    /// Minimum mean read depth over called entries.
    pub min_depth: f64,
    /// Minimum fraction of called genotypes.
    pub min_call_rate: f64,
    /// Minimum Hardy-Weinberg p-value.
    pub min_p_value_hwe: f64,
    /// Minimum minor-allele read fraction of heterozygous calls.
    pub min_allele_ratio: f64,
}

impl Default for VariantFilter {
    fn default() -> Self {
        VariantFilter {
            min_depth: 7.0,
            min_call_rate: 0.1,
            min_p_value_hwe: 1e-15,
            min_allele_ratio: 0.15,
        }
    }
}

impl VariantFilter {
    pub fn new() -> Self {
        VariantFilter::default()
    }

    /// Keep rows whose mean `DP` is at least `min_depth`. Rows without any `DP` are dropped.
    pub fn mean_read_depth(&self, table: MatrixTable) -> MatrixTable {
        table.filter_rows(|row| {
            let depths: Vec<f64> = row.entries.iter().filter_map(|e| e.dp).map(f64::from).collect();
            !depths.is_empty() && depths.iter().sum::<f64>() / depths.len() as f64 >= self.min_depth
        })
    }

    /// Keep rows whose call rate is at least `min_call_rate`.
    pub fn variant_missingness(&self, table: MatrixTable) -> Result<MatrixTable, Report> {
        require_variant_qc(&table)?;
        Ok(table.filter_rows(|row| {
            row.variant_qc.as_ref().is_some_and(|qc| qc.call_rate >= self.min_call_rate)
        }))
    }

    /// Keep rows whose Hardy-Weinberg p-value is at least `min_p_value_hwe`.
    pub fn hardy_weinberg(&self, table: MatrixTable) -> Result<MatrixTable, Report> {
        require_variant_qc(&table)?;
        require_split(&table)?;
        Ok(table.filter_rows(|row| {
            row.variant_qc
                .as_ref()
                .and_then(|qc| qc.p_value_hwe)
                .is_some_and(|p| p >= self.min_p_value_hwe)
        }))
    }

    /// Keep rows where every heterozygous call has `min(AD) / sum(AD) >= min_allele_ratio`,
    /// or where there are no heterozygous calls.
    ///
    /// Heterozygous calls without `AD` are ignored. A zero `AD` sum fails.
    pub fn allele_balance(&self, table: MatrixTable) -> Result<MatrixTable, Report> {
        require_split(&table)?;
        Ok(table.filter_rows(|row| {
            row.entries
                .iter()
                .filter(|entry| entry.gt.as_ref().is_some_and(|gt| gt.is_het()))
                .filter_map(|entry| entry.ad.as_ref())
                .all(|ad| {
                    let sum: u32 = ad.iter().sum();
                    let min = ad.iter().min().copied().unwrap_or(0);
                    sum > 0 && f64::from(min) / f64::from(sum) >= self.min_allele_ratio
                })
        }))
    }

    /// Drop rows produced by multi-allelic splitting.
    pub fn drop_split(&self, table: MatrixTable) -> Result<MatrixTable, Report> {
        require_split(&table)?;
        Ok(table.filter_rows(|row| row.was_split == Some(false)))
    }

    /// Read depth, variant QC, call rate, Hardy-Weinberg and allele balance, in that order.
    pub fn apply(&self, table: MatrixTable) -> Result<MatrixTable, Report> {
        let n = table.n_rows();
        let table = self.mean_read_depth(table);
        debug!("mean_read_depth: {n} -> {}", table.n_rows());
        let table = variant_qc(table);
        let table = self.variant_missingness(table)?;
        debug!("variant_missingness: -> {}", table.n_rows());
        let table = self.hardy_weinberg(table)?;
        debug!("hardy_weinberg: -> {}", table.n_rows());
        let table = self.allele_balance(table)?;
        debug!("allele_balance: -> {}", table.n_rows());
        Ok(table)
    }
}

// ----------------------------------------------------------------------------
// Variant QC
// ----------------------------------------------------------------------------

/// Annotate every row with its [`VariantQc`].
pub fn variant_qc(table: MatrixTable) -> MatrixTable {
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            let qc = row_qc(&row);
            Row { variant_qc: Some(qc), ..row }
        })
        .collect();
    MatrixTable { samples: table.samples, rows }
}

fn row_qc(row: &Row) -> VariantQc {
    let mut qc = VariantQc::default();
    for gt in row.entries.iter().map(|entry| entry.gt.as_ref()) {
        match gt {
            None => qc.n_not_called += 1,
            Some(gt) => {
                qc.n_called += 1;
                if gt.is_het() {
                    qc.n_het += 1;
                } else if gt.is_hom_ref() {
                    qc.n_hom_ref += 1;
                } else if gt.is_hom_var() {
                    qc.n_hom_var += 1;
                }
            }
        }
    }
    let n = qc.n_called + qc.n_not_called;
    qc.call_rate = if n == 0 { 0.0 } else { f64::from(qc.n_called) / f64::from(n) };
    qc.p_value_hwe = hwe_p_value(qc.n_hom_ref, qc.n_het, qc.n_hom_var);
    qc
}

/// Exact Hardy-Weinberg test mid-p-value (Wigginton et al. 2005).
///
/// Heterozygote counts follow the Levene-Haldane distribution given the
/// allele counts. The p-value sums the probabilities of every count less
/// likely than the observed one, plus half the probability of counts as
/// likely, capped at one.
///
/// ```rust
/// use loftee::filter::hwe_p_value;
///
/// assert_eq!(hwe_p_value(0, 0, 0), None);
/// let p = hwe_p_value(2, 0, 1).unwrap();
/// assert!((p - 0.1).abs() < 1e-12);
/// let p = hwe_p_value(50, 0, 50).unwrap();
/// assert!(p < 1e-15);
/// ```
pub fn hwe_p_value(n_hom_ref: u32, n_het: u32, n_hom_var: u32) -> Option<f64> {
    let n = u64::from(n_hom_ref) + u64::from(n_het) + u64::from(n_hom_var);
    if n == 0 {
        return None;
    }
    let n_ref = 2 * u64::from(n_hom_ref) + u64::from(n_het);
    let n_alt = 2 * u64::from(n_hom_var) + u64::from(n_het);
    let rare = n_ref.min(n_alt) as usize;
    let observed = n_het as usize;

    let mut probs = vec![0.0_f64; rare + 1];
    probs[observed] = 1.0;

    // homozygote counts at the observed heterozygote count
    let hom_rare = ((rare - observed) / 2) as f64;
    let hom_common = n as f64 - observed as f64 - hom_rare;

    let (mut h, mut hr, mut hc) = (observed, hom_rare, hom_common);
    while h >= 2 {
        let het = h as f64;
        probs[h - 2] = probs[h] * het * (het - 1.0) / (4.0 * (hr + 1.0) * (hc + 1.0));
        h -= 2;
        hr += 1.0;
        hc += 1.0;
    }

    let (mut h, mut hr, mut hc) = (observed, hom_rare, hom_common);
    while h + 2 <= rare {
        let het = h as f64;
        probs[h + 2] = probs[h] * 4.0 * hr * hc / ((het + 2.0) * (het + 1.0));
        h += 2;
        hr -= 1.0;
        hc -= 1.0;
    }

    let total: f64 = probs.iter().sum();
    let p_observed = probs[observed] / total;
    let tolerance = p_observed * 1e-9;
    let p = probs
        .iter()
        .map(|p| p / total)
        .filter(|p| *p > 0.0)
        .map(|p| match p {
            p if p < p_observed - tolerance => p,
            p if p <= p_observed + tolerance => p / 2.0,
            _ => 0.0,
        })
        .sum::<f64>();

    Some(p.min(1.0))
}
