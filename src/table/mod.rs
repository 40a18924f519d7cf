//! Matrix table model: columns are individuals, rows are variants, entries are genotype calls.
//!
//! A [`MatrixTable`] is the in-process form of one annotated unit, a batch of
//! units or a checkpoint. It is persisted as a directory by [`Store`], with
//! the completion marker written last.

pub mod store;

#[doc(inline)]
pub use store::{Metadata, Staged, Store, Stored};

use color_eyre::eyre::{eyre, Report, Result};
use color_eyre::Help;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

// ----------------------------------------------------------------------------
// Entries
// ----------------------------------------------------------------------------

/// A called genotype, as allele indices into the row's alleles.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Genotype {
    pub alleles: Vec<u16>,
    pub phased: bool,
}

impl Genotype {
    pub fn new(alleles: &[u16]) -> Self {
        Genotype { alleles: alleles.to_vec(), phased: false }
    }

    /// Number of non-reference alleles.
    pub fn n_alt_alleles(&self) -> u32 {
        self.alleles.iter().filter(|a| **a != 0).count() as u32
    }

    pub fn is_het(&self) -> bool {
        self.alleles.iter().unique().count() > 1
    }

    pub fn is_hom_ref(&self) -> bool {
        !self.alleles.is_empty() && self.alleles.iter().all(|a| *a == 0)
    }

    pub fn is_hom_var(&self) -> bool {
        !self.alleles.is_empty() && !self.is_het() && self.alleles[0] != 0
    }

    pub fn is_non_ref(&self) -> bool {
        self.n_alt_alleles() > 0
    }
}

impl Display for Genotype {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let separator = if self.phased { "|" } else { "/" };
        write!(f, "{}", self.alleles.iter().join(separator))
    }
}

/// One (variant, individual) cell.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Entry {
    /// Genotype call, missing when any allele is `.`
    pub gt: Option<Genotype>,
    /// Read depth.
    pub dp: Option<u32>,
    /// Allelic depths, one per allele. Missing when any element is missing.
    pub ad: Option<Vec<u32>>,
}

// ----------------------------------------------------------------------------
// Row Annotations
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Locus {
    pub contig: String,
    pub position: u64,
}

impl Display for Locus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.contig, self.position)
    }
}

/// One transcript consequence predicted by VEP and LOFTEE.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TranscriptConsequence {
    #[serde(default)]
    pub gene_symbol: Option<String>,
    #[serde(default)]
    pub gene_id: Option<String>,
    /// `1` for the canonical transcript.
    #[serde(default)]
    pub canonical: Option<u8>,
    #[serde(default)]
    pub biotype: Option<String>,
    /// LOFTEE confidence, `HC` or `LC`.
    #[serde(default)]
    pub lof: Option<String>,
}

impl TranscriptConsequence {
    pub const CANONICAL: u8 = 1;
    pub const PROTEIN_CODING: &'static str = "protein_coding";
    pub const HIGH_CONFIDENCE: &'static str = "HC";

    pub fn is_canonical_protein_coding(&self) -> bool {
        self.canonical == Some(Self::CANONICAL) && self.biotype.as_deref() == Some(Self::PROTEIN_CODING)
    }

    pub fn is_high_confidence(&self) -> bool {
        self.lof.as_deref() == Some(Self::HIGH_CONFIDENCE)
    }

    /// Gene symbol, falling back to the gene id.
    pub fn gene_name(&self) -> Option<&str> {
        self.gene_symbol.as_deref().or(self.gene_id.as_deref())
    }
}

/// The VEP annotation of one variant.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Vep {
    pub transcript_consequences: Option<Vec<TranscriptConsequence>>,
}

/// Per-variant call statistics.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct VariantQc {
    pub call_rate: f64,
    pub n_called: u32,
    pub n_not_called: u32,
    pub n_het: u32,
    pub n_hom_ref: u32,
    pub n_hom_var: u32,
    /// Exact Hardy-Weinberg mid-p-value, missing without calls.
    pub p_value_hwe: Option<f64>,
}

// ----------------------------------------------------------------------------
// Row
// ----------------------------------------------------------------------------

/// One variant with its entries, one per column.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Row {
    pub locus: Locus,
    /// Reference allele first.
    pub alleles: Vec<String>,
    /// Set by multi-allelic splitting.
    #[serde(default)]
    pub was_split: Option<bool>,
    #[serde(default)]
    pub vep: Option<Vep>,
    /// The single consequence left after exploding `vep.transcript_consequences`.
    #[serde(default)]
    pub consequence: Option<TranscriptConsequence>,
    #[serde(default)]
    pub gene_name: Option<String>,
    #[serde(default)]
    pub variant_qc: Option<VariantQc>,
    pub entries: Vec<Entry>,
}

impl Row {
    pub fn new(contig: &str, position: u64, alleles: &[&str], entries: Vec<Entry>) -> Self {
        Row {
            locus: Locus { contig: contig.to_string(), position },
            alleles: alleles.iter().map(|a| a.to_string()).collect(),
            was_split: None,
            vep: None,
            consequence: None,
            gene_name: None,
            variant_qc: None,
            entries,
        }
    }

    /// Reference and first alternate allele, the join key of biallelic rows.
    pub fn key(&self) -> (String, u64, String, String) {
        let reference = self.alleles.first().cloned().unwrap_or_default();
        let alternate = self.alleles.get(1).cloned().unwrap_or_default();
        (self.locus.contig.clone(), self.locus.position, reference, alternate)
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.locus, self.alleles.join("/"))
    }
}

// ----------------------------------------------------------------------------
// Matrix Table
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MatrixTable {
    /// Column keys, individual ids.
    pub samples: Vec<String>,
    pub rows: Vec<Row>,
}

impl MatrixTable {
    pub fn new(samples: Vec<String>) -> Self {
        MatrixTable { samples, rows: Vec::new() }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.samples.len()
    }

    /// Reorder and subset columns to `indices`.
    ///
    /// ```rust
    /// use loftee::table::{Entry, MatrixTable, Row};
    ///
    /// let mut table = MatrixTable::new(vec!["A".into(), "B".into(), "C".into()]);
    /// let entries = [Some(1), Some(2), Some(3)]
    ///     .into_iter()
    ///     .map(|dp| Entry { dp, ..Default::default() })
    ///     .collect();
    /// table.rows.push(Row::new("1", 100, &["A", "T"], entries));
    ///
    /// let table = table.choose_cols(&[2, 0])?;
    /// assert_eq!(table.samples, ["C", "A"]);
    /// assert_eq!(table.rows[0].entries[0].dp, Some(3));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn choose_cols(self, indices: &[usize]) -> Result<MatrixTable, Report> {
        if let Some(index) = indices.iter().find(|i| **i >= self.n_cols()) {
            return Err(eyre!("Column index {index} is out of range for {} columns.", self.n_cols()));
        }
        let samples = indices.iter().map(|i| self.samples[*i].clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                let entries = indices.iter().map(|i| row.entries[*i].clone()).collect();
                Row { entries, ..row }
            })
            .collect();
        Ok(MatrixTable { samples, rows })
    }

    /// Concatenate rows of tables that share identical columns.
    pub fn union_rows(tables: Vec<MatrixTable>) -> Result<MatrixTable, Report> {
        let mut tables = tables.into_iter();
        let Some(mut output) = tables.next() else {
            return Err(eyre!("Cannot union an empty list of tables."));
        };
        for table in tables {
            if table.samples != output.samples {
                return Err(eyre!("Cannot union tables with different columns.")
                    .suggestion("Subset every table to the same columns, in the same order, first."));
            }
            output.rows.extend(table.rows);
        }
        Ok(output)
    }

    /// One row per transcript consequence. Rows without consequences are dropped.
    pub fn explode_consequences(self) -> MatrixTable {
        let rows = self
            .rows
            .into_iter()
            .flat_map(|row| {
                let consequences = row
                    .vep
                    .as_ref()
                    .and_then(|vep| vep.transcript_consequences.clone())
                    .unwrap_or_default();
                consequences
                    .into_iter()
                    .map(|consequence| Row { consequence: Some(consequence), ..row.clone() })
                    .collect_vec()
            })
            .collect();
        MatrixTable { samples: self.samples, rows }
    }

    pub fn filter_rows<F>(self, predicate: F) -> MatrixTable
    where
        F: FnMut(&Row) -> bool,
    {
        let mut predicate = predicate;
        let rows = self.rows.into_iter().filter(|row| predicate(row)).collect();
        MatrixTable { samples: self.samples, rows }
    }

    /// Label each row with the gene of its exploded consequence.
    pub fn annotate_gene_names(self) -> MatrixTable {
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                let gene_name =
                    row.consequence.as_ref().and_then(|c| c.gene_name()).map(String::from);
                Row { gene_name, ..row }
            })
            .collect();
        MatrixTable { samples: self.samples, rows }
    }

    /// Every gene label present on a row.
    pub fn gene_names(&self) -> BTreeSet<String> {
        self.rows.iter().filter_map(|row| row.gene_name.clone()).collect()
    }
}

impl Stored for MatrixTable {
    const KIND: &'static str = "MatrixTable";

    fn columns(&self) -> Vec<String> {
        self.samples.clone()
    }

    fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests;
