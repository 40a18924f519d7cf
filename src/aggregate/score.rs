//! Per (gene, individual) LOF scores.

use crate::table::{Genotype, MatrixTable, Row, Stored};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated calls of one individual over the LOF variants of one gene.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GeneScore {
    /// Max alt allele count over high-confidence LOF rows, missing without calls.
    pub hc_lof_hom_n: Option<u32>,
    pub hc_lof_n_het: u32,
    pub any_lof_hom_n: Option<u32>,
    pub any_lof_n_het: u32,
    pub n_non_ref: u32,
    pub hc_lof_hom: bool,
    pub any_lof_hom: bool,
    /// Dosage-style collapse: 2, 1 or 0.
    pub value: u8,
}

impl GeneScore {
    pub fn add(&mut self, gt: &Genotype, high_confidence: bool) {
        let n_alt = gt.n_alt_alleles();
        let hc_n_alt = if high_confidence { n_alt } else { 0 };
        self.hc_lof_hom_n = Some(self.hc_lof_hom_n.map_or(hc_n_alt, |n| n.max(hc_n_alt)));
        self.any_lof_hom_n = Some(self.any_lof_hom_n.map_or(n_alt, |n| n.max(n_alt)));
        self.hc_lof_n_het += u32::from(gt.is_het() && high_confidence);
        self.any_lof_n_het += u32::from(gt.is_het());
        self.n_non_ref += u32::from(gt.is_non_ref());
    }

    /// Derive the homozygous flags and `value`.
    ///
    /// ```rust
    /// use loftee::aggregate::GeneScore;
    /// use loftee::table::Genotype;
    ///
    /// let mut score = GeneScore::default();
    /// score.add(&Genotype::new(&[0, 1]), true);
    /// score.add(&Genotype::new(&[0, 1]), true);
    /// score.add(&Genotype::new(&[0, 1]), true);
    /// assert_eq!(score.finish().value, 2);
    ///
    /// let mut score = GeneScore::default();
    /// score.add(&Genotype::new(&[1, 1]), false);
    /// score.add(&Genotype::new(&[0, 1]), true);
    /// let score = score.finish();
    /// assert!(score.any_lof_hom && !score.hc_lof_hom);
    /// assert_eq!(score.value, 1);
    /// ```
    pub fn finish(mut self) -> Self {
        self.hc_lof_hom = self.hc_lof_hom_n == Some(2);
        self.any_lof_hom = self.any_lof_hom_n == Some(2);
        self.value = match self.hc_lof_hom {
            true => 2,
            false => self.hc_lof_n_het.min(2) as u8,
        };
        self
    }
}

/// Gene-by-individual score matrix, genes sorted.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GeneScores {
    pub samples: Vec<String>,
    pub genes: Vec<String>,
    /// One row per gene, one cell per sample.
    pub cells: Vec<Vec<GeneScore>>,
}

impl GeneScores {
    /// Group rows by gene label and aggregate each individual's calls.
    ///
    /// Rows without a gene label are skipped. Missing genotypes do not contribute.
    pub fn from_table(table: &MatrixTable) -> GeneScores {
        let mut groups: BTreeMap<&str, Vec<&Row>> = BTreeMap::new();
        for row in &table.rows {
            if let Some(gene) = row.gene_name.as_deref() {
                groups.entry(gene).or_default().push(row);
            }
        }

        let mut scores = GeneScores { samples: table.samples.clone(), ..Default::default() };
        for (gene, rows) in groups {
            let mut cells = vec![GeneScore::default(); table.n_cols()];
            for row in rows {
                let high_confidence =
                    row.consequence.as_ref().is_some_and(|c| c.is_high_confidence());
                for (cell, entry) in cells.iter_mut().zip(&row.entries) {
                    if let Some(gt) = &entry.gt {
                        cell.add(gt, high_confidence);
                    }
                }
            }
            scores.genes.push(gene.to_string());
            scores.cells.push(cells.into_iter().map(GeneScore::finish).collect());
        }
        scores
    }

    pub fn value(&self, gene: usize, sample: usize) -> u8 {
        self.cells[gene][sample].value
    }
}

impl Stored for GeneScores {
    const KIND: &'static str = "GeneScores";

    fn columns(&self) -> Vec<String> {
        self.samples.clone()
    }

    fn n_rows(&self) -> usize {
        self.genes.len()
    }
}
