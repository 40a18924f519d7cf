//! `loftee` annotates exome pVCF blocks with VEP and the LOFTEE plugin, and
//! aggregates high-confidence loss-of-function (LOF) calls into a per-gene,
//! per-individual dosage table.
//!
//! ## Pipeline
//!
//! 1. **Annotate**: every manifest unit (one input VCF per contig and block)
//!    without an output table is staged locally, split into biallelic rows,
//!    run through VEP and stored as `chr-<contig>-b<block>.mt`. Storage
//!    paths are [`PathDx`](loftee_path::PathDx) values, either local or in a
//!    platform database.
//!
//! 1. **Aggregate**: once every unit of a chromosome is complete, units are
//!    subset to their shared individuals, filtered to canonical
//!    protein-coding LOF variants passing quality filters, scored per gene and
//!    exported as `out-<chrom>-<hex>.csv.gz`.
//!
//! 1. **Install**: run the VEP install script.

pub mod aggregate;
pub mod annotate;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod filter;
pub mod install;
pub mod manifest;
pub mod matrix;
pub mod table;
pub mod vcf;

#[doc(inline)]
pub use crate::config::{Config, Context};
#[doc(inline)]
pub use crate::manifest::{Contig, ContigList, Unit};
#[doc(inline)]
pub use crate::table::MatrixTable;
