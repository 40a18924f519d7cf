//! VEP (with the LOFTEE plugin) as an external command.
//!
//! The command line comes from a JSON config in the style of Hail's
//! `vep-config.json`:
//!
//! ```json
//! {
//!   "command": ["/opt/vep/vep", "--format", "vcf", "__OUTPUT_FORMAT_FLAG__", "--everything",
//!               "--plugin", "LoF,loftee_path:/opt/vep/loftee", "-o", "STDOUT"],
//!   "env": {"PERL5LIB": "/opt/vep/loftee"}
//! }
//! ```
//!
//! Sites are written as a VCF to a temporary file fed on stdin. Each stdout
//! line is one JSON record whose `input` field echoes the site line.

use crate::annotate::Annotator;
use crate::table::{MatrixTable, Row, Store, TranscriptConsequence, Vep};
use crate::vcf::{import_vcf, split_multi};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use loftee_path::PathDx;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};

/// Placeholder replaced by the JSON output flag.
pub const OUTPUT_FORMAT_FLAG: &str = "__OUTPUT_FORMAT_FLAG__";

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct VepConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl VepConfig {
    pub fn read(path: &Path) -> Result<VepConfig, Report> {
        let config = std::fs::read_to_string(path)
            .wrap_err_with(|| eyre!("Failed to read VEP config: {path:?}"))?;
        let config: VepConfig = serde_json::from_str(&config)
            .wrap_err_with(|| eyre!("Failed to parse VEP config: {path:?}"))?;
        if config.command.is_empty() {
            return Err(eyre!("VEP config has an empty command: {path:?}"));
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct VepRecord {
    input: String,
    #[serde(default)]
    transcript_consequences: Option<Vec<TranscriptConsequence>>,
}

/// REF and ALT columns of a row's site line.
fn site_alleles(row: &Row) -> (&str, String) {
    let reference = row.alleles.first().map(String::as_str).unwrap_or(".");
    let alternates = match row.alleles.len() {
        0 | 1 => ".".to_string(),
        _ => row.alleles.iter().skip(1).join(","),
    };
    (reference, alternates)
}

fn site_key(contig: &str, position: &str, reference: &str, alternates: &str) -> String {
    format!("{contig}:{position}:{reference}:{alternates}")
}

/// Write the sites of `table` as a minimal VCF.
pub fn write_sites<W: Write>(table: &MatrixTable, writer: &mut W) -> Result<(), Report> {
    writeln!(writer, "##fileformat=VCFv4.2")?;
    writeln!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
    for row in &table.rows {
        let (reference, alternates) = site_alleles(row);
        writeln!(writer, "{}\t{}\t.\t{reference}\t{alternates}\t.\t.\t.", row.locus.contig, row.locus.position)?;
    }
    Ok(())
}

/// Parse VEP JSON lines into annotations keyed by site.
fn parse_output(stdout: &str) -> Result<HashMap<String, Vep>, Report> {
    let mut annotations = HashMap::new();
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let record: VepRecord = serde_json::from_str(line)
            .wrap_err_with(|| eyre!("Failed to parse VEP output: {line}"))?;
        let fields = record.input.split('\t').collect_vec();
        if fields.len() < 5 {
            return Err(eyre!("VEP output has a malformed input line: {:?}", record.input));
        }
        let key = site_key(fields[0], fields[1], fields[3], fields[4]);
        annotations.insert(key, Vep { transcript_consequences: record.transcript_consequences });
    }
    Ok(annotations)
}

/// Run VEP over the sites of `table` and attach the annotations as `vep`.
///
/// Sites VEP does not report are left without annotation.
pub fn vep(table: MatrixTable, config: &VepConfig) -> Result<MatrixTable, Report> {
    let Some((program, args)) = config.command.split_first() else {
        return Err(eyre!("VEP command is empty."));
    };
    let args = args
        .iter()
        .map(|arg| if arg == OUTPUT_FORMAT_FLAG { "--json" } else { arg.as_str() })
        .collect_vec();

    let sites = tempfile::NamedTempFile::new().wrap_err("Failed to create VEP input file.")?;
    {
        let mut writer = BufWriter::new(sites.as_file());
        write_sites(&table, &mut writer)?;
        writer.flush()?;
    }

    info!("Running VEP on {} sites", table.n_rows());
    debug!("VEP command: {program} {}", args.join(" "));
    let stdin = File::open(sites.path())?;
    let output = Command::new(program)
        .args(&args)
        .envs(&config.env)
        .stdin(Stdio::from(stdin))
        .output()
        .wrap_err_with(|| eyre!("Failed to run VEP: {program}"))?;

    if !output.status.success() {
        return Err(eyre!("VEP failed with {}", output.status)
            .suggestion(String::from_utf8_lossy(&output.stderr).to_string()));
    }

    let annotations = parse_output(&String::from_utf8_lossy(&output.stdout))?;
    debug!("VEP annotated {} of {} sites", annotations.len(), table.n_rows());

    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            let (reference, alternates) = site_alleles(&row);
            let key = site_key(&row.locus.contig, &row.locus.position.to_string(), reference, &alternates);
            Row { vep: annotations.get(&key).cloned(), ..row }
        })
        .collect();
    Ok(MatrixTable { samples: table.samples, rows })
}

// ----------------------------------------------------------------------------
// VEP Annotator
// ----------------------------------------------------------------------------

/// Import, split multi-allelic sites, run VEP and write the annotated table.
#[derive(Clone, Debug)]
pub struct VepAnnotator {
    pub config: VepConfig,
    pub store: Store,
}

impl VepAnnotator {
    pub fn new(config: VepConfig, store: Store) -> Self {
        VepAnnotator { config, store }
    }
}

impl Annotator for VepAnnotator {
    fn annotate(&self, input: &PathDx, output: &PathDx, permit_shuffle: bool) -> Result<(), Report> {
        let path = self.store.locate(input)?;
        let table = import_vcf(&path)?;
        let table = split_multi(table, permit_shuffle)?;
        let table = vep(table, &self.config)?;
        self.store.write(&table, output, true)
    }
}
