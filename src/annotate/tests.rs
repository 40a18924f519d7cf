use crate::annotate::*;
use crate::config::{Config, Context};
use crate::manifest::{Contig, ContigList};
use crate::table::{MatrixTable, Store};
use color_eyre::eyre::{eyre, Report, Result};
use indoc::indoc;
use loftee_path::{MemoryCatalog, PathDx};
use std::cell::RefCell;
use std::path::Path;

const SITES: &str = indoc! {"
    ##fileformat=VCFv4.2
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB
    1\t100\t.\tA\tT\t.\tPASS\t.\tGT:DP:AD\t0/1:10:5,5\t0/0:10:10,0
    1\t200\t.\tG\tC\t.\tPASS\t.\tGT:DP:AD\t0/0:10:10,0\t1/1:10:0,10
"};

/// Echoes each site as a high-confidence LOF in gene `G<pos>`, except position 200.
const FAKE_VEP: &str = r#"!/^#/ && $2 != 200 { printf "{\"input\": \"%s\\t%s\\t%s\\t%s\\t%s\", \"transcript_consequences\": [{\"gene_symbol\": \"G%s\", \"canonical\": 1, \"biotype\": \"protein_coding\", \"lof\": \"HC\"}]}\n", $1, $2, $3, $4, $5, $2 }"#;

fn fake_vep() -> VepConfig {
    VepConfig { command: vec!["awk".into(), "-F\t".into(), FAKE_VEP.into()], ..Default::default() }
}

/// Records every call, failing the attempts listed in `failures`.
#[derive(Default)]
struct Recorder {
    /// (input file name, permit_shuffle) pairs that fail.
    failures: Vec<(String, bool)>,
    calls: RefCell<Vec<(PathDx, PathDx, bool)>>,
    staged_existed: RefCell<Vec<bool>>,
}

impl Recorder {
    fn failing(failures: &[(&str, bool)]) -> Self {
        Recorder {
            failures: failures.iter().map(|(name, shuffle)| (name.to_string(), *shuffle)).collect(),
            ..Default::default()
        }
    }
}

impl Annotator for Recorder {
    fn annotate(&self, input: &PathDx, output: &PathDx, permit_shuffle: bool) -> Result<(), Report> {
        self.calls.borrow_mut().push((input.clone(), output.clone(), permit_shuffle));
        let path = Store::default().locate(input)?;
        self.staged_existed.borrow_mut().push(path.exists());

        let name = input.file_name().unwrap_or_default().to_string();
        match self.failures.contains(&(name, permit_shuffle)) {
            true => Err(eyre!("Split rows are out of order")),
            false => Ok(()),
        }
    }
}

const INPUTS: [&str; 4] = [
    "ukb23157_c2_b0_v1.vcf.gz",
    "ukb23157_c1_b10_v1.vcf.gz",
    "ukb23157_c1_b2_v1.vcf.gz",
    "ukb23157_c1_b0_v1.vcf.gz.tbi",
];

/// A manifest of local inputs, an empty destination and a staging directory.
fn context(root: &Path) -> Result<Context<MemoryCatalog>, Report> {
    let manifest = root.join("manifest");
    std::fs::create_dir_all(&manifest)?;
    for name in INPUTS {
        std::fs::write(manifest.join(name), SITES)?;
    }
    std::fs::create_dir_all(root.join("dest"))?;

    let mut config = Config::default();
    config.manifest_dir = manifest;
    config.database = None;
    config.dest_dir = root.join("dest");
    config.staging_dir = root.join("staging");
    Ok(Context::new(config, MemoryCatalog::new()))
}

fn call_names(recorder: &Recorder) -> Vec<(String, bool)> {
    recorder
        .calls
        .borrow()
        .iter()
        .map(|(input, _, shuffle)| (input.file_name().unwrap_or_default().to_string(), *shuffle))
        .collect()
}

#[tokio::test]
async fn annotates_in_natural_order() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let context = context(dir.path())?;
    let recorder = Recorder::default();

    let summary = annotate_all(&context, &recorder, &ContigList::default()).await?;
    assert_eq!(
        call_names(&recorder),
        [
            ("ukb23157_c1_b2_v1.vcf.gz".to_string(), false),
            ("ukb23157_c1_b10_v1.vcf.gz".to_string(), false),
            ("ukb23157_c2_b0_v1.vcf.gz".to_string(), false),
        ]
    );
    let outputs: Vec<_> = recorder.calls.borrow().iter().map(|(_, o, _)| o.clone()).collect();
    assert_eq!(outputs[0], PathDx::local([dir.path().join("dest").join("chr-1-b2.mt")]));
    assert_eq!(summary.units_with(Outcome::Annotated).len(), 3);

    // staged while annotating, removed afterwards
    assert!(recorder.staged_existed.borrow().iter().all(|existed| *existed));
    assert_eq!(std::fs::read_dir(dir.path().join("staging"))?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn listed_outputs_are_skipped() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let context = context(dir.path())?;
    for name in ["chr-1-b2.mt", "chr-1-b10.mt", "chr-2-b0.mt"] {
        std::fs::create_dir_all(dir.path().join("dest").join(name))?;
    }
    let recorder = Recorder::default();

    let summary = annotate_all(&context, &recorder, &ContigList::default()).await?;
    assert!(recorder.calls.borrow().is_empty());
    assert_eq!(summary.units_with(Outcome::Skipped).len(), 3);
    assert_eq!(summary.n_attempts(), 0);
    assert!(!dir.path().join("staging").exists());
    Ok(())
}

#[tokio::test]
async fn failed_unit_is_retried_once_with_shuffle() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let context = context(dir.path())?;
    let recorder = Recorder::failing(&[
        ("ukb23157_c1_b2_v1.vcf.gz", false),
        ("ukb23157_c1_b10_v1.vcf.gz", false),
        ("ukb23157_c1_b10_v1.vcf.gz", true),
    ]);

    let summary = annotate_all(&context, &recorder, &ContigList::default()).await?;
    assert_eq!(
        call_names(&recorder),
        [
            ("ukb23157_c1_b2_v1.vcf.gz".to_string(), false),
            ("ukb23157_c1_b2_v1.vcf.gz".to_string(), true),
            ("ukb23157_c1_b10_v1.vcf.gz".to_string(), false),
            ("ukb23157_c1_b10_v1.vcf.gz".to_string(), true),
            ("ukb23157_c2_b0_v1.vcf.gz".to_string(), false),
        ]
    );
    assert_eq!(summary.units_with(Outcome::Retried)[0].block, "2");
    assert_eq!(summary.units_with(Outcome::Failed)[0].block, "10");
    assert_eq!(summary.units_with(Outcome::Annotated)[0].contig, Contig::Chr2);
    assert_eq!(summary.n_attempts(), 5);
    assert_eq!(std::fs::read_dir(dir.path().join("staging"))?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn contig_filter_limits_units() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let context = context(dir.path())?;
    let recorder = Recorder::default();

    let summary = annotate_all(&context, &recorder, &"2".parse()?).await?;
    assert_eq!(call_names(&recorder), [("ukb23157_c2_b0_v1.vcf.gz".to_string(), false)]);
    assert_eq!(summary.units.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unstageable_input_is_not_annotated() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let context = context(dir.path())?;
    // a directory matching the naming scheme cannot be copied
    std::fs::create_dir(dir.path().join("manifest").join("ukb23157_c3_b0_v1.vcf.gz"))?;
    let recorder = Recorder::default();

    let summary = annotate_all(&context, &recorder, &ContigList::default()).await?;
    assert_eq!(recorder.calls.borrow().len(), 3);
    let failed = summary.units_with(Outcome::StageFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].contig, Contig::Chr3);
    assert!(summary.units_with(Outcome::Failed).is_empty());
    assert_eq!(summary.n_attempts(), 3);
    assert_eq!(std::fs::read_dir(dir.path().join("staging"))?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn database_without_storage_root_fails_before_annotating() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let local = context(dir.path())?;
    let mut config = local.config.clone();
    config.database_id = Some("database-1".to_string());
    let mut catalog = MemoryCatalog::new();
    catalog.add_database("database-1", "wes_mt");
    let context = Context::new(config, catalog);
    let recorder = Recorder::default();

    let result = annotate_all(&context, &recorder, &ContigList::default()).await;
    assert!(result.unwrap_err().to_string().contains("No storage root"));
    assert!(recorder.calls.borrow().is_empty());
    assert!(!dir.path().join("staging").exists());
    Ok(())
}

#[tokio::test]
async fn missing_manifest_fails() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let mut context = context(dir.path())?;
    context.config.manifest_dir = dir.path().join("missing");
    assert!(annotate_all(&context, &Recorder::default(), &ContigList::default()).await.is_err());
    Ok(())
}

#[test]
fn sites_are_written_as_vcf() -> Result<(), Report> {
    let table = crate::vcf::read_vcf(SITES.as_bytes())?;
    let mut output = Vec::new();
    vep::write_sites(&table, &mut output)?;
    let output = String::from_utf8(output)?;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[2], "1\t100\t.\tA\tT\t.\t.\t.");
    Ok(())
}

#[test]
fn vep_attaches_reported_sites() -> Result<(), Report> {
    let table = crate::vcf::read_vcf(SITES.as_bytes())?;
    let table = vep::vep(table, &fake_vep())?;

    let consequences = table.rows[0].vep.as_ref().and_then(|v| v.transcript_consequences.clone());
    let consequences = consequences.unwrap_or_default();
    assert_eq!(consequences.len(), 1);
    assert_eq!(consequences[0].gene_symbol.as_deref(), Some("G100"));
    assert!(consequences[0].is_high_confidence());
    assert_eq!(table.rows[1].vep, None);
    Ok(())
}

#[test]
fn vep_failure_reports_status() -> Result<(), Report> {
    let table = crate::vcf::read_vcf(SITES.as_bytes())?;
    let config = VepConfig {
        command: vec!["sh".into(), "-c".into(), "echo broken >&2; exit 3".into()],
        ..Default::default()
    };
    let error = vep::vep(table, &config).unwrap_err();
    assert!(error.to_string().contains("VEP failed"));
    Ok(())
}

#[test]
fn vep_config_requires_command() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vep-config.json");
    std::fs::write(&path, r#"{"command": []}"#)?;
    assert!(VepConfig::read(&path).is_err());

    std::fs::write(&path, r#"{"command": ["vep", "__OUTPUT_FORMAT_FLAG__"], "env": {"PERL5LIB": "/opt"}}"#)?;
    let config = VepConfig::read(&path)?;
    assert_eq!(config.env.get("PERL5LIB").map(String::as_str), Some("/opt"));
    Ok(())
}

#[test]
fn vep_annotator_writes_table() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ukb23157_c1_b0_v1.vcf.gz");
    std::fs::write(&input, SITES)?;
    let output = PathDx::local([dir.path().join("chr-1-b0.mt")]);

    let annotator = VepAnnotator::new(fake_vep(), Store::default());
    annotator.annotate(&PathDx::local([&input]), &output, false)?;

    let table: MatrixTable = Store::default().read(&output)?;
    assert_eq!(table.samples, ["A", "B"]);
    assert_eq!(table.rows[0].was_split, Some(false));
    assert!(table.rows[0].vep.is_some());
    Ok(())
}
