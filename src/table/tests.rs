use crate::table::*;
use color_eyre::eyre::{Report, Result};
use loftee_path::PathDx;

fn consequence(gene_symbol: Option<&str>, gene_id: &str, lof: Option<&str>) -> TranscriptConsequence {
    TranscriptConsequence {
        gene_symbol: gene_symbol.map(String::from),
        gene_id: Some(gene_id.to_string()),
        canonical: Some(1),
        biotype: Some("protein_coding".to_string()),
        lof: lof.map(String::from),
    }
}

fn table() -> MatrixTable {
    let mut table = MatrixTable::new(vec!["A".into(), "B".into()]);
    let entry = |alleles: &[u16]| Entry { gt: Some(Genotype::new(alleles)), dp: Some(10), ad: None };

    let mut row = Row::new("1", 100, &["A", "T"], vec![entry(&[0, 1]), entry(&[0, 0])]);
    row.vep = Some(Vep {
        transcript_consequences: Some(vec![
            consequence(Some("G1"), "ENSG1", Some("HC")),
            consequence(None, "ENSG2", None),
        ]),
    });
    table.rows.push(row);

    let mut row = Row::new("1", 200, &["C", "G"], vec![entry(&[1, 1]), entry(&[0, 1])]);
    row.vep = Some(Vep { transcript_consequences: Some(vec![]) });
    table.rows.push(row);

    table.rows.push(Row::new("1", 300, &["G", "A"], vec![entry(&[0, 0]), entry(&[0, 0])]));
    table
}

#[test]
fn genotype_classes() {
    let het = Genotype::new(&[0, 1]);
    let hom_var = Genotype::new(&[1, 1]);
    let hom_ref = Genotype::new(&[0, 0]);

    assert!(het.is_het() && het.is_non_ref() && !het.is_hom_var());
    assert!(hom_var.is_hom_var() && !hom_var.is_het());
    assert!(hom_ref.is_hom_ref() && !hom_ref.is_non_ref());
    assert_eq!(het.n_alt_alleles(), 1);
    assert_eq!(hom_var.n_alt_alleles(), 2);
    assert_eq!(het.to_string(), "0/1");
}

#[test]
fn explode_drops_rows_without_consequences() {
    let exploded = table().explode_consequences().annotate_gene_names();
    assert_eq!(exploded.n_rows(), 2);
    assert!(exploded.rows.iter().all(|row| row.locus.position == 100));
    assert_eq!(exploded.gene_names().into_iter().collect::<Vec<_>>(), ["ENSG2", "G1"]);
}

#[test]
fn union_requires_same_columns() -> Result<(), Report> {
    let union = MatrixTable::union_rows(vec![table(), table()])?;
    assert_eq!(union.n_rows(), 6);

    let swapped = table().choose_cols(&[1, 0])?;
    assert!(MatrixTable::union_rows(vec![table(), swapped]).is_err());
    assert!(MatrixTable::union_rows(vec![]).is_err());
    assert!(table().choose_cols(&[2]).is_err());
    Ok(())
}

#[test]
fn store_round_trip_writes_marker_last() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let store = Store::default();
    let path = PathDx::local([dir.path(), std::path::Path::new("chr-1-b0.mt")]);

    store.write(&table(), &path, false)?;
    assert!(dir.path().join("chr-1-b0.mt").join("_SUCCESS").exists());
    assert_eq!(store.read_columns(&path)?, ["A", "B"]);
    assert_eq!(store.read::<MatrixTable>(&path)?, table());

    // no silent overwrite
    assert!(store.write(&table(), &path, false).is_err());
    store.write(&MatrixTable::new(vec!["C".into()]), &path, true)?;
    assert_eq!(store.read_metadata(&path)?.n_rows, 0);

    // incomplete tables are not readable
    std::fs::remove_file(dir.path().join("chr-1-b0.mt").join("_SUCCESS"))?;
    assert!(store.read::<MatrixTable>(&path).is_err());
    Ok(())
}

#[test]
fn database_paths_map_under_root() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let store = Store::new(Some(dir.path().to_path_buf()));
    let path = PathDx::from_database_id("database-1", ["chr-1-b0.mt"]);
    store.write(&table(), &path, false)?;
    assert!(dir.path().join("database-1").join("chr-1-b0.mt").join("_SUCCESS").exists());
    Ok(())
}

#[test]
fn staged_copy_is_removed_on_drop() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ukb23157_c1_b0_v1.vcf.gz");
    std::fs::write(&input, "##fileformat=VCFv4.2\n")?;
    let staging = dir.path().join("cluster");

    let store = Store::default();
    let staged = store.stage(&PathDx::local([&input]), &staging)?;
    assert!(staged.path().exists());
    assert_eq!(staged.path(), staging.join("ukb23157_c1_b0_v1.vcf.gz"));

    drop(staged);
    assert!(!staging.join("ukb23157_c1_b0_v1.vcf.gz").exists());
    assert!(input.exists());
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn failed_copy_leaves_no_partial_file() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let staging = dir.path().join("cluster");

    // opens as a regular file, reading from offset 0 fails
    let input = PathDx::local(["/proc/self/mem"]);
    assert!(Store::default().stage(&input, &staging).is_err());
    assert_eq!(std::fs::read_dir(&staging)?.count(), 0);
    Ok(())
}
