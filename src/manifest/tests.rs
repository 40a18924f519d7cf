use crate::manifest::*;
use color_eyre::eyre::{Report, Result};
use loftee_path::{MemoryCatalog, PathDx};

const DATABASE_ID: &str = "database-0000000000000000000001";

#[test]
fn nsort_is_numeric_aware() {
    let mut names = vec!["b2", "b10", "b1"];
    names.sort_by_key(|name| nsort(name));
    assert_eq!(names, ["b1", "b2", "b10"]);

    let mut names = vec![
        "ukb23157_c10_b0_v1.vcf.gz",
        "ukb23157_c2_b11_v1.vcf.gz",
        "ukb23157_c2_b9_v1.vcf.gz",
        "ukb23157_cX_b0_v1.vcf.gz",
        "ukb23157_c1_b0_v1.vcf.gz",
    ];
    names.sort_by_key(|name| nsort(name));
    assert_eq!(
        names,
        [
            "ukb23157_c1_b0_v1.vcf.gz",
            "ukb23157_c2_b9_v1.vcf.gz",
            "ukb23157_c2_b11_v1.vcf.gz",
            "ukb23157_c10_b0_v1.vcf.gz",
            "ukb23157_cX_b0_v1.vcf.gz",
        ]
    );
}

#[test]
fn split_list_example() {
    assert_eq!(split_list(5, 3), vec![(0, 2), (2, 4), (4, 5)]);
    assert_eq!(split_list(3, 1), vec![(0, 3)]);
    assert_eq!(split_list(2, 4), vec![(0, 1), (1, 2), (2, 2), (2, 2)]);
}

#[test]
fn split_list_partitions_range() {
    for n in 0..60 {
        for k in 1..12 {
            let slices = split_list(n, k);
            assert_eq!(slices.len(), k);
            assert_eq!(slices.first().map(|s| s.0), Some(0));
            assert_eq!(slices.last().map(|s| s.1), Some(n));

            // contiguous and non-overlapping
            for pair in slices.windows(2) {
                assert_eq!(pair[0].1, pair[1].0);
            }

            // balanced, earliest slices are the longest
            let lengths: Vec<usize> = slices.iter().map(|(start, end)| end - start).collect();
            let min = lengths.iter().min().copied().unwrap_or(0);
            let max = lengths.iter().max().copied().unwrap_or(0);
            assert!(max - min <= 1, "n={n} k={k} {lengths:?}");
            assert!(lengths.windows(2).all(|pair| pair[0] >= pair[1]));
        }
    }
}

#[test]
fn unit_names() {
    let unit = Unit::parse("ukb23157_cX_b12_v1.vcf.gz").unwrap();
    assert_eq!(unit, Unit { contig: Contig::X, block: "12".to_string() });
    assert_eq!(unit.table_name(), "chr-X-b12.mt");

    for name in [
        "ukb23157_c1_b0_v2.vcf.gz",
        "ukb23157_cZ_b0_v1.vcf.gz",
        "ukb23157_c100_b0_v1.vcf.gz",
        "ukb23157_c1_b0_v1.vcfxgz",
        "xukb23157_c1_b0_v1.vcf.gz",
        "ukb23157_c1_b_v1.vcf.gz",
    ] {
        assert_eq!(Unit::parse(name), None, "{name}");
    }
}

#[test]
fn contig_names() -> Result<(), Report> {
    let contigs = ContigList::default();
    assert_eq!(contigs.to_string(), "1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,X,Y");
    assert_eq!("1, 2,".parse::<ContigList>()?.0, vec![Contig::Chr1, Contig::Chr2]);
    assert!("chr1".parse::<ContigList>().is_err());
    Ok(())
}

#[tokio::test]
async fn scan_filters_and_sorts() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    for name in [
        "ukb23157_c1_b10_v1.vcf.gz",
        "ukb23157_c1_b2_v1.vcf.gz",
        "ukb23157_c1_b2_v1.vcf.gz.tbi",
        "README.txt",
        "ukb23157_c1_b1_v1.vcf.gz",
    ] {
        std::fs::write(dir.path().join(name), "")?;
    }

    let catalog = MemoryCatalog::new();
    let entries = scan(&PathDx::local([dir.path()]), &catalog).await?;
    let blocks: Vec<&str> = entries.iter().map(|entry| entry.unit.block.as_str()).collect();
    assert_eq!(blocks, ["1", "2", "10"]);
    Ok(())
}

#[tokio::test]
async fn readiness_states() -> Result<(), Report> {
    let mut catalog = MemoryCatalog::new();
    catalog.add_file(DATABASE_ID, "/chr-1-b0.mt/_SUCCESS");
    catalog.add_file(DATABASE_ID, "/chr-1-b0.mt/rows.json.zst");
    catalog.add_file(DATABASE_ID, "/chr-1-b1.mt/rows.json.zst");

    let root = PathDx::from_database_id(DATABASE_ID, [""; 0]);
    let listed = root.list(&catalog).await?;

    let ready = root.join("chr-1-b0.mt");
    let unmarked = root.join("chr-1-b1.mt");
    let missing = root.join("chr-1-b2.mt");

    assert_eq!(readiness(&ready, &listed, &catalog).await, Readiness::Ready);
    assert_eq!(readiness(&unmarked, &listed, &catalog).await, Readiness::NoMarker);

    let calls = catalog.calls();
    assert_eq!(readiness(&missing, &listed, &catalog).await, Readiness::NoOutput);
    assert_eq!(catalog.calls(), calls);

    assert_eq!(Readiness::NoMarker.to_string(), "FAIL (no _SUCCESS)");
    assert_eq!(Readiness::NoOutput.to_string(), "FAIL (no file)");
    Ok(())
}

#[test]
fn unit_pattern_compiles_once() -> Result<(), Report> {
    let regex = unit_regex()?;
    assert_eq!(regex.as_str(), UNIT_PATTERN);
    assert!(std::ptr::eq(regex, unit_regex()?));
    assert!(regex.is_match("ukb23157_cY_b999_v1.vcf.gz"));
    Ok(())
}
