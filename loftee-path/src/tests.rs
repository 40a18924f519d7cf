use crate::{find_database, is_empty_listing, MemoryCatalog, PathDx, PathError};
use color_eyre::eyre::{Report, Result};

const DATABASE_NAME: &str = "test_database";
const DATABASE_ID: &str = "database-GPJ7YJjJ18XYJy56jZgF7FZ6";

fn catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog.add_database("database-0000000000000000000000", "other_database");
    catalog.add_database(DATABASE_ID, DATABASE_NAME);
    for file in [
        "/empty_table.ht/README.txt",
        "/empty_table.ht/_SUCCESS",
        "/empty_table.ht/.metadata.json.gz",
        "/empty_table.ht/metadata.json.gz",
        "/empty_table.ht/index/part-0.idx/index",
        "/empty_table.ht/rows/metadata.json.gz",
        "/empty_table.ht/globals/parts/part-0",
    ] {
        catalog.add_file(DATABASE_ID, file);
    }
    catalog
}

fn path_error(report: &Report) -> Option<&PathError> {
    report.downcast_ref::<PathError>()
}

#[tokio::test]
async fn dnax_paths() -> Result<(), Report> {
    let catalog = catalog();
    let expected = format!("dnax://{DATABASE_ID}/example_table.ht");

    let p1 = PathDx::new(&catalog, ["example_table.ht"], Some(DATABASE_NAME), None).await?;
    let p2 = PathDx::new(&catalog, ["/example_table.ht"], Some(DATABASE_NAME), None).await?;
    let p3 = PathDx::new(&catalog, [""; 0], Some(DATABASE_NAME), None).await?.join("example_table.ht");
    let p4 = PathDx::new(&catalog, ["example_table.ht"], None, Some(DATABASE_ID)).await?;

    for path in [&p1, &p2, &p3, &p4] {
        assert_eq!(path.rstr()?, expected);
    }
    assert_eq!(p1, p4);
    Ok(())
}

#[tokio::test]
async fn database_by_name_equals_database_by_id() -> Result<(), Report> {
    let catalog = catalog();
    for segments in [vec![], vec!["a.mt"], vec!["a.mt", "rows", "parts"]] {
        let by_name = PathDx::new(&catalog, &segments, Some(DATABASE_NAME), None).await?;
        let by_id = PathDx::new(&catalog, &segments, Some(DATABASE_ID), None).await?;
        let direct = PathDx::from_database_id(DATABASE_ID, &segments);
        assert_eq!(by_name.rstr()?, by_id.rstr()?);
        assert_eq!(by_name.rstr()?, direct.rstr()?);
    }
    assert_eq!(PathDx::from_database_id(DATABASE_ID, [""; 0]).rstr()?, format!("dnax://{DATABASE_ID}/"));
    Ok(())
}

#[tokio::test]
async fn database_name_and_id_fail_before_network() {
    let catalog = catalog();
    let error = PathDx::new(&catalog, ["x.mt"], Some(DATABASE_NAME), Some(DATABASE_ID))
        .await
        .unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::InvalidArgument { .. })));
    assert_eq!(catalog.calls(), 0);
}

#[tokio::test]
async fn database_id_needs_no_lookup() -> Result<(), Report> {
    let catalog = catalog();
    PathDx::new(&catalog, ["x.mt"], None, Some(DATABASE_ID)).await?;
    assert_eq!(catalog.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn non_existing_database_name() {
    let catalog = catalog();
    let error = PathDx::new(&catalog, ["example_table.ht"], Some("i_dont_exist"), None)
        .await
        .unwrap_err();
    assert_eq!(path_error(&error), Some(&PathError::DatabaseNotFound("i_dont_exist".into())));
    assert!(error.to_string().contains("CREATE DATABASE IF NOT EXISTS i_dont_exist LOCATION 'dnax://'"));
}

#[tokio::test]
async fn paginated_catalog_fails_loudly() {
    let mut catalog = catalog();
    catalog.set_next_page(serde_json::json!({ "id": "database-next" }));
    let error = find_database(&catalog, DATABASE_NAME).await.unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::PaginatedCatalog(_))));
}

#[tokio::test]
async fn list_database_root_and_table() -> Result<(), Report> {
    let catalog = catalog();

    let root = PathDx::from_database_id(DATABASE_ID, [""; 0]);
    let children = root.list(&catalog).await?;
    assert_eq!(children, vec![PathDx::from_database_id(DATABASE_ID, ["empty_table.ht"])]);

    let table = root.join("empty_table.ht");
    let children = table.list(&catalog).await?;
    assert_eq!(children.len(), 7);
    assert!(children.iter().all(|child| child.database_id() == Some(DATABASE_ID)));
    assert!(children.iter().any(|child| child.file_name() == Some("_SUCCESS")));

    let one_dir = table.join("index");
    assert_eq!(one_dir.list(&catalog).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn list_file_is_not_a_directory() {
    let catalog = catalog();
    let file = PathDx::from_database_id(DATABASE_ID, ["empty_table.ht", "README.txt"]);
    let error = file.list(&catalog).await.unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::NotADirectory(_))));
}

#[tokio::test]
async fn list_empty_or_missing_is_an_error() {
    let catalog = catalog();
    for path in [
        PathDx::from_database_id(DATABASE_ID, ["empty_table.ht", "references"]),
        PathDx::from_database_id(DATABASE_ID, ["empty_table.ht", "i_dont_exist"]),
        PathDx::from_database_id("database-unknown", [""; 0]),
    ] {
        let error = path.list(&catalog).await.unwrap_err();
        assert!(is_empty_listing(&error), "{error}");
    }
}

#[test]
fn nested_and_foreign_entries_are_rejected() {
    let folder = std::path::Path::new("/table.mt");

    let error = super::child_from_entry(DATABASE_ID, folder, &format!("dnax://{DATABASE_ID}/table.mt/rows/parts"))
        .unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::UnsupportedNestedPath { .. })));

    let error = super::child_from_entry(DATABASE_ID, folder, &format!("dnax://{DATABASE_ID}/other.mt/rows"))
        .unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::ForeignEntry { .. })));

    let error = super::child_from_entry(DATABASE_ID, folder, "/table.mt/rows").unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::NotADirectory(_))));
}

#[tokio::test]
async fn list_local_directory() -> Result<(), Report> {
    let catalog = MemoryCatalog::new();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.txt"), "")?;
    std::fs::create_dir(dir.path().join("b"))?;

    let path = PathDx::local([dir.path()]);
    let mut children = path.list(&catalog).await?;
    children.sort();
    assert_eq!(children, vec![path.join("a.txt"), path.join("b")]);

    let error = path.join("a.txt").list(&catalog).await.unwrap_err();
    assert!(matches!(path_error(&error), Some(PathError::NotADirectory(_))));
    assert_eq!(catalog.calls(), 0);
    Ok(())
}

#[test]
fn local_paths() -> Result<(), Report> {
    let cwd = std::env::current_dir()?.canonicalize()?;
    assert_eq!(PathDx::local([""; 0]).rstr()?, format!("file://{}", cwd.display()));
    assert_eq!(PathDx::local(["/example_table.ht"]).rstr()?, "file:///example_table.ht");
    assert_eq!(PathDx::local(["/a/./b/../example_table.ht"]).rstr()?, "file:///a/example_table.ht");
    assert_eq!(
        PathDx::local(["i_dont_exist.ht"]).rstr()?,
        format!("file://{}", std::env::current_dir()?.join("i_dont_exist.ht").display())
    );
    Ok(())
}
