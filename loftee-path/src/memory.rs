//! In-memory [`Catalog`], used for offline runs and tests.

use crate::catalog::{
    Catalog, DatabaseDescription, DatabaseEntry, FindDatabases, FolderEntry, ListFolder,
};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A catalog holding databases as sets of absolute file paths.
///
/// Folders exist implicitly as ancestors of files. Listing a file returns the
/// file itself, the same way the remote API answers for a leaf.
///
/// ```rust
/// use loftee_path::{Catalog, MemoryCatalog};
/// # tokio_test::block_on(async {
/// let mut catalog = MemoryCatalog::new();
/// catalog.add_database("database-1", "wes_mt");
/// catalog.add_file("database-1", "/chr-1-b0.mt/_SUCCESS");
/// let listing = catalog.list_folder("database-1", "/", true).await?;
/// assert_eq!(listing.results[0].path, "dnax://database-1/chr-1-b0.mt");
/// # Ok::<(), color_eyre::eyre::Report>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    databases: BTreeMap<String, (String, BTreeSet<PathBuf>)>,
    next: Option<Value>,
    calls: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        MemoryCatalog::default()
    }

    /// Register a database.
    pub fn add_database(&mut self, id: &str, name: &str) -> &mut Self {
        self.databases.entry(id.to_string()).or_insert_with(|| (name.to_string(), BTreeSet::new()));
        self
    }

    /// Register a file in a database, creating the database if needed.
    pub fn add_file(&mut self, id: &str, path: &str) -> &mut Self {
        let (_, files) = self
            .databases
            .entry(id.to_string())
            .or_insert_with(|| (id.to_string(), BTreeSet::new()));
        files.insert(Path::new("/").join(path));
        self
    }

    /// Pretend the catalog has a second page of databases.
    pub fn set_next_page(&mut self, next: Value) -> &mut Self {
        self.next = Some(next);
        self
    }

    /// Number of remote calls answered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find_databases(&self) -> Result<FindDatabases, Report> {
        self.record_call();
        let results = self.databases.keys().map(|id| DatabaseEntry { id: id.clone() }).collect();
        Ok(FindDatabases { results, next: self.next.clone() })
    }

    async fn describe_database(&self, database_id: &str) -> Result<DatabaseDescription, Report> {
        self.record_call();
        let (name, _) = self
            .databases
            .get(database_id)
            .ok_or_else(|| eyre!("Unknown database id: {database_id}"))?;
        Ok(DatabaseDescription { id: database_id.to_string(), name: name.clone() })
    }

    async fn list_folder(
        &self,
        database_id: &str,
        folder: &str,
        _include_hidden: bool,
    ) -> Result<ListFolder, Report> {
        self.record_call();
        let Some((_, files)) = self.databases.get(database_id) else {
            return Ok(ListFolder::default());
        };
        let folder = Path::new("/").join(folder);
        let to_entry = |path: &Path| FolderEntry {
            path: format!("dnax://{database_id}{}", path.display()),
        };

        // a leaf answers with itself
        if files.contains(&folder) {
            return Ok(ListFolder { results: vec![to_entry(&folder)] });
        }

        let results = files
            .iter()
            .filter_map(|file| file.strip_prefix(&folder).ok())
            .filter_map(|relative| match relative.components().next() {
                Some(Component::Normal(child)) => Some(folder.join(child)),
                _ => None,
            })
            .unique()
            .map(|child| to_entry(&child))
            .collect();

        Ok(ListFolder { results })
    }
}
