//! Paths that live either on the local filesystem or inside a remote tabular database.
//!
//! A [`PathDx`] is resolved to one canonical string ([`PathDx::rstr`]), which is
//! the only form handed to storage and compute collaborators:
//!
//! - local: `file://<absolute-resolved-path>`
//! - database: `dnax://<database-id>/<segments>`
//!
//! ```rust
//! use loftee_path::PathDx;
//! let path = PathDx::from_database_id("database-GPJ7YJjJ18XYJy56jZgF7FZ6", ["example_table.ht"]);
//! assert_eq!(path.rstr()?, "dnax://database-GPJ7YJjJ18XYJy56jZgF7FZ6/example_table.ht");
//! # Ok::<(), color_eyre::eyre::Report>(())
//! ```

pub mod catalog;
mod error;
pub mod memory;

#[doc(inline)]
pub use catalog::{Catalog, DxApi, DxClient};
#[doc(inline)]
pub use error::{is_empty_listing, PathError};
#[doc(inline)]
pub use memory::MemoryCatalog;

use crate::catalog::DatabaseDescription;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use log::debug;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

pub const DRV_DNAX: &str = "dnax://";
pub const DRV_LOCAL: &str = "file://";

// ----------------------------------------------------------------------------
// PathDx
// ----------------------------------------------------------------------------

/// A local or database-backed path.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PathDx {
    /// Host filesystem path, relative paths resolve against the working directory.
    Local(PathBuf),
    /// Path inside a remote database, always rooted at `/`.
    Database { id: String, path: PathBuf },
}

impl Display for PathDx {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PathDx::Local(path) => write!(f, "{}", path.display()),
            PathDx::Database { id, path } => write!(f, "{DRV_DNAX}{id}{}", path.display()),
        }
    }
}

impl PathDx {
    /// A local path built from plain segments.
    ///
    /// ```rust
    /// use loftee_path::PathDx;
    /// let path = PathDx::local(["/example", "table.ht"]);
    /// assert_eq!(path.rstr()?, "file:///example/table.ht");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn local<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        PathDx::Local(segments.into_iter().fold(PathBuf::new(), |path, s| path.join(s)))
    }

    /// A database-backed path from an already known database id. No remote call is made.
    pub fn from_database_id<I, S>(database_id: &str, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let path = segments.into_iter().fold(PathBuf::from("/"), |path, s| path.join(s));
        PathDx::Database { id: database_id.to_string(), path }
    }

    /// Construct a path from segments and an optional database reference.
    ///
    /// - neither `database` nor `database_id`: a local path.
    /// - `database_id`: a database path, no remote call.
    /// - `database`: the name is resolved to an id with [`find_database`].
    /// - both: [`PathError::InvalidArgument`], raised before any remote call.
    ///
    /// ```rust
    /// use loftee_path::{MemoryCatalog, PathDx, PathError};
    /// # tokio_test::block_on(async {
    /// let catalog = MemoryCatalog::new();
    /// let result = PathDx::new(&catalog, ["a.mt"], Some("wes_mt"), Some("database-1")).await;
    /// let error = result.unwrap_err();
    /// assert!(matches!(error.downcast_ref::<PathError>(), Some(PathError::InvalidArgument { .. })));
    /// assert_eq!(catalog.calls(), 0);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// # }).unwrap();
    /// ```
    pub async fn new<C, I, S>(
        catalog: &C,
        segments: I,
        database: Option<&str>,
        database_id: Option<&str>,
    ) -> Result<Self, Report>
    where
        C: Catalog + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        match (database, database_id) {
            (Some(database), Some(database_id)) => Err(PathError::InvalidArgument {
                database: database.to_string(),
                database_id: database_id.to_string(),
            }
            .into()),
            (None, None) => Ok(PathDx::local(segments)),
            (None, Some(database_id)) => Ok(PathDx::from_database_id(database_id, segments)),
            (Some(database), None) => {
                let description = find_database(catalog, database).await?;
                Ok(PathDx::from_database_id(&description.id, segments))
            }
        }
    }

    /// Append one or more segments. An absolute segment replaces the path, like [`Path::join`].
    pub fn join<S: AsRef<Path>>(&self, segment: S) -> Self {
        match self {
            PathDx::Local(path) => PathDx::Local(path.join(segment)),
            PathDx::Database { id, path } => {
                PathDx::Database { id: id.clone(), path: path.join(segment) }
            }
        }
    }

    /// The final segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        let path = match self {
            PathDx::Local(path) => path,
            PathDx::Database { path, .. } => path,
        };
        path.file_name().and_then(|name| name.to_str())
    }

    /// The database id, for database-backed paths.
    pub fn database_id(&self) -> Option<&str> {
        match self {
            PathDx::Local(_) => None,
            PathDx::Database { id, .. } => Some(id),
        }
    }

    /// Canonical string form, the only form passed to storage and compute calls.
    ///
    /// Local paths are made absolute against the working directory and resolved
    /// through symlinks when they exist.
    pub fn rstr(&self) -> Result<String, Report> {
        match self {
            PathDx::Database { id, path } => Ok(format!("{DRV_DNAX}{id}{}", path.display())),
            PathDx::Local(path) => {
                let absolute = if path.is_absolute() {
                    path.clone()
                } else {
                    std::env::current_dir()
                        .wrap_err("Failed to get the current working directory.")?
                        .join(path)
                };
                let resolved = std::fs::canonicalize(&absolute).unwrap_or_else(|_| normalize(&absolute));
                Ok(format!("{DRV_LOCAL}{}", resolved.display()))
            }
        }
    }

    /// List the immediate children of a directory.
    ///
    /// Database paths issue exactly one `listFolder` call including hidden
    /// entries. An empty answer is [`PathError::EmptyOrMissing`], never an empty
    /// [`Vec`]. Local paths use [`std::fs::read_dir`]. Order is whatever the
    /// backend yields.
    pub async fn list<C>(&self, catalog: &C) -> Result<Vec<PathDx>, Report>
    where
        C: Catalog + ?Sized,
    {
        match self {
            PathDx::Local(path) => {
                if path.is_file() {
                    Err(PathError::NotADirectory(path.display().to_string()))?;
                }
                let entries = std::fs::read_dir(path)
                    .wrap_err_with(|| eyre!("Failed to list directory: {path:?}"))?;
                let mut children = Vec::new();
                for entry in entries {
                    let entry = entry.wrap_err_with(|| eyre!("Failed to list directory: {path:?}"))?;
                    children.push(PathDx::Local(entry.path()));
                }
                Ok(children)
            }
            PathDx::Database { id, path } => {
                let folder = path.display().to_string();
                let response = catalog.list_folder(id, &folder, true).await?;
                debug!("Listed {} entries in {self}", response.results.len());
                if response.results.is_empty() {
                    Err(PathError::EmptyOrMissing(self.to_string()))?;
                }
                response.results.iter().map(|entry| child_from_entry(id, path, &entry.path)).collect()
            }
        }
    }
}

/// Convert one remote listing entry into a child path of `folder`.
fn child_from_entry(id: &str, folder: &Path, entry: &str) -> Result<PathDx, Report> {
    // entries carry the database id, ex. dnax://database-xxxx/folder/child
    let Some((_, remote)) = entry.split_once(id) else {
        return Err(PathError::NotADirectory(entry.to_string()).into());
    };
    let remote = Path::new("/").join(remote.trim_start_matches('/'));

    let relative = remote.strip_prefix(folder).map_err(|_| PathError::ForeignEntry {
        folder: folder.display().to_string(),
        entry: entry.to_string(),
    })?;

    match relative.components().count() {
        0 => Err(PathError::NotADirectory(entry.to_string()).into()),
        1 => Ok(PathDx::Database { id: id.to_string(), path: remote }),
        _ => Err(PathError::UnsupportedNestedPath {
            folder: folder.display().to_string(),
            entry: entry.to_string(),
        }
        .into()),
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut output = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                output.pop();
            }
            other => output.push(other.as_os_str()),
        }
    }
    output
}

// ----------------------------------------------------------------------------
// Database Lookup
// ----------------------------------------------------------------------------

/// Find a database by name or id.
///
/// The whole catalog is enumerated and every entry is described. A paginated
/// catalog response fails with [`PathError::PaginatedCatalog`] rather than
/// searching a partial list; no match fails with [`PathError::DatabaseNotFound`].
///
/// ```rust
/// use loftee_path::{find_database, MemoryCatalog, PathError};
/// # tokio_test::block_on(async {
/// let mut catalog = MemoryCatalog::new();
/// catalog.add_database("database-1", "wes_mt");
/// assert_eq!(find_database(&catalog, "wes_mt").await?.id, "database-1");
/// assert_eq!(find_database(&catalog, "database-1").await?.name, "wes_mt");
///
/// let error = find_database(&catalog, "i_dont_exist").await.unwrap_err();
/// assert!(error.to_string().contains("CREATE DATABASE IF NOT EXISTS i_dont_exist"));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// # }).unwrap();
/// ```
pub async fn find_database<C>(catalog: &C, reference: &str) -> Result<DatabaseDescription, Report>
where
    C: Catalog + ?Sized,
{
    let response = catalog.find_databases().await?;
    if let Some(next) = response.next {
        Err(PathError::PaginatedCatalog(next.to_string()))?;
    }

    for entry in response.results {
        let description = catalog.describe_database(&entry.id).await?;
        if entry.id == reference || description.name == reference {
            debug!("Resolved database {reference:?} to {}", description.id);
            return Ok(description);
        }
    }

    Err(PathError::DatabaseNotFound(reference.to_string()).into())
}

#[cfg(test)]
mod tests;
