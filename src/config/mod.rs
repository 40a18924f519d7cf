//! Run configuration, loaded once at start and passed by reference.

use crate::filter::VariantFilter;
use crate::table::Store;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use loftee_path::{Catalog, DxApi, PathDx};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ENV_HOST: &str = "DX_APISERVER_HOST";
pub const ENV_PORT: &str = "DX_APISERVER_PORT";
pub const ENV_PROTOCOL: &str = "DX_APISERVER_PROTOCOL";
pub const ENV_SECURITY_CONTEXT: &str = "DX_SECURITY_CONTEXT";

// ----------------------------------------------------------------------------
// Config
// ----------------------------------------------------------------------------

/// Every path, database reference, threshold and batch size used by a run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory of input pVCF files.
    pub manifest_dir: PathBuf,
    /// Project mount, the allow-list file is resolved against it.
    pub project_dir: PathBuf,
    /// Destination database name, mutually exclusive with `database_id`.
    pub database: Option<String>,
    /// Destination database id.
    pub database_id: Option<String>,
    /// Local destination, used when no database is configured.
    pub dest_dir: PathBuf,
    /// Local mount of database storage, `<dnax_root>/<database-id>/...`.
    pub dnax_root: Option<PathBuf>,
    /// Fast local storage for staged inputs.
    pub staging_dir: PathBuf,
    /// Checkpoints and block matrices.
    pub scratch_dir: PathBuf,
    /// Final `out-<chrom>-<hex>.csv.gz` exports.
    pub output_dir: PathBuf,
    /// VEP command configuration (JSON).
    pub vep_config: PathBuf,
    /// Shell script installing VEP and LOFTEE.
    pub install_script: PathBuf,
    /// Units per union batch.
    pub min_batch: usize,
    /// Block matrix block size.
    pub block_size: usize,
    /// Export batch size, in blocks.
    pub export_blocks: usize,
    pub filter: VariantFilter,
    pub api: DxApi,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Config {
            manifest_dir: PathBuf::from(
                "/mnt/project/Bulk/Exome sequences/Population level exome OQFE variants, pVCF format - final release",
            ),
            project_dir: PathBuf::from("/mnt/project"),
            database: Some("wes_mt".to_string()),
            database_id: None,
            dest_dir: PathBuf::from("wes_mt"),
            dnax_root: None,
            staging_dir: PathBuf::from("/cluster"),
            scratch_dir: PathBuf::from("/cluster"),
            output_dir: PathBuf::from("/opt/notebooks"),
            vep_config: PathBuf::from("vep-config.json"),
            install_script: PathBuf::from("preprocessing/install_vep.sh"),
            min_batch: 19,
            block_size: 512,
            export_blocks: 100,
            filter: VariantFilter::default(),
            api: DxApi::default(),
        }
    }

    /// Read config from a JSON file. Missing fields take their default value.
    pub fn read(path: &Path) -> Result<Config, Report> {
        let config = std::fs::read_to_string(path)
            .wrap_err_with(|| eyre!("Failed to read file: {path:?}."))?;
        let config = serde_json::from_str(&config)
            .wrap_err_with(|| eyre!("Failed to parse file: {path:?}"))?;
        Ok(config)
    }

    /// Write config to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), Report> {
        let mut file =
            File::create(path).wrap_err_with(|| format!("Failed to create file: {path:?}"))?;
        let output = serde_json::to_string_pretty(self)
            .wrap_err_with(|| "Failed to parse config.".to_string())?;
        file.write_all(format!("{}\n", output).as_bytes())
            .wrap_err_with(|| format!("Failed to write file: {path:?}"))?;
        Ok(())
    }

    /// Defaults, then the optional JSON file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Config, Report> {
        let mut config = match path {
            Some(path) => Config::read(path)?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override API settings from environment variables looked up with `lookup`.
    ///
    /// ```rust
    /// use loftee::config::Config;
    ///
    /// let mut config = Config::default();
    /// config.apply_env(|key| match key {
    ///     "DX_APISERVER_HOST" => Some("10.0.3.1".to_string()),
    ///     "DX_APISERVER_PORT" => Some("8124".to_string()),
    ///     "DX_APISERVER_PROTOCOL" => Some("http".to_string()),
    ///     _ => None,
    /// })?;
    /// assert_eq!(config.api.url(), "http://10.0.3.1:8124");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), Report>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.api.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.api.port =
                port.parse().wrap_err_with(|| eyre!("Invalid {ENV_PORT}: {port:?}"))?;
        }
        if let Some(protocol) = lookup(ENV_PROTOCOL) {
            self.api.protocol = protocol;
        }
        if let Some(context) = lookup(ENV_SECURITY_CONTEXT) {
            self.api.token = Some(DxApi::token_from_security_context(&context)?);
        }
        debug!("API server: {}", self.api.url());
        Ok(())
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<(), Report> {
        if self.database.is_some() && self.database_id.is_some() {
            return Err(eyre!("Both database and database_id are configured.")
                .suggestion("Set only one of them."));
        }
        if (self.database.is_some() || self.database_id.is_some()) && self.dnax_root.is_none() {
            return Err(eyre!("A destination database is configured without dnax_root.")
                .suggestion("Set dnax_root to the mounted database directory, or unset database to write into dest_dir."));
        }
        if self.min_batch == 0 || self.block_size == 0 || self.export_blocks == 0 {
            return Err(eyre!("min_batch, block_size and export_blocks must be positive."));
        }
        Ok(())
    }
}

/// Run identifier, `<yyyymmdd-HHMM>-<hex>`, logged at start so scratch and exports can be traced to a run.
pub fn run_id() -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("{}-{suffix:04x}", chrono::Local::now().format("%Y%m%d-%H%M"))
}

// ----------------------------------------------------------------------------
// Context
// ----------------------------------------------------------------------------

/// The config together with the catalog and the table store it describes.
#[derive(Debug)]
pub struct Context<C> {
    pub config: Config,
    pub catalog: C,
    pub store: Store,
}

impl<C: Catalog> Context<C> {
    pub fn new(config: Config, catalog: C) -> Self {
        let store = Store::new(config.dnax_root.clone());
        Context { config, catalog, store }
    }

    /// Root of the annotated tables: the configured database, or `dest_dir`.
    ///
    /// Resolving a database name costs one catalog lookup.
    pub async fn dest_root(&self) -> Result<PathDx, Report> {
        let database = self.config.database.as_deref();
        let database_id = self.config.database_id.as_deref();
        match (database, database_id) {
            (None, None) => Ok(PathDx::local([&self.config.dest_dir])),
            _ => PathDx::new(&self.catalog, [""; 0], database, database_id).await,
        }
    }

    pub fn manifest_root(&self) -> PathDx {
        PathDx::local([&self.config.manifest_dir])
    }

    /// A path under the scratch directory.
    pub fn scratch(&self, name: &str) -> PathDx {
        PathDx::local([self.config.scratch_dir.join(name)])
    }
}
