use clap::Parser;
use color_eyre::eyre::{Report, Result};
use loftee::annotate::{self, VepAnnotator, VepConfig};
use loftee::cli::{Cli, Command};
use loftee::config::{self, Config, Context};
use loftee::{aggregate, install};
use loftee_path::DxClient;
use log::info;

#[tokio::main]
async fn main() -> Result<(), Report> {
    // ------------------------------------------------------------------------
    // CLI Setup

    // Parse CLI parameters
    let args = Cli::parse();

    // initialize color_eyre crate for colorized logs
    color_eyre::install()?;

    // Set logging/verbosity level via RUST_LOG
    std::env::set_var("RUST_LOG", args.verbosity.to_string());

    // initialize env_logger crate for logging/verbosity level
    env_logger::init();

    let config = Config::load(args.config.as_deref())?;
    info!("Run: {}", config::run_id());
    let catalog = DxClient::new(config.api.clone());
    let context = Context::new(config, catalog);

    match args.command {
        Command::Annotate(args) => {
            let vep = VepConfig::read(&context.config.vep_config)?;
            let annotator = VepAnnotator::new(vep, context.store.clone());
            annotate::annotate_all(&context, &annotator, &args.contigs).await?;
        }
        Command::Aggregate(args) => {
            let allow_list = args
                .allow_list
                .map(|name| aggregate::read_allow_list(&context.config.project_dir.join(name)))
                .transpose()?;
            let exports = aggregate::aggregate(&context, &args.contigs, allow_list.as_deref()).await?;
            for path in exports {
                info!("Export: {path:?}");
            }
        }
        Command::InstallVep => install::install_vep(&context.config.install_script)?,
    }

    Ok(())
}
