//! Install VEP and the LOFTEE plugin with the bundled shell script.

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use log::info;
use std::path::Path;
use std::process::Command;

/// Run `bash <script>`, failing on a non-zero exit.
pub fn install_vep(script: &Path) -> Result<(), Report> {
    if !script.exists() {
        return Err(eyre!("Install script not found: {script:?}")
            .suggestion("Set install_script in the config to the path of install_vep.sh."));
    }
    info!("Running: bash {script:?}");
    let status = Command::new("bash")
        .arg(script)
        .status()
        .wrap_err_with(|| eyre!("Failed to run bash: {script:?}"))?;
    if !status.success() {
        return Err(eyre!("Install script failed with {status}: {script:?}"));
    }
    info!("VEP installed.");
    Ok(())
}
