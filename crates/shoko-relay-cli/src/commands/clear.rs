use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use shoko_relay_config::PathManager;
use shoko_relay_core::ReportStore;
use std::fs;

pub fn run_clear(all: bool, reports: bool, credentials: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();

    if !(all || reports || credentials) {
        output.warn("No clear option specified. Use --reports, --credentials, or --all");
        output.println("\nExample: shoko-relay clear --reports");
        return Ok(());
    }

    if all || reports {
        clear_reports(&path_manager, output)?;
    }
    if all || credentials {
        clear_credentials(&path_manager, output)?;
    }
    Ok(())
}

fn clear_reports(path_manager: &PathManager, output: &Output) -> Result<()> {
    if !path_manager.reports_dir().exists() {
        output.info("No reports found to clear");
        return Ok(());
    }
    let store = ReportStore::new(path_manager).map_err(|e| eyre!("Failed to open report store: {}", e))?;
    let removed = store.clear().map_err(|e| eyre!("Failed to clear reports: {}", e))?;
    output.success(format!("Cleared {} reports from {}", removed, store.dir().display()));
    Ok(())
}

fn clear_credentials(path_manager: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = path_manager.credentials_file();
    if credentials_file.exists() {
        fs::remove_file(&credentials_file).map_err(|e| {
            eyre!("Failed to remove credentials at {}: {}", credentials_file.display(), e)
        })?;
        output.success(format!("Cleared credentials: {}", credentials_file.display()));
    } else {
        output.info("No credentials found to clear");
    }
    Ok(())
}
