//! Settings file commands.

use std::fs;
use std::path::Path;

use prebid_fanout_common::adapters::AdapterRegistry;
use prebid_fanout_common::settings::Settings;

use crate::error::CliError;

/// Read and validate a settings file. Environment overrides apply.
pub fn load_settings(file: &Path) -> Result<Settings, CliError> {
    let toml_str = fs::read_to_string(file)
        .map_err(|e| CliError::Config(format!("Failed to read {}: {e}", file.display())))?;

    Settings::from_toml(&toml_str).map_err(|report| CliError::Config(format!("{report:?}")))
}

/// Validate settings and compile every enabled adapter's endpoint template.
pub fn validate(file: &Path, verbose: bool) -> Result<(), CliError> {
    let settings = load_settings(file)?;
    let registry = AdapterRegistry::from_settings(&settings)
        .map_err(|report| CliError::Config(format!("{report:?}")))?;

    println!("Configuration is valid");
    println!("  File: {}", file.display());
    println!("  Timeout: {}ms", settings.auction.timeout_ms);
    println!(
        "  Max concurrent bidders: {}",
        settings.auction.max_concurrent_bidders
    );
    println!("  Accounts: {}", settings.accounts.len());
    println!("  Enabled adapters: {}", registry.len());

    if verbose {
        for name in registry.names() {
            if let Some(adapter) = settings.adapters.get(name) {
                println!("    {name}: {}", adapter.endpoint);
            }
        }
        println!(
            "  Privacy defaults: gdpr={} ccpa={} lmt={}",
            settings.privacy.gdpr.enabled,
            settings.privacy.ccpa.enforce,
            settings.privacy.lmt.enforce
        );
    }

    Ok(())
}
