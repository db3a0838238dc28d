//! Configuration management and validation.
//!
//! Settings are read from TOML and merged with environment variables prefixed
//! with `PREBID_FANOUT__`, nested keys separated by `__`. For example
//! `PREBID_FANOUT__AUCTION__TIMEOUT_MS=250` overrides `auction.timeout_ms`.

use std::collections::{BTreeMap, HashMap};

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{ENVIRONMENT_VARIABLE_PREFIX, ENVIRONMENT_VARIABLE_SEPARATOR};
use crate::error::FanoutError;
use crate::fanout::imp_ext::ExtDecodeMode;

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub auction: AuctionSettings,
    #[serde(default)]
    #[validate(nested)]
    pub privacy: PrivacySettings,
    /// Per-publisher overrides keyed by publisher (account) id.
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
    /// Bidder adapters keyed by core bidder name.
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuctionSettings {
    /// Per-bidder dispatch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub timeout_ms: u32,
    #[serde(default = "default_max_concurrent_bidders")]
    #[validate(range(min = 1, max = 1024))]
    pub max_concurrent_bidders: usize,
    /// How malformed impression extensions are handled.
    #[serde(default)]
    pub imp_ext_decode: ExtDecodeMode,
}

impl Default for AuctionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrent_bidders: default_max_concurrent_bidders(),
            imp_ext_decode: ExtDecodeMode::default(),
        }
    }
}

fn default_timeout_ms() -> u32 {
    1000
}

fn default_max_concurrent_bidders() -> usize {
    16
}

fn default_true() -> bool {
    true
}

/// System-wide privacy defaults, used when an account has no override.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct PrivacySettings {
    #[serde(default)]
    #[validate(nested)]
    pub gdpr: GdprSettings,
    #[serde(default)]
    pub ccpa: CcpaSettings,
    #[serde(default)]
    pub lmt: LmtSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GdprSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the regime applies when a request carries no `regs.ext.gdpr`
    /// signal: 1 applies, 0 does not.
    #[serde(default = "default_gdpr_default_value")]
    #[validate(range(min = 0, max = 1))]
    pub default_value: u8,
}

impl Default for GdprSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_value: default_gdpr_default_value(),
        }
    }
}

fn default_gdpr_default_value() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CcpaSettings {
    #[serde(default = "default_true")]
    pub enforce: bool,
}

impl Default for CcpaSettings {
    fn default() -> Self {
        Self { enforce: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LmtSettings {
    #[serde(default = "default_true")]
    pub enforce: bool,
}

impl Default for LmtSettings {
    fn default() -> Self {
        Self { enforce: true }
    }
}

/// Channel a request arrived through; account privacy overrides are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    Web,
    App,
    Video,
    Amp,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub gdpr: AccountPrivacyConfig,
    #[serde(default)]
    pub ccpa: AccountPrivacyConfig,
    #[serde(default)]
    pub lmt: AccountPrivacyConfig,
}

/// Account-level override for one privacy regime.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountPrivacyConfig {
    /// Applies to every integration type without its own entry.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub integration_enabled: IntegrationEnabled,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IntegrationEnabled {
    #[serde(default)]
    pub web: Option<bool>,
    #[serde(default)]
    pub app: Option<bool>,
    #[serde(default)]
    pub video: Option<bool>,
    #[serde(default)]
    pub amp: Option<bool>,
}

impl AccountPrivacyConfig {
    /// Resolves the override for an integration type, falling back to the
    /// account-wide flag. `None` means the system default applies.
    #[must_use]
    pub fn enabled_for(&self, integration_type: Option<IntegrationType>) -> Option<bool> {
        let specific = match integration_type {
            Some(IntegrationType::Web) => self.integration_enabled.web,
            Some(IntegrationType::App) => self.integration_enabled.app,
            Some(IntegrationType::Video) => self.integration_enabled.video,
            Some(IntegrationType::Amp) => self.integration_enabled.amp,
            None => None,
        };
        specific.or(self.enabled)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AdapterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Handlebars template for the bidder endpoint, e.g. `http://{{host}}/bid`.
    #[validate(length(min = 1))]
    pub endpoint: String,
}

impl Settings {
    /// Parse settings from a TOML string, apply environment overrides, and
    /// validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::Configuration`] when the TOML cannot be parsed,
    /// does not match the settings schema, or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<FanoutError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR)
            .try_parsing(true);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(FanoutError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .change_context(FanoutError::Configuration {
                    message: "Failed to deserialize configuration".to_string(),
                })?;

        settings
            .validate()
            .change_context(FanoutError::Configuration {
                message: "Settings validation failed".to_string(),
            })?;

        for (name, adapter) in &settings.adapters {
            adapter
                .validate()
                .change_context(FanoutError::Configuration {
                    message: format!("Adapter '{name}' configuration is invalid"),
                })?;
        }

        Ok(settings)
    }

    /// Account overrides for a publisher, if any are configured.
    #[must_use]
    pub fn account(&self, publisher_id: &str) -> Option<&AccountConfig> {
        self.accounts.get(publisher_id)
    }
}
