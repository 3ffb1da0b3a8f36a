// config.rs - Configuration
//
//! Settings for codecs, conversation monitors and logging.
//!
//! Loaded from a TOML, JSON or YAML file (format chosen by extension), with
//! `FIPA_ACL_*` environment variables on top and built-in defaults for
//! anything left unset:
//!
//! ```toml
//! [monitor]
//! protocol_resource_dir = "/etc/fipa/protocols"
//! default_content_language = "fipa-sl"
//!
//! [codec]
//! representation = "string"
//! strict = false
//!
//! [tracing]
//! filter = "info,fipa_acl=debug"
//! format = "json"
//! ```

use crate::codec::{DecodeOptions, Representation};
use crate::observability::{TracingConfig, TracingFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub codec: CodecSettings,
    pub tracing: TracingSettings,
}

/// Defaults applied to conversations a monitor creates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Directory holding `<protocol>.json` grammars; validation is off without it
    pub protocol_resource_dir: Option<PathBuf>,

    /// Content language for new conversations; empty adopts the first message's
    pub default_content_language: String,
}

/// Codec defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Representation used for encoding
    pub representation: Representation,

    /// Fail on unparseable optional fields
    pub strict: bool,

    /// Keep unknown performatives instead of rejecting the message
    pub allow_unrecognized_performative: bool,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            representation: Representation::Bitefficient,
            strict: true,
            allow_unrecognized_performative: false,
        }
    }
}

impl CodecSettings {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            strict: self.strict,
            allow_unrecognized_performative: self.allow_unrecognized_performative,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSettings {
    /// `EnvFilter` directives
    pub filter: String,

    pub format: TracingFormat,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            filter: TracingConfig::default().filter,
            format: TracingFormat::default(),
        }
    }
}

impl From<&TracingSettings> for TracingConfig {
    fn from(settings: &TracingSettings) -> Self {
        let base = match settings.format {
            TracingFormat::Json => TracingConfig::production(),
            _ => TracingConfig::default(),
        };
        base.with_filter(settings.filter.clone())
            .with_format(settings.format)
    }
}

impl Settings {
    /// Load settings from `path`, then `FIPA_ACL_*` environment variables
    /// (`FIPA_ACL_CODEC__STRICT=false`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix("FIPA_ACL").separator("__"))
            .build()?;
        let settings: Settings = settings.try_deserialize()?;

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(settings)
    }

    /// Like [`Settings::load`], falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load configuration, using defaults");
                Self::default()
            }
        }
    }
}
