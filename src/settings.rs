//! Loading writer settings from configuration files.
//!
//! Settings can come from a JSON document or from the `[femtobatch]` section
//! of an INI file. Both produce a [`WriterSettings`] which is applied onto a
//! [`BatchWriterBuilder`]; anything left unset keeps the builder's value.
//!
//! ```ini
//! [femtobatch]
//! url = https://logs.example.com/ingest
//! bearer_token = abc123
//! worker_count = 4
//! flush_interval_ms = 500
//! before = [
//! between = ,
//! after = ]
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use serde::Deserialize;
use thiserror::Error;

use crate::batch::Markers;
use crate::builder::BatchWriterBuilder;
use crate::provider::Endpoint;

/// INI section read by [`WriterSettings::from_ini_str`].
pub const INI_SECTION: &str = "femtobatch";

/// Errors raised while reading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] io::Error),
    #[error("invalid INI settings: {0}")]
    Ini(#[from] ini::ParseError),
    #[error("invalid JSON settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing [{0}] section")]
    MissingSection(String),
    #[error("unknown setting `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

/// Scalar writer options as they appear in configuration files.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WriterSettings {
    pub url: Option<String>,
    pub bearer_token: Option<String>,
    pub ingress_capacity: Option<usize>,
    pub worker_count: Option<usize>,
    pub batch_capacity: Option<usize>,
    pub deferred_capacity: Option<usize>,
    pub replay_cap: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_redirects: Option<u32>,
    pub probe_on_init: Option<bool>,
    pub before: Option<String>,
    pub between: Option<String>,
    pub after: Option<String>,
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl WriterSettings {
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_ini_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        Self::from_ini_str(&text)
    }

    pub fn from_ini_str(text: &str) -> Result<Self, SettingsError> {
        let ini = Ini::load_from_str(text)?;
        let section = ini
            .section(Some(INI_SECTION))
            .ok_or_else(|| SettingsError::MissingSection(INI_SECTION.to_string()))?;
        let mut settings = Self::default();
        for (key, value) in section.iter() {
            settings.set(key, value)?;
        }
        Ok(settings)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "url" => self.url = Some(value.to_string()),
            "bearer_token" => self.bearer_token = Some(value.to_string()),
            "ingress_capacity" => self.ingress_capacity = Some(parse(key, value)?),
            "worker_count" => self.worker_count = Some(parse(key, value)?),
            "batch_capacity" => self.batch_capacity = Some(parse(key, value)?),
            "deferred_capacity" => self.deferred_capacity = Some(parse(key, value)?),
            "replay_cap" => self.replay_cap = Some(parse(key, value)?),
            "flush_interval_ms" => self.flush_interval_ms = Some(parse(key, value)?),
            "connect_timeout_ms" => self.connect_timeout_ms = Some(parse(key, value)?),
            "request_timeout_ms" => self.request_timeout_ms = Some(parse(key, value)?),
            "max_redirects" => self.max_redirects = Some(parse(key, value)?),
            "probe_on_init" => self.probe_on_init = Some(parse(key, value)?),
            "before" => self.before = Some(value.to_string()),
            "between" => self.between = Some(value.to_string()),
            "after" => self.after = Some(value.to_string()),
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Apply every set option onto `builder`.
    pub fn apply(&self, mut builder: BatchWriterBuilder) -> BatchWriterBuilder {
        if let Some(url) = &self.url {
            let mut endpoint = Endpoint::new(url.clone());
            if let Some(token) = &self.bearer_token {
                endpoint = endpoint.with_bearer_token(token.clone());
            }
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(v) = self.ingress_capacity {
            builder = builder.with_ingress_capacity(v);
        }
        if let Some(v) = self.worker_count {
            builder = builder.with_worker_count(v);
        }
        if let Some(v) = self.batch_capacity {
            builder = builder.with_batch_capacity(v);
        }
        if let Some(v) = self.deferred_capacity {
            builder = builder.with_deferred_capacity(v);
        }
        if let Some(v) = self.replay_cap {
            builder = builder.with_replay_cap(v);
        }
        if let Some(ms) = self.flush_interval_ms {
            builder = builder.with_flush_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.with_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.request_timeout_ms {
            builder = builder.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(v) = self.max_redirects {
            builder = builder.with_max_redirects(v);
        }
        if let Some(v) = self.probe_on_init {
            builder = builder.with_probe_on_init(v);
        }
        if let Some(markers) = self.markers() {
            builder = builder.with_markers(markers);
        }
        builder
    }

    /// Markers described by the settings, filling gaps from the default.
    pub fn markers(&self) -> Option<Markers> {
        if self.before.is_none() && self.between.is_none() && self.after.is_none() {
            return None;
        }
        let defaults = Markers::default();
        Some(Markers {
            before: self
                .before
                .as_ref()
                .map_or(defaults.before, |s| s.as_bytes().to_vec()),
            between: self
                .between
                .as_ref()
                .map_or(defaults.between, |s| s.as_bytes().to_vec()),
            after: self
                .after
                .as_ref()
                .map_or(defaults.after, |s| s.as_bytes().to_vec()),
        })
    }
}
