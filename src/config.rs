use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::net::IpAddr;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::scripts::{ScriptDir, ScriptError};
use crate::util::{ip_or_empty, ordered_map};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub update_delay_seconds: u64,
    pub fallback_ip_method: Box<str>,
    pub on_error: OnError,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct OnError {
    pub enabled: bool,
    pub script: Box<str>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Auth {
    pub username: Box<str>,
    pub password: Box<str>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct HostEntry {
    pub hostname: Box<str>,
    pub auth: Box<str>,

    /// Address the remote record was last confirmed to carry. Only the
    /// update loop writes this, and only after a successful submission.
    #[serde(with = "ip_or_empty")]
    pub last_ip: Option<IpAddr>,

    pub ip_method: Box<str>,
    pub fallback: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub settings: Settings,
    pub auths: BTreeMap<Box<str>, Auth>,

    /// Kept as pairs rather than a map: rounds walk the hosts in the order
    /// the document lists them.
    #[serde(with = "ordered_map")]
    pub hosts: Vec<(Box<str>, HostEntry)>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read the configuration: {0}")]
    Read(io::Error),

    #[error("unable to parse the configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to write the configuration: {0}")]
    Write(io::Error),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("\"settings\" -> \"update_delay_seconds\" must be greater than zero")]
    UpdateDelayNotPositive,

    #[error("\"settings\" -> \"fallback_ip_method\" -> \"{script}\": {source}")]
    FallbackMethod { script: Box<str>, source: ScriptError },

    #[error("\"settings\" -> \"on_error\" -> \"{script}\": {source}")]
    OnErrorScript { script: Box<str>, source: ScriptError },

    #[error("host \"{host}\" points to a missing authentication \"{auth}\"")]
    MissingAuth { host: Box<str>, auth: Box<str> },

    #[error("host \"{host}\" -> \"ip_method\" -> \"{script}\": {source}")]
    IpMethod {
        host: Box<str>,
        script: Box<str>,
        source: ScriptError,
    },
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(ConfigError::Read)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Checks everything the field types cannot: the update delay is usable,
    /// every referenced script exists and may be executed, and every host's
    /// `auth` names a configured credential pair. Stops at the first
    /// violation so the report blames exactly one rule.
    pub fn validate(&self, scripts: &ScriptDir) -> Result<(), ValidationError> {
        if self.settings.update_delay_seconds == 0 {
            return Err(ValidationError::UpdateDelayNotPositive);
        }

        scripts
            .check(&self.settings.fallback_ip_method)
            .map_err(|source| ValidationError::FallbackMethod {
                script: self.settings.fallback_ip_method.clone(),
                source,
            })?;

        // A disabled hook may reference a script that is not there (yet).
        if self.settings.on_error.enabled {
            scripts
                .check(&self.settings.on_error.script)
                .map_err(|source| ValidationError::OnErrorScript {
                    script: self.settings.on_error.script.clone(),
                    source,
                })?;
        }

        for (key, host) in &self.hosts {
            if !self.auths.contains_key(&host.auth) {
                return Err(ValidationError::MissingAuth {
                    host: key.clone(),
                    auth: host.auth.clone(),
                });
            }

            scripts
                .check(&host.ip_method)
                .map_err(|source| ValidationError::IpMethod {
                    host: key.clone(),
                    script: host.ip_method.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Rewrites the whole document in place, pretty-printed so operators can
    /// diff successive versions.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(ConfigError::Write)?;
        Ok(())
    }
}
