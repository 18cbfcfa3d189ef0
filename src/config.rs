//! Typed configuration value mirroring the recognised keys; loading it from
//! a file or environment is left to the embedding binary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::DEFAULT_LIMIT_OPEN_FILE;
use crate::Result;

fn default_root_dir() -> String {
    "lilyDB".to_string()
}

fn default_limit_open_file() -> usize {
    DEFAULT_LIMIT_OPEN_FILE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub root_dir: String,
    pub data_dir: Option<String>,
    pub limit_open_file: usize,

    pub log_level: String,
    pub log_dir: Option<String>,
    pub log_file_max_size: u64,
    pub log_file_max_age: u64,
    pub log_utc: bool,
    pub production: bool,

    pub tls: bool,
    pub tls_server_key_file: String,
    pub tls_server_cert_file: String,

    pub limit: bool,
    pub limit_millisecond: u64,
    pub limit_count: u64,
    pub limit_interval_microsecond: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 8080,
            root_dir: default_root_dir(),
            data_dir: None,
            limit_open_file: default_limit_open_file(),
            log_level: "info".to_string(),
            log_dir: None,
            log_file_max_size: 0,
            log_file_max_age: 0,
            log_utc: false,
            production: false,
            tls: false,
            tls_server_key_file: String::new(),
            tls_server_cert_file: String::new(),
            limit: false,
            limit_millisecond: 0,
            limit_count: 0,
            limit_interval_microsecond: 0,
        }
    }
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(d) => PathBuf::from(d),
            None => PathBuf::from(&self.root_dir).join("data"),
        }
    }

    pub fn limit_open_file(&self) -> usize {
        if self.limit_open_file < 1000 {
            log::warn!(
                "LimitOpenFile {} is below the recommended floor of 1000, clamping to {}",
                self.limit_open_file,
                DEFAULT_LIMIT_OPEN_FILE
            );
            DEFAULT_LIMIT_OPEN_FILE
        } else {
            self.limit_open_file
        }
    }

    /// Raise the fatal startup errors this configuration would trigger.
    pub fn validate(&self) -> Result<()> {
        if self.tls && (self.tls_server_key_file.is_empty() || self.tls_server_cert_file.is_empty()) {
            return err_at!(
                TLSConfigIncomplete,
                msg: "tls is enabled but key/cert file paths are incomplete"
            );
        }
        if self.limit && (self.limit_count == 0 && self.limit_interval_microsecond == 0) {
            return err_at!(
                RateLimitConfigInvalid,
                msg: "rate limiting is enabled but neither limit_count nor limit_interval_microsecond is set"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
