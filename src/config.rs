//! Configuration record consumed by the server core. CLI flag parsing lives
//! outside this crate; this module only defines the typed record those flags
//! populate and an optional YAML loader used by tests and local runs.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

fn default_port() -> u16 {
    9006
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    60_000
}
fn default_sql_pool_size() -> usize {
    12
}
fn default_worker_threads() -> usize {
    6
}
fn default_log_level() -> u8 {
    1
}
fn default_trig_mode() -> u8 {
    3
}
fn default_log_queue_capacity() -> usize {
    1024
}
fn default_src_dir() -> String {
    "./resources".to_string()
}
fn default_upload_dir() -> String {
    "./resources/upload".to_string()
}
fn default_log_dir() -> String {
    "./log".to_string()
}
fn default_sql_port() -> u16 {
    3306
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub log_enabled: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub linger: bool,
    #[serde(default = "default_sql_pool_size")]
    pub sql_pool_size: usize,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_log_level")]
    pub log_level: u8,
    #[serde(default)]
    pub reactor_mode: u8,
    #[serde(default)]
    pub daemonize: bool,
    #[serde(default = "default_trig_mode")]
    pub trig_mode: u8,
    pub sql_user: String,
    pub sql_password: String,
    pub sql_db: String,
    #[serde(default = "default_sql_port")]
    pub sql_port: u16,
    #[serde(default = "default_log_queue_capacity")]
    pub log_queue_capacity: usize,
    #[serde(default = "default_src_dir")]
    pub src_dir: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            log_enabled: default_true(),
            timeout_ms: default_timeout_ms(),
            linger: false,
            sql_pool_size: default_sql_pool_size(),
            worker_threads: default_worker_threads(),
            log_level: default_log_level(),
            reactor_mode: 0,
            daemonize: false,
            trig_mode: default_trig_mode(),
            sql_user: String::new(),
            sql_password: String::new(),
            sql_db: String::new(),
            sql_port: default_sql_port(),
            log_queue_capacity: default_log_queue_capacity(),
            src_dir: default_src_dir(),
            upload_dir: default_upload_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ServerConfig {
    pub fn from_str(contents: &str) -> Result<ServerConfig> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<ServerConfig> {
        let contents = fs::read_to_string(path)?;
        ServerConfig::from_str(&contents)
    }

    /// `listen-trigger` uses bit 1 (`trig_mode & 0b10`), `conn-trigger` bit 0
    /// (`trig_mode & 0b01`), matching the four combinations SPEC_FULL.md §4.F
    /// describes.
    pub fn listen_et(&self) -> bool {
        self.trig_mode & 0b10 != 0
    }

    pub fn conn_et(&self) -> bool {
        self.trig_mode & 0b01 != 0
    }
}
