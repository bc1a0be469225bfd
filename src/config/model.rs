//! Configuration data model.
//!
//! All structs derive `Deserialize` for the TOML config file.
//! Every field has a default, so an empty file (or none at all) plus a
//! server name on the command line is a working setup.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use super::nickname::default_nickname;

/// Root application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub filesystem: FilesystemConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("No server given: pass -s <host> or set [server] host in the config file");
        }
        if self.server.nickname.trim().is_empty() {
            bail!("Nickname must not be empty");
        }
        Ok(())
    }
}

/// The one upstream IRC server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,
    /// Defaults to 6697 with TLS, 6667 without.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Defaults to the nickname.
    #[serde(default)]
    pub realname: Option<String>,
    /// Name of the environment variable holding the server password.
    #[serde(default)]
    pub password_env: Option<String>,
    /// Channels opened at start-up and joined once registered.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            tls: false,
            accept_invalid_certs: false,
            nickname: default_nickname(),
            realname: None,
            password_env: None,
            channels: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.tls { 6697 } else { 6667 })
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }

    /// Read the server password from the configured environment variable.
    pub fn password(&self) -> Result<Option<String>> {
        let Some(var) = &self.password_env else {
            return Ok(None);
        };
        let password = std::env::var(var)
            .with_context(|| format!("Password variable {} is not set", var))?;
        Ok(Some(password))
    }
}

/// Where the directory tree lives.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
        }
    }
}

impl FilesystemConfig {
    /// `<root_dir>/<host>`, with a leading `~` expanded.
    pub fn server_root(&self, host: &str) -> PathBuf {
        let root = match self.root_dir.strip_prefix('~') {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches('/')),
                None => PathBuf::from(&self.root_dir),
            },
            None => PathBuf::from(&self.root_dir),
        };
        root.join(host)
    }
}

/// Runtime behavior: keepalive, quit message, reconnection.
#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_quit_message")]
    pub quit_message: Option<String>,
    #[serde(default)]
    pub reconnect: bool,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            quit_message: default_quit_message(),
            reconnect: false,
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

fn default_root_dir() -> String {
    "~/irc".to_string()
}
fn default_keepalive_secs() -> u64 {
    60
}
fn default_quit_message() -> Option<String> {
    Some("fifoirc".to_string())
}
fn default_reconnect_delay() -> u64 {
    10
}
