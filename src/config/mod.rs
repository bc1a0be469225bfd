pub mod model;
pub mod nickname;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub use model::AppConfig;

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fifoirc")
        .join("config.toml")
}

/// Load the config file. An explicit `path` must exist; the default
/// location is optional.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(p) if !p.exists() => bail!("Config file {} does not exist", p.display()),
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&tmp.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[server]\nhost = \"irc.oftc.net\"\nport = 6670\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.server.host, "irc.oftc.net");
        assert_eq!(cfg.server.port(), 6670);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[server\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
