use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use color_eyre::Result;
use dirs::config_dir;
use scanlog_remote::RemoteConfig;
use serde::{Deserialize, Serialize};

/// Which scan store to run against.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Pick by host: key-value on browser-style hosts, sqlite natively.
    #[default]
    Auto,
    KeyValue,
    Sqlite,
    Remote,
}

/// User-level configuration loaded from `~/.config/scanlog/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory holding local scan history.
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub backend: BackendKind,
    /// Seal the key-value blob with a keyring-held key.
    #[serde(default)]
    pub encrypt_at_rest: bool,
    /// Remote server settings, required by the remote backend.
    pub remote: Option<RemoteConfig>,
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("scanlog").join("config.toml"))
}

/// Write the config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.backend, BackendKind::Auto);
    }

    #[test]
    fn returns_default_when_blank() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/scanlog-data"
            backend = "remote"
            encrypt_at_rest = true
            [remote]
            base_url = "https://scans.example.com/api"
            token = "secret"
            timeout_secs = 30
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/scanlog-data")),
                backend: BackendKind::Remote,
                encrypt_at_rest: true,
                remote: Some(RemoteConfig {
                    base_url: "https://scans.example.com/api".into(),
                    token: Some("secret".into()),
                    timeout_secs: Some(30),
                }),
            }
        );
    }

    #[test]
    fn rejects_unknown_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "backend = \"indexeddb\"").expect("write");
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/scanlog-data")),
            backend: BackendKind::KeyValue,
            ..Config::default()
        };

        write_if_missing(&cfg, &path).expect("write should succeed");
        let second = write_if_missing(&Config::default(), &path).expect("second write ok");
        assert_eq!(second, path);

        let loaded = load_from_path(&path).expect("parse");
        assert_eq!(loaded, cfg, "existing file must not be clobbered");
    }
}
