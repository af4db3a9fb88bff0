//! Server configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, the TOML config
//! file, `VAULTKEEP_*` environment variables, then CLI flags (applied by the
//! binary).

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_SECRET: &str = "VAULTKEEP_SECRET";
pub const ENV_LOG_LEVEL: &str = "VAULTKEEP_LOG_LEVEL";
pub const ENV_DATABASE_PATH: &str = "VAULTKEEP_DATABASE_PATH";
pub const ENV_OBJECTS_DIR: &str = "VAULTKEEP_OBJECTS_DIR";
pub const ENV_GATEWAY_HOST: &str = "VAULTKEEP_GATEWAY_HOST";
pub const ENV_GATEWAY_PORT: &str = "VAULTKEEP_GATEWAY_PORT";
pub const ENV_ENABLE_HTTPS: &str = "VAULTKEEP_ENABLE_HTTPS";
pub const ENV_TLS_CERT: &str = "VAULTKEEP_TLS_CERT";
pub const ENV_TLS_KEY: &str = "VAULTKEEP_TLS_KEY";

const REDACTED: &str = "[redacted]";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "vaultkeep", "vaultkeep")
}

fn data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from(".vaultkeep"), |dirs| dirs.data_dir().to_path_buf())
}

/// `config.toml` in the platform config directory, if one can be resolved.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub tls: TlsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3200,
            tls: TlsConfig::default(),
        }
    }
}

/// `[gateway.tls]`: PEM certificate chain and private key for HTTPS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Certificate and key paths, present only when TLS is enabled.
    pub fn paths(&self) -> Option<(&Path, &Path)> {
        if !self.enabled {
            return None;
        }
        Some((self.cert_path.as_deref()?, self.key_path.as_deref()?))
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} is not a boolean: {raw}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for session tokens. Required.
    pub secret: String,
    /// Token lifetime (default: 3 hours).
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: crate::auth::TOKEN_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub objects_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = data_dir();
        Self {
            database_path: root.join("vault.db"),
            objects_dir: root.join("objects"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// File (explicit path, else the default location if present), then the
    /// process environment. Not validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `VAULTKEEP_*` overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(secret) = get(ENV_SECRET) {
            self.auth.secret = secret;
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(path) = get(ENV_DATABASE_PATH) {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(dir) = get(ENV_OBJECTS_DIR) {
            self.storage.objects_dir = PathBuf::from(dir);
        }
        if let Some(host) = get(ENV_GATEWAY_HOST) {
            self.gateway.host = host;
        }
        if let Some(port) = get(ENV_GATEWAY_PORT) {
            self.gateway.port = port
                .parse()
                .with_context(|| format!("{ENV_GATEWAY_PORT} is not a valid port: {port}"))?;
        }
        if let Some(enabled) = get(ENV_ENABLE_HTTPS) {
            self.gateway.tls.enabled = parse_bool(ENV_ENABLE_HTTPS, &enabled)?;
        }
        if let Some(cert) = get(ENV_TLS_CERT) {
            self.gateway.tls.cert_path = Some(PathBuf::from(cert));
        }
        if let Some(key) = get(ENV_TLS_KEY) {
            self.gateway.tls.key_path = Some(PathBuf::from(key));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.is_empty() {
            bail!("auth.secret is empty; set it in the config file or via {ENV_SECRET}");
        }
        if self.auth.token_ttl_secs == 0 {
            bail!("auth.token_ttl_secs must be greater than zero");
        }
        if self.gateway.port == 0 {
            bail!("gateway.port must be between 1 and 65535");
        }
        if self.gateway.host.trim().is_empty() {
            bail!("gateway.host is empty");
        }
        if self.gateway.tls.enabled && self.gateway.tls.paths().is_none() {
            bail!("gateway.tls is enabled but cert_path or key_path is missing");
        }
        Ok(())
    }

    /// Copy safe to print: the secret is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.auth.secret.is_empty() {
            copy.auth.secret = REDACTED.into();
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 3200);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.auth.token_ttl_secs, 10_800);
        assert_eq!(config.log_level, "info");
        assert!(config.storage.database_path.ends_with("vault.db"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [auth]
            secret = "from-file"

            [gateway]
            port = 4000
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.auth.secret, "from-file");
        assert_eq!(config.auth.token_ttl_secs, 10_800);
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.gateway.host, "127.0.0.1");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.auth.secret = "from-file".into();

        config
            .apply_overrides_from(env(&[
                (ENV_SECRET, "from-env"),
                (ENV_GATEWAY_PORT, "9000"),
                (ENV_OBJECTS_DIR, "/srv/objects"),
                (ENV_LOG_LEVEL, "  "),
            ]))
            .unwrap();

        assert_eq!(config.auth.secret, "from-env");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.storage.objects_dir, PathBuf::from("/srv/objects"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn tls_section_parses_and_validates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [auth]
            secret = "s3cret"

            [gateway.tls]
            enabled = true
            cert_path = "/etc/vaultkeep/cert.pem"
            "#
        )
        .unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        assert!(config.gateway.tls.enabled);
        assert_eq!(config.gateway.port, 3200);
        assert!(config.validate().is_err());

        config
            .apply_overrides_from(env(&[(ENV_TLS_KEY, "/etc/vaultkeep/key.pem")]))
            .unwrap();
        config.validate().unwrap();
        let (cert, key) = config.gateway.tls.paths().unwrap();
        assert_eq!(cert, Path::new("/etc/vaultkeep/cert.pem"));
        assert_eq!(key, Path::new("/etc/vaultkeep/key.pem"));
    }

    #[test]
    fn https_toggle_from_env() {
        let mut config = Config::default();
        assert!(!config.gateway.tls.enabled);
        assert!(config.gateway.tls.paths().is_none());

        config
            .apply_overrides_from(env(&[
                (ENV_ENABLE_HTTPS, "TRUE"),
                (ENV_TLS_CERT, "cert.pem"),
                (ENV_TLS_KEY, "key.pem"),
            ]))
            .unwrap();
        assert!(config.gateway.tls.paths().is_some());

        config
            .apply_overrides_from(env(&[(ENV_ENABLE_HTTPS, "0")]))
            .unwrap();
        assert!(config.gateway.tls.paths().is_none());

        assert!(config
            .apply_overrides_from(env(&[(ENV_ENABLE_HTTPS, "maybe")]))
            .is_err());
    }

    #[test]
    fn bad_port_in_env_is_an_error() {
        let mut config = Config::default();
        assert!(config
            .apply_overrides_from(env(&[(ENV_GATEWAY_PORT, "http")]))
            .is_err());
    }

    #[test]
    fn validate_requires_secret_and_port() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.auth.secret = "s3cret".into();
        assert!(config.validate().is_ok());

        config.gateway.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_hides_secret() {
        let mut config = Config::default();
        config.auth.secret = "s3cret".into();

        let printed = config.redacted().to_toml().unwrap();
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains(REDACTED));
    }

    #[test]
    fn malformed_file_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gateway = 12").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config file"));
    }
}
