use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub full_sync: FullSyncConfig,
    #[serde(default)]
    pub share_sync: ShareSyncConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the redirect endpoint binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL written into pointer files. Media players resolve
    /// against this, so it must be reachable from them.
    pub public_url: String,
    /// Shared secret required as `apikey` on every redirect request.
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// The account's session cookie string (`UID=...; CID=...; SEID=...`).
    pub cookies: String,
    /// Default User-Agent for API calls. Download-info calls override
    /// this with the requesting player's UA.
    #[serde(default)]
    pub user_agent: String,
    /// App variant for download-info calls (`android`, `chrome`, ...).
    #[serde(default = "default_app")]
    pub app: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullSyncConfig {
    /// One `localRoot#remoteRoot` pair per line.
    #[serde(default)]
    pub paths: String,
    /// Comma-separated media-extension allow-list.
    #[serde(default = "default_media_exts")]
    pub media_exts: String,
    /// Delete pointer files no longer backed by a remote file.
    #[serde(default)]
    pub remove_orphans: bool,
}

impl Default for FullSyncConfig {
    fn default() -> Self {
        Self {
            paths: String::new(),
            media_exts: default_media_exts(),
            remove_orphans: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareSyncConfig {
    /// Full share link; parsed into share_code/receive_code when set.
    #[serde(default)]
    pub share_link: String,
    #[serde(default)]
    pub share_code: String,
    #[serde(default)]
    pub receive_code: String,
    /// Share-internal directory id to start from (0 = share root).
    #[serde(default)]
    pub root_id: u64,
    /// Only mirror share files under this share-internal prefix.
    #[serde(default = "default_share_prefix")]
    pub pan_path: String,
    #[serde(default)]
    pub local_path: String,
}

impl Default for ShareSyncConfig {
    fn default() -> Self {
        Self {
            share_link: String::new(),
            share_code: String::new(),
            receive_code: String::new(),
            root_id: 0,
            pan_path: default_share_prefix(),
            local_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// One `localRoot#remoteRoot` pair per line, like full_sync.paths.
    #[serde(default)]
    pub paths: String,
    /// Pause between activity-feed polls.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_id_cache_capacity")]
    pub id_cache_capacity: usize,
    #[serde(default = "default_id_cache_ttl")]
    pub id_cache_ttl_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: String::new(),
            cooldown_secs: default_cooldown(),
            id_cache_capacity: default_id_cache_capacity(),
            id_cache_ttl_secs: default_id_cache_ttl(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3015".into()
}
fn default_app() -> String {
    "android".into()
}
fn default_media_exts() -> String {
    "mp4,mkv,ts,iso,rmvb,avi,mov,mpeg,mpg,wmv,3gp,asf,m4v,flv,m2ts,tp,f4v".into()
}
fn default_share_prefix() -> String {
    "/".into()
}
fn default_cooldown() -> u64 {
    10
}
fn default_id_cache_capacity() -> usize {
    1024
}
fn default_id_cache_ttl() -> u64 {
    600
}

pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("p115strmd").join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    let content = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\
             Create it with your account cookies and server settings.\n\
             See config/p115strmd.example.toml for an example.",
            path.display()
        )
    })?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if config.auth.cookies.is_empty() {
        anyhow::bail!("auth.cookies must not be empty");
    }
    if config.server.public_url.is_empty() {
        anyhow::bail!("server.public_url must not be empty");
    }
    if config.server.api_token.is_empty() {
        anyhow::bail!("server.api_token must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"
            [server]
            public_url = "http://mp.local:3000"
            api_token = "k"

            [auth]
            cookies = "UID=1; CID=2; SEID=3"
        "#
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg: Config = toml::from_str(minimal()).unwrap();
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:3015");
        assert_eq!(cfg.auth.app, "android");
        assert!(cfg.full_sync.media_exts.contains("mkv"));
        assert_eq!(cfg.monitor.cooldown_secs, 10);
        assert!(!cfg.monitor.enabled);
    }

    #[test]
    fn test_missing_credential_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [server]
                public_url = "http://mp.local:3000"
                api_token = "k"

                [auth]
                cookies = ""
            "#,
        )
        .unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("auth.cookies"));
    }
}
