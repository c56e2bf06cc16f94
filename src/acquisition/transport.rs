// Transport configuration shared by every strategy
//
// Built once and injected into the chain. TLS relaxation, proxy and
// user-agent are applied per child process (arguments + environment) or
// per HTTP client; nothing here touches process-wide state.

use std::ffi::OsString;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Desktop Chrome user-agent sent by default
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot read CA bundle {}: {source}", .path.display())]
    CaBundle {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid CA bundle: {0}")]
    Certificate(#[source] reqwest::Error),

    #[error("invalid proxy '{proxy}': {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Skip TLS certificate verification
    pub insecure_tls: bool,
    /// PEM bundle trusted in addition to the system roots
    pub ca_bundle: Option<PathBuf>,
    /// Proxy URL (http, https, socks5, socks5h)
    pub proxy: Option<String>,
    /// Bind outgoing connections to IPv4
    pub force_ipv4: bool,
    pub user_agent: String,
    pub socket_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            insecure_tls: true,
            ca_bundle: None,
            proxy: None,
            force_ipv4: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let insecure_tls = get("TUBESCRIBE_INSECURE_TLS")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.insecure_tls);
        let force_ipv4 = get("TUBESCRIBE_FORCE_IPV4")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.force_ipv4);
        let ca_bundle = get("SSL_CERT_FILE")
            .or_else(|| get("REQUESTS_CA_BUNDLE"))
            .map(PathBuf::from);
        let proxy = get("TUBESCRIBE_PROXY")
            .or_else(|| get("HTTPS_PROXY"))
            .or_else(|| get("https_proxy"))
            .or_else(|| get("ALL_PROXY"))
            .or_else(|| get("all_proxy"));
        let user_agent = get("TUBESCRIBE_USER_AGENT").unwrap_or(defaults.user_agent);
        let socket_timeout = get("TUBESCRIBE_SOCKET_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.socket_timeout);

        Self {
            insecure_tls,
            ca_bundle,
            proxy,
            force_ipv4,
            user_agent,
            socket_timeout,
        }
    }

    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_force_ipv4(mut self, force: bool) -> Self {
        self.force_ipv4 = force;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Network arguments understood by the yt-dlp binary
    pub fn ytdlp_network_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.insecure_tls {
            args.push("--no-check-certificate".to_string());
        }
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        args.push("--socket-timeout".to_string());
        args.push(self.socket_timeout.as_secs().max(1).to_string());
        args.push("--user-agent".to_string());
        args.push(self.user_agent.clone());
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    /// Environment for a spawned child process
    pub fn child_env(&self) -> Vec<(OsString, OsString)> {
        let mut env: Vec<(OsString, OsString)> = Vec::new();

        if self.insecure_tls {
            env.push(("PYTHONHTTPSVERIFY".into(), "0".into()));
        }
        if let Some(bundle) = &self.ca_bundle {
            env.push(("SSL_CERT_FILE".into(), bundle.clone().into_os_string()));
            env.push(("REQUESTS_CA_BUNDLE".into(), bundle.clone().into_os_string()));
        }
        if let Some(proxy) = &self.proxy {
            for key in ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"] {
                env.push((key.into(), proxy.into()));
            }
        }

        env
    }

    /// HTTP client honouring every transport setting
    pub fn http_client(&self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.socket_timeout)
            .connect_timeout(self.socket_timeout)
            .danger_accept_invalid_certs(self.insecure_tls);

        if let Some(bundle) = &self.ca_bundle {
            let pem = std::fs::read(bundle).map_err(|source| TransportError::CaBundle {
                path: bundle.clone(),
                source,
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(TransportError::Certificate)?;
            builder = builder.add_root_certificate(cert);
        }

        if self.force_ipv4 {
            builder = builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        }

        if let Some(proxy) = &self.proxy {
            let proxy_cfg =
                reqwest::Proxy::all(proxy.as_str()).map_err(|source| TransportError::Proxy {
                    proxy: proxy.clone(),
                    source,
                })?;
            builder = builder.proxy(proxy_cfg);
        }

        builder.build().map_err(TransportError::Client)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_relaxed() {
        let config = TransportConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TransportConfig::default());
        assert!(config.insecure_tls);
        assert!(config.force_ipv4);
        assert_eq!(config.socket_timeout, Duration::from_secs(60));
    }

    #[test]
    fn reads_overrides() {
        let config = TransportConfig::from_lookup(lookup(&[
            ("TUBESCRIBE_INSECURE_TLS", "false"),
            ("TUBESCRIBE_FORCE_IPV4", "0"),
            ("REQUESTS_CA_BUNDLE", "/etc/ssl/bundle.pem"),
            ("HTTPS_PROXY", "http://proxy:3128"),
            ("TUBESCRIBE_PROXY", "socks5h://127.0.0.1:1080"),
            ("TUBESCRIBE_SOCKET_TIMEOUT_SECS", "15"),
            ("TUBESCRIBE_USER_AGENT", "test-agent"),
        ]));

        assert!(!config.insecure_tls);
        assert!(!config.force_ipv4);
        assert_eq!(config.ca_bundle, Some(PathBuf::from("/etc/ssl/bundle.pem")));
        assert_eq!(config.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert_eq!(config.socket_timeout, Duration::from_secs(15));
        assert_eq!(config.user_agent, "test-agent");
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let config = TransportConfig::from_lookup(lookup(&[
            ("TUBESCRIBE_INSECURE_TLS", "maybe"),
            ("TUBESCRIBE_SOCKET_TIMEOUT_SECS", "soon"),
            ("HTTPS_PROXY", "   "),
        ]));
        assert!(config.insecure_tls);
        assert_eq!(config.socket_timeout, DEFAULT_SOCKET_TIMEOUT);
        assert_eq!(config.proxy, None);
    }

    #[test]
    fn ytdlp_args_follow_config() {
        let args = TransportConfig::default()
            .with_proxy("socks5://127.0.0.1:1080")
            .with_socket_timeout(Duration::from_secs(20))
            .ytdlp_network_args();

        assert!(args.contains(&"--no-check-certificate".to_string()));
        assert!(args.contains(&"--force-ipv4".to_string()));
        let idx = args.iter().position(|a| a == "--proxy").unwrap();
        assert_eq!(args[idx + 1], "socks5://127.0.0.1:1080");
        let idx = args.iter().position(|a| a == "--socket-timeout").unwrap();
        assert_eq!(args[idx + 1], "20");

        let strict = TransportConfig::default()
            .with_insecure_tls(false)
            .with_force_ipv4(false)
            .ytdlp_network_args();
        assert!(!strict.contains(&"--no-check-certificate".to_string()));
        assert!(!strict.contains(&"--force-ipv4".to_string()));
    }

    #[test]
    fn child_env_is_scoped_to_settings() {
        let env = TransportConfig::default()
            .with_insecure_tls(false)
            .child_env();
        assert!(env.is_empty());

        let env = TransportConfig::default()
            .with_ca_bundle("/tmp/ca.pem")
            .child_env();
        assert!(env.contains(&("PYTHONHTTPSVERIFY".into(), "0".into())));
        assert!(env.contains(&("SSL_CERT_FILE".into(), "/tmp/ca.pem".into())));
    }

    #[test]
    fn builds_http_client() {
        assert!(TransportConfig::default().http_client().is_ok());

        let missing = TransportConfig::default().with_ca_bundle("/definitely/missing.pem");
        assert!(matches!(
            missing.http_client(),
            Err(TransportError::CaBundle { .. })
        ));
    }
}
