use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_external_url")]
    pub external_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    #[serde(default)]
    pub data_cache: DataCacheConfig,
    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,
    #[serde(default)]
    pub cache_url: Option<Url>,
    #[serde(default)]
    pub host_cookie: HostCookieConfig,
    #[serde(default)]
    pub recaptcha_secret: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            external_url: default_external_url(),
            host: default_host(),
            port: default_port(),
            admin_port: default_admin_port(),
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            data_cache: DataCacheConfig::default(),
            adapters: HashMap::new(),
            cache_url: None,
            host_cookie: HostCookieConfig::default(),
            recaptcha_secret: String::new(),
            static_dir: default_static_dir(),
        }
    }
}

/// Backing store for account settings, selected at startup.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataCacheConfig {
    Dummy,
    #[serde(rename = "filecache")]
    File { filename: PathBuf },
    Postgres {
        host: String,
        database: String,
        username: String,
        password: String,
        #[serde(default = "default_cache_size")]
        cache_size: u64,
        #[serde(default = "default_cache_ttl_seconds")]
        ttl_seconds: u64,
    },
}

impl Default for DataCacheConfig {
    fn default() -> Self {
        DataCacheConfig::Dummy
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AdapterConfig {
    pub endpoint: String,
    #[serde(default)]
    pub usersync_url: String,
    /// Cookie family the adapter syncs under; defaults to the bidder code.
    #[serde(default)]
    pub family: Option<String>,
    /// When set, users without a live sync are not worth an outbound call.
    #[serde(default)]
    pub skip_no_cookies: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HostCookieConfig {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub family: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub opt_out_url: String,
    #[serde(default)]
    pub opt_in_url: String,
}

impl Default for HostCookieConfig {
    fn default() -> Self {
        HostCookieConfig {
            domain: String::new(),
            family: String::new(),
            cookie_name: default_cookie_name(),
            opt_out_url: String::new(),
            opt_in_url: String::new(),
        }
    }
}

fn default_external_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_admin_port() -> u16 {
    6060
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_max_timeout_ms() -> u64 {
    2000
}

fn default_cache_size() -> u64 {
    10_000
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_cookie_name() -> String {
    "uids".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.admin_port, 6060);
        assert_eq!(config.default_timeout_ms, 250);
        assert_eq!(config.data_cache, DataCacheConfig::Dummy);
        assert_eq!(config.host_cookie.cookie_name, "uids");
    }

    #[test]
    fn adapters_and_data_cache_parse() {
        let yaml = r#"
            port: 9000
            data_cache:
                type: filecache
                filename: /etc/config/accounts.yaml
            adapters:
                appnexus:
                    endpoint: http://ib.adnxs.com/openrtb2
                    usersync_url: https://ib.adnxs.com/getuid
                    family: adnxs
                audienceNetwork:
                    endpoint: https://an.facebook.com/placementbid.ortb
                    skip_no_cookies: true
            "#;
        let config: Config = serde_yaml::from_str(yaml).expect("parse config");
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.data_cache,
            DataCacheConfig::File {
                filename: PathBuf::from("/etc/config/accounts.yaml"),
            }
        );
        assert_eq!(config.adapters.len(), 2);
        assert_eq!(
            config.adapters["appnexus"].family.as_deref(),
            Some("adnxs")
        );
        assert!(config.adapters["audienceNetwork"].skip_no_cookies);
        assert!(!config.adapters["appnexus"].skip_no_cookies);
    }

    #[test]
    fn postgres_data_cache_parses() {
        let yaml = r#"
            data_cache:
                type: postgres
                host: db.internal
                database: accounts
                username: pbs
                password: hunter2
            "#;
        let config: Config = serde_yaml::from_str(yaml).expect("parse config");
        match config.data_cache {
            DataCacheConfig::Postgres {
                host,
                cache_size,
                ttl_seconds,
                ..
            } => {
                assert_eq!(host, "db.internal");
                assert_eq!(cache_size, 10_000);
                assert_eq!(ttl_seconds, 3600);
            }
            other => panic!("expected postgres config, got {other:?}"),
        }
    }
}
