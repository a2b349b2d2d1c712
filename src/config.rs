//! Configuration for zenfarm.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ZENFARM_HOME, ZENFARM_CAPTCHA_KEY)
//! 2. Config file (.zenfarm/config.yaml)
//! 3. Defaults (~/.zenfarm, testnet endpoints, testnet dependency table)
//!
//! Config file discovery searches the current directory and its parents for
//! .zenfarm/config.yaml. The engine section, dependency table and endpoints
//! are all static for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{DependencySpec, SchedulerConfig};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub engine: Option<SchedulerConfig>,
    #[serde(default)]
    pub dependencies: Option<DependencySpec>,
    #[serde(default)]
    pub endpoints: Option<EndpointsFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointsFile {
    pub waitlist_url: Option<String>,
    pub waitlist_page_url: Option<String>,
    pub waitlist_site_key: Option<String>,
    pub faucet_url: Option<String>,
    pub faucet_page_url: Option<String>,
    pub faucet_site_key: Option<String>,
    pub stake_url: Option<String>,
    pub captcha_service_url: Option<String>,
    pub captcha_api_key: Option<String>,
}

/// Remote endpoints and captcha credentials used by the handlers.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub waitlist_url: String,
    pub waitlist_page_url: String,
    pub waitlist_site_key: String,
    pub faucet_url: String,
    pub faucet_page_url: String,
    pub faucet_site_key: String,
    pub stake_url: String,
    pub captcha_service_url: String,
    pub captcha_api_key: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            waitlist_url: "https://www.zenchain.io/api/waitlist".to_string(),
            waitlist_page_url: "https://www.zenchain.io/waitlist".to_string(),
            waitlist_site_key: String::new(),
            faucet_url: "https://faucet.zenchain.io/api".to_string(),
            faucet_page_url: "https://faucet.zenchain.io/".to_string(),
            faucet_site_key: String::new(),
            stake_url: "https://zenchain-testnet.api.onfinality.io/public".to_string(),
            captcha_service_url: "https://2captcha.com".to_string(),
            captcha_api_key: String::new(),
        }
    }
}

impl Endpoints {
    fn from_file(file: EndpointsFile) -> Self {
        let defaults = Self::default();
        Self {
            waitlist_url: file.waitlist_url.unwrap_or(defaults.waitlist_url),
            waitlist_page_url: file.waitlist_page_url.unwrap_or(defaults.waitlist_page_url),
            waitlist_site_key: file.waitlist_site_key.unwrap_or(defaults.waitlist_site_key),
            faucet_url: file.faucet_url.unwrap_or(defaults.faucet_url),
            faucet_page_url: file.faucet_page_url.unwrap_or(defaults.faucet_page_url),
            faucet_site_key: file.faucet_site_key.unwrap_or(defaults.faucet_site_key),
            stake_url: file.stake_url.unwrap_or(defaults.stake_url),
            captcha_service_url: file
                .captcha_service_url
                .unwrap_or(defaults.captcha_service_url),
            captcha_api_key: file.captcha_api_key.unwrap_or(defaults.captcha_api_key),
        }
    }
}

/// Resolved configuration with absolute paths and all defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to zenfarm home (database lives here)
    pub home: PathBuf,
    /// Scheduler timing and concurrency knobs
    pub engine: SchedulerConfig,
    /// Dependency table (kind -> required kinds + optional max-age)
    pub dependencies: DependencySpec,
    /// Remote endpoints and captcha credentials
    pub endpoints: Endpoints,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Path of the SQLite database under home.
    pub fn db_path(&self) -> PathBuf {
        self.home.join("zenfarm.db")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".zenfarm").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".zenfarm");

    let config_file = find_config_file();

    let (home, engine, dependencies, mut endpoints) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base for a relative home entry is the .zenfarm/ directory itself
        let base_dir = config_path.parent().unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("ZENFARM_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.home {
            let path = PathBuf::from(home_path);
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        } else {
            default_home
        };

        (
            home,
            config.engine.unwrap_or_default(),
            config.dependencies.unwrap_or_else(DependencySpec::testnet),
            config.endpoints.map(Endpoints::from_file).unwrap_or_default(),
        )
    } else {
        let home = std::env::var("ZENFARM_HOME")
            .map(PathBuf::from)
            .unwrap_or(default_home);

        (
            home,
            SchedulerConfig::default(),
            DependencySpec::testnet(),
            Endpoints::default(),
        )
    };

    if let Ok(key) = std::env::var("ZENFARM_CAPTCHA_KEY") {
        endpoints.captcha_api_key = key;
    }

    Ok(ResolvedConfig {
        home,
        engine,
        dependencies,
        endpoints,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActionKind;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let zenfarm_dir = temp.path().join(".zenfarm");
        std::fs::create_dir_all(&zenfarm_dir).unwrap();

        let config_path = zenfarm_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
home: ./
engine:
  max_concurrent_tasks: 5
  start_jitter_secs_per_slot: 2
  execution_delay_secs: [0, 1]
dependencies:
  faucet:
    - kind: waitlist
  stake:
    - kind: waitlist
    - kind: faucet
      max_age_hours: 23
endpoints:
  faucet_url: https://faucet.example/api
  captcha_api_key: test-key
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");

        let engine = config.engine.unwrap();
        assert_eq!(engine.max_concurrent_tasks, 5);
        assert_eq!(engine.execution_delay_secs, [0, 1]);

        let deps = config.dependencies.unwrap();
        assert_eq!(deps.rules_for(ActionKind::Stake).len(), 2);
        assert_eq!(
            deps.rules_for(ActionKind::Stake)[1].max_age_hours,
            Some(23)
        );

        let endpoints = Endpoints::from_file(config.endpoints.unwrap());
        assert_eq!(endpoints.faucet_url, "https://faucet.example/api");
        assert_eq!(endpoints.captcha_api_key, "test-key");
        // Unset entries fall back to defaults
        assert_eq!(
            endpoints.waitlist_url,
            "https://www.zenchain.io/api/waitlist"
        );
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = Endpoints::default();
        assert!(endpoints.faucet_url.starts_with("https://faucet."));
        assert!(endpoints.captcha_api_key.is_empty());
    }

    #[test]
    fn test_db_path_under_home() {
        let config = ResolvedConfig {
            home: PathBuf::from("/srv/zenfarm"),
            engine: SchedulerConfig::default(),
            dependencies: DependencySpec::testnet(),
            endpoints: Endpoints::default(),
            config_file: None,
        };
        assert_eq!(config.db_path(), PathBuf::from("/srv/zenfarm/zenfarm.db"));
    }
}
