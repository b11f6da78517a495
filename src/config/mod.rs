use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use toml::map::Entry;
use tracing::warn;

pub const LOCAL_CONFIG_FILE: &str = "audioctl_config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// Mixer device and the simple element whose level is controlled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_element")]
    pub element: String,
    #[serde(default)]
    pub element_index: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            element: default_element(),
            element_index: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Players are discovered by bus-name prefix
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,
    /// Bound on every player method call and property read
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Bound on connecting to the bus and listing names
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            service_prefix: default_service_prefix(),
            call_timeout_ms: default_call_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_element() -> String {
    "Master".to_string()
}

fn default_service_prefix() -> String {
    "org.mpris.MediaPlayer2".to_string()
}

fn default_call_timeout_ms() -> u64 {
    500
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
        let config = CONFIG.get_or_init(Config::init);
        f(config)
    }

    fn init() -> Self {
        // Lowest to highest priority
        let mut candidates: Vec<PathBuf> = Vec::new();
        candidates.extend(get_system_config_path());
        candidates.extend(get_user_config_path());
        candidates.push(PathBuf::from(LOCAL_CONFIG_FILE));

        let config = Self::load_from(&candidates);
        tracing::debug!("Config initialized: {:?}", config);
        config
    }

    /// Merge every readable file in `paths` over the defaults, later files
    /// winning. Unparsable files are skipped with a warning.
    pub fn load_from(paths: &[PathBuf]) -> Self {
        let mut merged = match toml::Value::try_from(Self::default()) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to serialize default config: {err}");
                return Self::default();
            }
        };

        let mut found_any_config = false;
        for path in paths {
            if let Some(value) = read_toml(path) {
                merge_value(&mut merged, value);
                found_any_config = true;
                tracing::debug!("Loaded config from {}", path.display());
            }
        }

        if !found_any_config {
            tracing::debug!("No configuration file found, using default config");
        }

        merged.try_into().unwrap_or_else(|err| {
            warn!("Falling back to default config due to invalid overrides: {err}");
            Self::default()
        })
    }
}

fn read_toml(path: &Path) -> Option<toml::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match content.parse::<toml::Value>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Failed to parse {}: {err}", path.display());
            None
        }
    }
}

fn merge_value(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base_map), toml::Value::Table(override_map)) => {
            for (key, override_value) in override_map {
                match base_map.entry(key) {
                    Entry::Occupied(mut entry) => merge_value(entry.get_mut(), override_value),
                    Entry::Vacant(entry) => {
                        entry.insert(override_value);
                    }
                }
            }
        }
        (base_value, override_value) => {
            *base_value = override_value;
        }
    }
}

fn get_system_config_path() -> Option<PathBuf> {
    let path = PathBuf::from("/etc/audioctl/config.toml");
    path.exists().then_some(path)
}

fn get_user_config_path() -> Option<PathBuf> {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config"))
        })?;

    let path = config_dir.join("audioctl").join("config.toml");
    path.exists().then_some(path)
}
