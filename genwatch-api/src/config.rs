use crate::watch::WatchSettings;
use crate::{Error, Result};

use debug_stub_derive::DebugStub;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize)]
struct RawConfig {
    listen_addr: String,
    listen_port: u16,
    #[serde(default)]
    cors_origin: Option<String>,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    #[serde(default = "default_prompt_file")]
    prompt_file: PathBuf,
    #[serde(default = "default_selected_captions_file")]
    selected_captions_file: PathBuf,
    #[serde(default = "default_history_dir")]
    history_dir: PathBuf,
    #[serde(default = "default_num_images")]
    num_images: usize,
    #[serde(default)]
    watch: WatchConfig,
    generator: GeneratorConfig,
    #[serde(default)]
    diversify: DiversifyConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_images")
}
fn default_prompt_file() -> PathBuf {
    PathBuf::from("backend/prompt.txt")
}
fn default_selected_captions_file() -> PathBuf {
    PathBuf::from("backend/selected_images.txt")
}
fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}
fn default_num_images() -> usize {
    3
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_settle_delay_ms() -> u64 {
    150
}
fn default_stop_grace_period_ms() -> u64 {
    5000
}
fn default_max_listing_failures() -> usize {
    3
}
fn default_image_extensions() -> Vec<String> {
    vec!["png".into()]
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    /// Delay between the two listings of a settle check within one tick.
    pub settle_delay_ms: u64,
    #[serde(default = "default_stop_grace_period_ms")]
    pub stop_grace_period_ms: u64,
    #[serde(default = "default_max_listing_failures")]
    pub max_listing_failures: usize,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            stop_grace_period_ms: default_stop_grace_period_ms(),
            max_listing_failures: default_max_listing_failures(),
            image_extensions: default_image_extensions(),
        }
    }
}

impl From<&WatchConfig> for WatchSettings {
    fn from(config: &WatchConfig) -> Self {
        WatchSettings {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            stop_grace_period: Duration::from_millis(config.stop_grace_period_ms),
            max_listing_failures: config.max_listing_failures.max(1),
            image_extensions: config
                .image_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

/// How to launch the external generation process.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GeneratorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    /// Written to the prompt file to ask the process to finish. Empty
    /// truncates the file.
    pub stop_sentinel: String,
}

fn default_diversify_base_url() -> String {
    "https://app.wordware.ai".into()
}
fn default_diversify_version() -> String {
    "^2.6".into()
}
fn default_diversify_output_field() -> String {
    "diverse_variations".into()
}
fn default_diversify_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Deserialize, Serialize, DebugStub)]
pub struct DiversifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_diversify_base_url")]
    pub base_url: String,
    pub app_id: Option<String>,
    /// App used when the user has previously selected images.
    pub iterate_app_id: Option<String>,
    #[serde(default = "default_diversify_version")]
    pub version: String,
    #[serde(default = "default_diversify_output_field")]
    pub output_field: String,
    #[debug_stub = "ApiKey"]
    pub api_key: Option<String>,
    pub api_key_file: Option<PathBuf>,
    #[serde(default = "default_diversify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DiversifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_diversify_base_url(),
            app_id: None,
            iterate_app_id: None,
            version: default_diversify_version(),
            output_field: default_diversify_output_field(),
            api_key: None,
            api_key_file: None,
            timeout_secs: default_diversify_timeout_secs(),
        }
    }
}

impl DiversifyConfig {
    /// Resolves the API key from the environment, the inline value or the
    /// key file, in that order.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = env::var("GENWATCH_DIVERSIFY_API_KEY") {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.trim().to_string());
        }
        let path = self.api_key_file.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(key) if !key.trim().is_empty() => Some(key.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                log::error!("failed to read API key from {} - {e}", path.display());
                None
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: std::net::IpAddr,
    pub listen_port: u16,
    pub cors_origin: Option<String>,
    pub output_dir: PathBuf,
    pub prompt_file: PathBuf,
    pub selected_captions_file: PathBuf,
    pub history_dir: PathBuf,
    pub num_images: usize,
    pub watch: WatchConfig,
    pub generator: GeneratorConfig,
    pub diversify: DiversifyConfig,
}

impl Config {
    pub fn read(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(Error::ConfigReadFailed)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let config: RawConfig =
            serde_yaml::from_slice(data).map_err(Error::ConfigDeserializeFailed)?;

        let addr = env::var("GENWATCH_LISTEN_ADDR")
            .ok()
            .unwrap_or(config.listen_addr);
        let listen_addr = addr
            .parse::<std::net::IpAddr>()
            .map_err(|e| Error::InvalidIp(e.to_string()))?;

        let listen_port = env::var("GENWATCH_LISTEN_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(config.listen_port);

        let output_dir = env::var("GENWATCH_OUTPUT_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(config.output_dir);

        Ok(Self {
            listen_addr,
            listen_port,
            cors_origin: config.cors_origin,
            output_dir,
            prompt_file: config.prompt_file,
            selected_captions_file: config.selected_captions_file,
            history_dir: config.history_dir,
            num_images: config.num_images.max(1),
            watch: config.watch,
            generator: config.generator,
            diversify: config.diversify,
        })
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings::from(&self.watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config = Config::parse(
            br#"
listen_addr: 127.0.0.1
listen_port: 8001
generator:
  program: python
  args: ["backend/main.py"]
"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("generated_images"));
        assert_eq!(config.num_images, 3);
        assert!(!config.diversify.enabled);
        assert_eq!(config.generator.stop_sentinel, "");

        let settings = config.watch_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.max_listing_failures, 3);
        assert_eq!(settings.image_extensions, vec!["png".to_string()]);
    }

    #[test]
    fn watch_section_is_normalised() {
        let config = Config::parse(
            br#"
listen_addr: 0.0.0.0
listen_port: 9000
watch:
  poll_interval_ms: 500
  max_listing_failures: 0
  image_extensions: [".PNG", "webp"]
generator:
  program: sh
  env:
    CUDA_VISIBLE_DEVICES: "0,1"
"#,
        )
        .unwrap();

        let settings = config.watch_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.max_listing_failures, 1);
        assert_eq!(settings.image_extensions, vec!["png", "webp"]);
        assert_eq!(
            config.generator.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str),
            Some("0,1")
        );
    }

    #[test]
    fn zero_poll_interval_is_raised_to_one_millisecond() {
        let config = Config::parse(
            br#"
listen_addr: 127.0.0.1
listen_port: 8001
watch:
  poll_interval_ms: 0
generator:
  program: python
"#,
        )
        .unwrap();

        assert_eq!(
            config.watch_settings().poll_interval,
            Duration::from_millis(1)
        );
    }

    #[test]
    fn rejects_invalid_listen_address() {
        let result = Config::parse(
            br#"
listen_addr: not-an-ip
listen_port: 8001
generator:
  program: python
"#,
        );
        assert!(matches!(result, Err(Error::InvalidIp(_))));
    }

    #[test]
    fn api_key_is_hidden_from_debug_output() {
        let config = DiversifyConfig {
            api_key: Some("secret-token".into()),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
