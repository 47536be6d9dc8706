//! Configuration loading for the `shapecat` binary.
//!
//! Sources, later ones overriding earlier:
//! 1. Defaults
//! 2. TOML file (`--config` or `<config_dir>/shapecat/config.toml`)
//! 3. Environment variables prefixed with `SHAPECAT_`, sections split on
//!    a double underscore (`SHAPECAT_TASK__TESTING_TRIALS=40`)

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use shapecat_experiment::{ExperimentConfig, ExperimentError, OutputFormat};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "shapecat";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub task: ExperimentConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
    pub display: DisplayConfig,
    /// Fixed RNG seed, drawn from the OS when unset
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub noise_file: PathBuf,
    /// Write a short white-noise WAV when `noise_file` does not exist
    pub generate_missing: bool,
    /// Output device name handed to the player, system default when unset
    pub device: Option<String>,
    /// Player command; `{file}`, `{volume}`, `{volume_pa}` and `{device}` are
    /// substituted. Arguments naming `{device}` are left out when no device is
    /// set, e.g. `["paplay", "--device={device}", "{file}"]`.
    pub player: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub experiment_name: String,
    pub formats: Vec<OutputFormat>,
    /// chrono format string for the date part of file names
    pub date_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub fullscreen: bool,
    /// Window size when not fullscreen
    pub width: u32,
    pub height: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            noise_file: PathBuf::from("white_noise.wav"),
            generate_missing: true,
            device: None,
            player: default_player(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            experiment_name: "Categorization_Task".to_string(),
            formats: vec![OutputFormat::Csv, OutputFormat::Json],
            date_format: "%Y-%m-%d_%H-%M-%S".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fullscreen: true,
            width: 1280,
            height: 720,
        }
    }
}

fn default_player() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["afplay", "-v", "{volume}", "{file}"]
    } else if cfg!(windows) {
        &[
            "powershell",
            "-NoProfile",
            "-Command",
            "(New-Object Media.SoundPlayer '{file}').PlaySync()",
        ]
    } else {
        &["paplay", "--volume={volume_pa}", "--device={device}", "{file}"]
    };
    argv.iter().map(|s| (*s).to_string()).collect()
}

impl AppConfig {
    /// Loads configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SHAPECAT_").split("__"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| anyhow!("failed to load configuration: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> std::result::Result<(), ExperimentError> {
        self.task.validate()?;

        if self.output.formats.is_empty() {
            return Err(ExperimentError::config(
                "output.formats must name at least one format",
            ));
        }
        if self.output.experiment_name.trim().is_empty() {
            return Err(ExperimentError::config(
                "output.experiment_name must not be empty",
            ));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(ExperimentError::config(format!(
                "display size {}x{} must be non-zero",
                self.display.width, self.display.height
            )));
        }
        if self.audio.enabled && self.audio.player.is_empty() {
            return Err(ExperimentError::config(
                "audio.player must not be empty when audio is enabled",
            ));
        }
        Ok(())
    }
}
