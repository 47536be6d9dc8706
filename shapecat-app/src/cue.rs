use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use rand::Rng;
use shapecat_experiment::{ExperimentError, NoiseCue, SilentCue};
use tracing::{debug, info, warn};

use crate::config::AudioConfig;

const SAMPLE_RATE: u32 = 44_100;
const NOISE_SECONDS: f32 = 0.5;

/// Plays the cue file through an external player process.
///
/// Each play spawns a new child and returns immediately; finished children
/// are reaped on the next play.
#[derive(Debug)]
pub struct PlayerCue {
    command: Vec<String>,
    file: PathBuf,
    device: Option<String>,
    children: Vec<Child>,
}

impl PlayerCue {
    /// # Errors
    ///
    /// Returns an error if the command is empty or the file does not exist.
    pub fn new(
        command: Vec<String>,
        file: PathBuf,
        device: Option<String>,
    ) -> shapecat_experiment::Result<Self> {
        if command.is_empty() {
            return Err(ExperimentError::cue("player command is empty"));
        }
        if !file.is_file() {
            return Err(ExperimentError::cue(format!(
                "noise file {} not found",
                file.display()
            )));
        }
        Ok(Self {
            command,
            file,
            device,
            children: Vec::new(),
        })
    }

    fn argv(&self, volume: f32) -> Vec<String> {
        let volume = volume.clamp(0.0, 1.0);
        let file = self.file.display().to_string();
        let pa = ((volume * 65536.0).round() as u32).to_string();
        let device = self.device.as_deref();
        self.command
            .iter()
            .filter(|arg| device.is_some() || !arg.contains("{device}"))
            .map(|arg| {
                arg.replace("{file}", &file)
                    .replace("{volume_pa}", &pa)
                    .replace("{volume}", &format!("{volume:.2}"))
                    .replace("{device}", device.unwrap_or_default())
            })
            .collect()
    }

    fn reap(&mut self) {
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl NoiseCue for PlayerCue {
    fn play(&mut self, volume: f32) -> shapecat_experiment::Result<()> {
        self.reap();
        let argv = self.argv(volume);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExperimentError::cue("player command is empty"))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExperimentError::cue(format!("failed to start {program}: {e}")))?;
        debug!(
            program = %program,
            volume,
            pid = child.id(),
            running = self.children.len(),
            "noise cue started"
        );
        self.children.push(child);
        Ok(())
    }
}

impl Drop for PlayerCue {
    fn drop(&mut self) {
        for child in &mut self.children {
            let _ = child.wait();
        }
    }
}

/// Writes mono 16-bit PCM white noise, uniform in [-1, 1]
pub fn write_white_noise(path: &Path, seconds: f32, rng: &mut impl Rng) -> io::Result<()> {
    let samples = (SAMPLE_RATE as f32 * seconds) as u32;
    let data_len = samples * 2;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..samples {
        let s = (rng.random_range(-1.0f32..=1.0) * i16::MAX as f32) as i16;
        wav.extend_from_slice(&s.to_le_bytes());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, wav)
}

/// Picks the cue for this run, falling back to a silent one when audio is
/// disabled or unavailable.
pub fn build_cue(config: &AudioConfig, rng: &mut impl Rng) -> Box<dyn NoiseCue> {
    if !config.enabled {
        info!("audio disabled, noise cue is silent");
        return Box::new(SilentCue::default());
    }

    if !config.noise_file.exists() && config.generate_missing {
        match write_white_noise(&config.noise_file, NOISE_SECONDS, rng) {
            Ok(()) => info!(path = %config.noise_file.display(), "generated white noise file"),
            Err(e) => warn!(error = %e, path = %config.noise_file.display(), "cannot write noise file"),
        }
    }

    match PlayerCue::new(
        config.player.clone(),
        config.noise_file.clone(),
        config.device.clone(),
    ) {
        Ok(cue) => {
            info!(device = config.device.as_deref().unwrap_or("default"), "noise cue ready");
            Box::new(cue)
        }
        Err(e) => {
            warn!(error = %e, "noise cue disabled");
            Box::new(SilentCue::default())
        }
    }
}
