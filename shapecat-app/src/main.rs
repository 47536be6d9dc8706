mod app;
mod cli;
mod config;
mod cue;
mod logging;

use anyhow::Result;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use shapecat_core::{BlockKind, SessionData};
use shapecat_experiment::{ExperimentStateMachine, SessionWriter};
use shapecat_timing::HighPrecisionTimer;
use tracing::info;

use app::App;
use cli::Cli;
use config::AppConfig;
use logging::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    let mut config = AppConfig::load_from(cli.config.clone())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let mut rng = match config.seed {
        Some(seed) => {
            info!(seed, "using fixed seed");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };

    let cue = cue::build_cue(&config.audio, &mut rng);
    let date = chrono::Local::now()
        .format(&config.output.date_format)
        .to_string();
    let session = SessionData::new(cli.participant_info(), &config.output.experiment_name, date);
    let writer = SessionWriter::new(&config.output.data_dir, config.output.formats.clone());
    info!(
        participant = %session.info.participant,
        file = %SessionWriter::file_stem(&session),
        dir = %writer.dir().display(),
        "session created"
    );

    let experiment = ExperimentStateMachine::new(
        config.task.clone(),
        HighPrecisionTimer::new(),
        rng,
        cue,
        session,
    )
    .with_writer(writer);

    let experiment = App::new(experiment, config.display.clone()).run()?;
    summarize(experiment.session(), experiment.was_aborted());
    for path in experiment.saved_paths() {
        info!(path = %path.display(), "data file");
    }

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(dir) = &cli.data_dir {
        config.output.data_dir = dir.clone();
    }
    if cli.no_audio {
        config.audio.enabled = false;
    }
    if cli.audio_device.is_some() {
        config.audio.device = cli.audio_device.clone();
    }
    if cli.windowed {
        config.display.fullscreen = false;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
}

fn summarize(session: &SessionData, aborted: bool) {
    for kind in [BlockKind::Training, BlockKind::Testing] {
        let trials = session.trials_in(kind).count();
        if trials == 0 {
            continue;
        }
        info!(
            phase = kind.as_str(),
            trials,
            accuracy = session.accuracy(kind),
            mean_rt_ms = session.mean_rt_ms(kind),
            "summary"
        );
    }
    if aborted {
        info!("session ended early by the participant");
    } else {
        info!("experiment completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "shapecat", "-p", "p01", "--no-audio", "-w", "-d", "out", "--seed", "5",
            "--audio-device", "hw:1",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &cli);
        assert!(!config.audio.enabled);
        assert!(!config.display.fullscreen);
        assert_eq!(config.output.data_dir, std::path::PathBuf::from("out"));
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.audio.device.as_deref(), Some("hw:1"));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let cli = Cli::try_parse_from(["shapecat", "-p", "p01"]).unwrap();
        let mut config = AppConfig {
            seed: Some(9),
            ..Default::default()
        };
        apply_overrides(&mut config, &cli);
        assert_eq!(config.seed, Some(9));
        assert!(config.audio.enabled);
        assert!(config.display.fullscreen);
    }
}
