//! Command-line interface for the `shapecat` binary.

use std::path::PathBuf;

use clap::Parser;
use shapecat_core::ParticipantInfo;

use crate::logging::Verbosity;

/// shapecat - square/circle categorization task
///
/// Runs the consent and instruction screens, adaptive training blocks, a
/// volume check and the noisy testing block, then saves the trial data.
#[derive(Debug, Parser)]
#[command(name = "shapecat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Participant identifier, used to name the data files
    #[arg(short, long, value_parser = parse_participant)]
    pub participant: String,

    /// Session label
    #[arg(short, long, default_value = "001")]
    pub session: String,

    #[arg(long)]
    pub gender: Option<String>,

    #[arg(long)]
    pub age: Option<String>,

    /// Path to custom configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for the session files
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Never play the noise cue
    #[arg(long)]
    pub no_audio: bool,

    /// Audio output device passed to the player's `{device}` argument
    #[arg(long, value_name = "NAME")]
    pub audio_device: Option<String>,

    /// Run in a window instead of fullscreen
    #[arg(short, long)]
    pub windowed: bool,

    /// Seed for stimulus and noise selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_participant(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Err("participant identifier must not be empty".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }

    #[must_use]
    pub fn participant_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant: self.participant.clone(),
            session: self.session.clone(),
            gender: self.gender.clone(),
            age: self.age.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("shapecat").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "shapecat");
        Cli::command().debug_assert();
    }

    #[test]
    fn test_participant_required() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--participant", "   "]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-p", " p07 "]).unwrap();
        assert_eq!(cli.participant, "p07");
        assert_eq!(cli.session, "001");
        assert!(!cli.no_audio);
        assert!(!cli.windowed);
        assert_eq!(cli.verbosity(), Verbosity::Normal);
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["-p", "a", "-v"]).unwrap().verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["-p", "a", "-vv"]).unwrap().verbosity(), Verbosity::Trace);
        assert_eq!(parse(&["-p", "a", "-q", "-v"]).unwrap().verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_participant_info() {
        let cli = parse(&["-p", "p01", "-s", "002", "--gender", "f", "--age", "24"]).unwrap();
        let info = cli.participant_info();
        assert_eq!(info.participant, "p01");
        assert_eq!(info.session, "002");
        assert_eq!(info.gender.as_deref(), Some("f"));
        assert_eq!(info.age.as_deref(), Some("24"));
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "-p", "p01", "--no-audio", "-w", "-d", "/tmp/out", "--seed", "42", "--audio-device",
            "hw:1",
        ])
        .unwrap();
        assert_eq!(cli.audio_device.as_deref(), Some("hw:1"));
        assert!(cli.no_audio);
        assert!(cli.windowed);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(cli.seed, Some(42));
    }
}
