use crate::error::Result;

/// Plays the white-noise cue on noise trials and on the volume screen
pub trait NoiseCue: Send {
    fn play(&mut self, volume: f32) -> Result<()>;
}

/// A cue that only counts how often it was asked to play
#[derive(Debug, Default)]
pub struct SilentCue {
    pub plays: Vec<f32>,
}

impl NoiseCue for SilentCue {
    fn play(&mut self, volume: f32) -> Result<()> {
        tracing::debug!(volume, "noise cue (silent)");
        self.plays.push(volume);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_cue_records_volume() {
        let mut cue = SilentCue::default();
        cue.play(0.25).unwrap();
        cue.play(0.5).unwrap();
        assert_eq!(cue.plays, vec![0.25, 0.5]);
    }
}
