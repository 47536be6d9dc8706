use rand::Rng;
use shapecat_core::{
    Advance, BlockKind, BlockResult, Phase, ResponseKey, SessionData, Shape, TrialRecord,
    TrialState,
};
use shapecat_timing::Timer;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ExperimentConfig;
use crate::cue::NoiseCue;
use crate::output::SessionWriter;
use crate::trial::{Trial, TrialDurations, TrialTimestamps};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExperimentEvent {
    /// The key that leaves the current screen was pressed
    ScreenConfirmed,
    ResponseReceived(ResponseKey),
    ResponseTimeout,
    TrialComplete,
    BlockComplete,
    RetryElapsed,
    VolumeUp,
    VolumeDown,
    PlayCue,
    Abort,
}

/// Sequences screens, trials and blocks for one participant session
pub struct ExperimentStateMachine<P, T, R>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub phase: P,
    pub timer: T,
    pub rng: R,
    pub config: ExperimentConfig,
    cue: Box<dyn NoiseCue>,
    writer: Option<SessionWriter>,
    current: Option<Trial<u64>>,
    block_trials: Vec<TrialRecord>,
    training_blocks: u32,
    testing_blocks: u32,
    phase_started: u64,
    noise_volume: f32,
    session: SessionData,
    last_block: Option<BlockResult>,
    saved: Vec<PathBuf>,
    save_attempted: bool,
    aborted: bool,
    finished: bool,
}

impl<P, T, R> ExperimentStateMachine<P, T, R>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub fn new(
        config: ExperimentConfig,
        timer: T,
        rng: R,
        cue: Box<dyn NoiseCue>,
        mut session: SessionData,
    ) -> Self {
        let noise_volume = config.noise_volume;
        session.noise_volume = noise_volume;
        let phase_started = timer.now();
        Self {
            phase: P::default(),
            timer,
            rng,
            config,
            cue,
            writer: None,
            current: None,
            block_trials: Vec::new(),
            training_blocks: 0,
            testing_blocks: 0,
            phase_started,
            noise_volume,
            session,
            last_block: None,
            saved: Vec::new(),
            save_attempted: false,
            aborted: false,
            finished: false,
        }
    }

    pub fn with_writer(mut self, writer: SessionWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Moves to the next phase, returns false once the sequence is exhausted
    pub fn advance_phase(&mut self) -> bool {
        match self.phase.next() {
            Some(next) => {
                self.enter_phase(next);
                true
            }
            None => false,
        }
    }

    fn enter_phase(&mut self, phase: P) {
        info!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
        self.phase_started = self.timer.now();
        self.current = None;

        if self.phase.is_block() {
            self.start_block();
        } else if self.phase.is_complete() {
            self.session.completed = true;
            self.save();
        }
    }

    pub fn start_block(&mut self) {
        let Some(kind) = self.phase.block_kind() else {
            return;
        };
        let block = match kind {
            BlockKind::Training => {
                self.training_blocks += 1;
                self.training_blocks
            }
            BlockKind::Testing => {
                self.testing_blocks += 1;
                self.testing_blocks
            }
        };
        self.block_trials.clear();
        info!(phase = kind.as_str(), block, trials = self.target_trials(), "block started");
        self.start_trial();
    }

    pub fn start_trial(&mut self) {
        let Some(kind) = self.phase.block_kind() else {
            return;
        };
        let stimulus = self.generate_stimulus();
        // Noise is drawn after the stimulus and only for testing trials
        let with_noise =
            kind == BlockKind::Testing && self.rng.random_bool(self.config.noise_probability);
        let index = self.block_trials.len() as u32 + 1;
        let now = self.timer.now();

        debug!(
            phase = kind.as_str(),
            trial = index,
            stimulus = ?stimulus,
            with_noise,
            "trial started"
        );

        self.current = Some(Trial {
            kind,
            block: self.current_block_number(kind),
            index,
            stimulus,
            with_noise,
            durations: TrialDurations::from(&self.config),
            timestamps: TrialTimestamps {
                fixation_start: now,
                stimulus_onset: None,
                response: None,
                feedback_start: None,
            },
            response: None,
            state: TrialState::Fixation,
        });
    }

    /// Polls the clock and reports what became due since the last frame
    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        match self.phase.advance() {
            Advance::BlockEnd => {
                self.update_trial(&mut events);
                if self.current.is_none() && self.block_trials.len() >= self.target_trials() {
                    events.push(ExperimentEvent::BlockComplete);
                }
            }
            Advance::Timed => {
                if self.timer.elapsed(self.phase_started)
                    >= Duration::from_millis(self.config.training_failed_ms)
                {
                    events.push(ExperimentEvent::RetryElapsed);
                }
            }
            Advance::Key(_) | Advance::AnyKey => {}
        }

        events
    }

    fn update_trial(&mut self, events: &mut Vec<ExperimentEvent>) {
        let now = self.timer.now();
        let Some(trial) = &mut self.current else {
            return;
        };
        match trial.state {
            TrialState::Fixation => {
                let fixation_ns = trial.durations.fixation_ms * 1_000_000;
                if now.saturating_sub(trial.timestamps.fixation_start) >= fixation_ns {
                    // Onset is stamped once the frame showing the stimulus is presented
                    trial.state = TrialState::Response;
                    debug!("fixation over, stimulus queued for presentation");
                }
            }
            TrialState::Response => {
                if trial.window_elapsed(now) {
                    events.push(ExperimentEvent::ResponseTimeout);
                }
            }
            TrialState::Feedback => {
                let feedback_ns = trial.durations.feedback_ms * 1_000_000;
                if let Some(start) = trial.timestamps.feedback_start {
                    if now.saturating_sub(start) >= feedback_ns {
                        trial.state = TrialState::Complete;
                        events.push(ExperimentEvent::TrialComplete);
                    }
                }
            }
            TrialState::Complete => {}
        }
    }

    /// Stamps stimulus onset after the first frame showing it has been presented.
    ///
    /// Opens the response window and fires the noise cue on noisy trials.
    /// Returns false when no stimulus is waiting for presentation.
    pub fn mark_stimulus_presented(&mut self) -> bool {
        let now = self.timer.now();
        let Some(trial) = &mut self.current else {
            return false;
        };
        if trial.state != TrialState::Response || trial.timestamps.stimulus_onset.is_some() {
            return false;
        }
        trial.timestamps.stimulus_onset = Some(now);
        let with_noise = trial.with_noise;
        debug!(onset_ns = now, with_noise, "stimulus presented, response window open");
        if with_noise {
            self.play_cue();
        }
        true
    }

    /// Translates a key press into the events it causes in the current phase
    pub fn handle_key(&self, key: ResponseKey) -> Vec<ExperimentEvent> {
        if self.finished {
            return Vec::new();
        }
        if key == ResponseKey::Escape {
            return vec![ExperimentEvent::Abort];
        }

        if self.phase.is_volume_adjust() {
            match key {
                ResponseKey::Left => return vec![ExperimentEvent::VolumeDown],
                ResponseKey::Right => return vec![ExperimentEvent::VolumeUp],
                ResponseKey::P => return vec![ExperimentEvent::PlayCue],
                _ => {}
            }
        }

        match self.phase.advance() {
            Advance::Key(expected) if expected == key => vec![ExperimentEvent::ScreenConfirmed],
            Advance::AnyKey => vec![ExperimentEvent::ScreenConfirmed],
            Advance::BlockEnd if key.is_categorization() && self.response_window_open() => {
                vec![ExperimentEvent::ResponseReceived(key)]
            }
            _ => Vec::new(),
        }
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) -> bool {
        if self.finished {
            return false;
        }

        match event {
            ExperimentEvent::ScreenConfirmed => match self.phase.advance() {
                Advance::Key(_) | Advance::AnyKey => {
                    if self.phase.is_complete() {
                        self.finished = true;
                        return true;
                    }
                    if self.phase.is_volume_adjust() {
                        self.session.noise_volume = self.noise_volume;
                        info!(volume = self.noise_volume, "noise volume confirmed");
                    }
                    self.advance_phase()
                }
                _ => false,
            },
            ExperimentEvent::ResponseReceived(key) => self.record_response(Some(key)),
            ExperimentEvent::ResponseTimeout => self.record_response(None),
            ExperimentEvent::TrialComplete => {
                if self.current_trial_state() == Some(TrialState::Complete) {
                    self.complete_current_trial();
                    true
                } else {
                    false
                }
            }
            ExperimentEvent::BlockComplete => {
                if self.phase.is_block() && self.current.is_none() {
                    self.finish_block();
                    true
                } else {
                    false
                }
            }
            ExperimentEvent::RetryElapsed => {
                if self.phase.advance() == Advance::Timed {
                    self.advance_phase()
                } else {
                    false
                }
            }
            ExperimentEvent::VolumeUp => self.adjust_volume(self.config.volume_step),
            ExperimentEvent::VolumeDown => self.adjust_volume(-self.config.volume_step),
            ExperimentEvent::PlayCue => {
                if self.phase.is_volume_adjust() {
                    self.play_cue();
                    true
                } else {
                    false
                }
            }
            ExperimentEvent::Abort => {
                self.abort();
                true
            }
        }
    }

    /// Closes the response window with the given key, or with none on timeout
    pub fn record_response(&mut self, key: Option<ResponseKey>) -> bool {
        let now = self.timer.now();
        let Some(trial) = &mut self.current else {
            return false;
        };
        if trial.state != TrialState::Response || trial.timestamps.stimulus_onset.is_none() {
            return false;
        }

        // A key that arrives after the deadline but before the next frame is a miss
        let key = if key.is_some() && trial.window_elapsed(now) {
            debug!("key arrived after the response window closed");
            None
        } else {
            key
        };
        trial.response = key;
        if key.is_some() {
            trial.timestamps.response = Some(now);
        }
        trial.timestamps.feedback_start = Some(now);
        trial.state = TrialState::Feedback;

        match (key, trial.reaction_time_ns()) {
            (Some(k), Some(rt)) => debug!(
                key = k.name(),
                correct = trial.is_correct(),
                rt_ms = rt as f64 / 1_000_000.0,
                "response recorded"
            ),
            _ => debug!("no response within window"),
        }
        true
    }

    /// Stores the finished trial and starts the next one if the block has room
    fn complete_current_trial(&mut self) {
        if let Some(trial) = self.current.take() {
            self.block_trials.push(trial.to_record());
        }
        if self.block_trials.len() < self.target_trials() {
            self.start_trial();
        }
    }

    /// Scores the block and decides between retry and the next phase
    pub fn finish_block(&mut self) -> Option<BlockResult> {
        let kind = self.phase.block_kind()?;
        let trials = std::mem::take(&mut self.block_trials);
        let result = BlockResult::from_trials(kind, self.current_block_number(kind), trials);
        self.session.push_block(&result);

        info!(
            phase = kind.as_str(),
            block = result.block,
            accuracy = result.accuracy,
            correct = result.correct_count(),
            trials = result.trials.len(),
            "block complete"
        );

        let retry = self.phase.retry();
        self.last_block = Some(result.clone());
        match retry {
            Some(retry) if !result.passed(self.config.accuracy_threshold) => {
                warn!(
                    accuracy = result.accuracy,
                    threshold = self.config.accuracy_threshold,
                    "training accuracy below threshold, repeating block"
                );
                self.enter_phase(retry);
            }
            _ => {
                self.advance_phase();
            }
        }
        Some(result)
    }

    /// Ends the session immediately, saving what has been collected
    pub fn abort(&mut self) {
        if self.finished {
            return;
        }
        warn!(phase = ?self.phase, trials = self.session.trials.len(), "session aborted");
        // An answered trial is kept, one still waiting for its key is dropped
        if let Some(trial) = self.current.take() {
            if matches!(trial.state, TrialState::Feedback | TrialState::Complete) {
                self.block_trials.push(trial.to_record());
            }
        }
        self.aborted = true;
        self.session.completed = false;
        // Records from an unfinished block are still kept
        let partial = std::mem::take(&mut self.block_trials);
        self.session.trials.extend(partial);
        self.save();
        self.finished = true;
    }

    fn save(&mut self) {
        if self.save_attempted {
            return;
        }
        self.save_attempted = true;
        let Some(writer) = &self.writer else {
            return;
        };
        match writer.write(&self.session) {
            Ok(paths) => self.saved = paths,
            Err(e) => error!(error = %e, dir = %writer.dir().display(), "failed to save session"),
        }
    }

    fn adjust_volume(&mut self, delta: f32) -> bool {
        if !self.phase.is_volume_adjust() {
            return false;
        }
        self.noise_volume = (self.noise_volume + delta).clamp(0.0, 1.0);
        debug!(volume = self.noise_volume, "noise volume adjusted");
        true
    }

    fn play_cue(&mut self) {
        if let Err(e) = self.cue.play(self.noise_volume) {
            warn!(error = %e, "noise cue failed");
        }
    }

    fn generate_stimulus(&mut self) -> Shape {
        if self.rng.random_bool(0.5) {
            Shape::Square
        } else {
            Shape::Circle
        }
    }

    fn target_trials(&self) -> usize {
        self.config.block_size(self.phase.is_testing())
    }

    fn current_block_number(&self, kind: BlockKind) -> u32 {
        match kind {
            BlockKind::Training => self.training_blocks,
            BlockKind::Testing => self.testing_blocks,
        }
    }

    /// Returns current phase
    pub fn current_phase(&self) -> &P {
        &self.phase
    }

    pub fn current_trial_state(&self) -> Option<TrialState> {
        self.current.as_ref().map(|t| t.state)
    }

    fn response_window_open(&self) -> bool {
        self.current.as_ref().is_some_and(|t| {
            t.state == TrialState::Response && t.timestamps.stimulus_onset.is_some()
        })
    }

    /// Returns the stimulus while it is on screen
    pub fn current_stimulus(&self) -> Option<Shape> {
        self.current
            .as_ref()
            .filter(|t| t.state == TrialState::Response)
            .map(|t| t.stimulus)
    }

    /// Correctness of the current trial while its feedback is shown
    pub fn feedback(&self) -> Option<bool> {
        self.current
            .as_ref()
            .filter(|t| t.state == TrialState::Feedback)
            .map(|t| t.is_correct())
    }

    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        self.phase
            .is_block()
            .then(|| (self.block_trials.len() + 1, self.target_trials()))
    }

    pub fn noise_volume(&self) -> f32 {
        self.noise_volume
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    pub fn last_block(&self) -> Option<&BlockResult> {
        self.last_block.as_ref()
    }

    pub fn saved_paths(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }
}
