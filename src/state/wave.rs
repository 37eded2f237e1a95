use std::time::{Duration, Instant};

use crate::config::{DEFAULT_WAVE_PAUSE, DEFAULT_WAVE_TICK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePosition {
    /// Character index of the highlighted label cell.
    At(usize),
    Paused,
}

/// Highlight sweeping across the label of the active pending tool. The
/// owner drives it with `tick` once per `tick_interval`; after passing the
/// end of the label it rests for `pause` and restarts at the first cell.
#[derive(Debug, Clone)]
pub struct WaveAnimation {
    tick_interval: Duration,
    pause: Duration,
    position: usize,
    paused_until: Option<Instant>,
}

impl Default for WaveAnimation {
    fn default() -> Self {
        Self::new(DEFAULT_WAVE_TICK, DEFAULT_WAVE_PAUSE)
    }
}

impl WaveAnimation {
    pub fn new(tick_interval: Duration, pause: Duration) -> Self {
        Self {
            tick_interval,
            pause,
            position: 0,
            paused_until: None,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn position(&self) -> WavePosition {
        if self.paused_until.is_some() {
            WavePosition::Paused
        } else {
            WavePosition::At(self.position)
        }
    }

    pub fn tick(&mut self, now: Instant, label_len: usize) -> WavePosition {
        if let Some(until) = self.paused_until {
            if now < until {
                return WavePosition::Paused;
            }
            self.paused_until = None;
            self.position = 0;
            return WavePosition::At(0);
        }

        self.position += 1;
        if self.position >= label_len {
            self.paused_until = Some(now + self.pause);
            return WavePosition::Paused;
        }
        WavePosition::At(self.position)
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.paused_until = None;
    }
}
