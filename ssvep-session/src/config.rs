use crate::encoder::MarkerEncoding;
use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use ssvep_core::Condition;
use ssvep_timing::tick_period;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Everything a run needs; loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionConfig {
    /// Dwell time of PreExperiment; Idle ends at twice this value.
    pub idle_delay_ms: u64,
    pub trial_duration_ms: u64,
    pub flicker_hz: f64,
    pub gaze_period_ticks: u64,
    pub gaze_cue_count: u32,
    /// First cue of every trial. Scaled markers need it above 0 so the first
    /// cue differs from the trial-entry marker sent on the same tick.
    #[serde(default = "default_gaze_cue_start")]
    pub gaze_cue_start: u32,
    pub quotas: BTreeMap<Condition, u32>,
    #[serde(default)]
    pub marker: MarkerEncoding,
    #[serde(default)]
    pub audio: AudioPolicy,
    /// Ticks the saccade target stays up after an outward cue; 0 disables it.
    #[serde(default)]
    pub target_ticks: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_gaze_cue_start() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPolicy {
    /// Cue sounds played on every phase change.
    #[serde(default)]
    pub transition_beeps: u32,
    #[serde(default)]
    pub cue_beeps: CueBeeps,
}

impl Default for AudioPolicy {
    fn default() -> Self {
        Self {
            transition_beeps: 0,
            cue_beeps: CueBeeps::Every,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CueBeeps {
    Never,
    #[default]
    Every,
    /// First cue of a trial, then every even-valued cue.
    Alternate,
}

impl CueBeeps {
    pub fn beeps(&self, cue: u32, first_of_trial: bool) -> bool {
        match self {
            CueBeeps::Never => false,
            CueBeeps::Every => true,
            CueBeeps::Alternate => first_of_trial || cue % 2 == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    pub destination: SocketAddr,
    pub bind: SocketAddr,
    /// OSC address pattern the recorder listens on.
    pub address: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            destination: SocketAddr::from(([127, 0, 0, 1], 5001)),
            bind: SocketAddr::from(([0, 0, 0, 0], 6001)),
            address: "/test".to_string(),
        }
    }
}

/// Built-in session programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Two conditions, 20 trials each, four gaze directions per trial.
    GazeShift,
    /// Two conditions, 5 trials each, saccades to a peripheral target.
    Saccade,
    /// `Saccade` plus a flicker-only condition.
    SaccadeSsvep,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::GazeShift, Variant::Saccade, Variant::SaccadeSsvep];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::GazeShift => "gaze-shift",
            Variant::Saccade => "saccade",
            Variant::SaccadeSsvep => "saccade-ssvep",
        }
    }
}

impl FromStr for Variant {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Variant::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| SessionError::Configuration(format!("unknown session variant `{s}`")))
    }
}

impl SessionConfig {
    pub fn preset(variant: Variant) -> Self {
        match variant {
            Variant::GazeShift => Self {
                idle_delay_ms: 15_000,
                trial_duration_ms: 20_000,
                flicker_hz: 8.0,
                gaze_period_ticks: 80,
                gaze_cue_count: 4,
                gaze_cue_start: 0,
                quotas: BTreeMap::from([(Condition::Control, 20), (Condition::Experimental, 20)]),
                marker: MarkerEncoding::PhaseCuePair,
                audio: AudioPolicy {
                    transition_beeps: 2,
                    cue_beeps: CueBeeps::Every,
                },
                target_ticks: 0,
                seed: None,
                transport: TransportConfig::default(),
            },
            Variant::Saccade => Self {
                idle_delay_ms: 15_000,
                trial_duration_ms: 22_500,
                flicker_hz: 8.0,
                gaze_period_ticks: 90,
                gaze_cue_count: 4,
                gaze_cue_start: 1,
                quotas: BTreeMap::from([(Condition::Control, 5), (Condition::Experimental, 5)]),
                marker: MarkerEncoding::default(),
                audio: AudioPolicy {
                    transition_beeps: 0,
                    cue_beeps: CueBeeps::Alternate,
                },
                target_ticks: 15,
                seed: None,
                transport: TransportConfig::default(),
            },
            Variant::SaccadeSsvep => {
                let mut config = Self::preset(Variant::Saccade);
                config.quotas.insert(Condition::SsvepOnly, 5);
                config
            }
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Scheduled conditions in slot order with their quotas.
    pub fn slots(&self) -> Vec<(Condition, u32)> {
        self.quotas.iter().map(|(c, q)| (*c, *q)).collect()
    }

    pub fn condition_count(&self) -> usize {
        self.quotas.len()
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn tick_period(&self) -> Result<Duration> {
        tick_period(self.flicker_hz).ok_or_else(|| {
            SessionError::Configuration(format!(
                "flicker frequency must be a positive number of Hz, got {}",
                self.flicker_hz
            ))
        })
    }

    /// Trial length in ticks, rounded to the nearest whole tick.
    pub fn trial_ticks(&self) -> Result<u64> {
        let period = self.tick_period()?;
        Ok((self.trial_duration_ms as f64 / (period.as_secs_f64() * 1e3)).round() as u64)
    }

    /// Last value of the gaze cue cycle, `None` if it does not fit a `u32`.
    pub fn gaze_cue_max(&self) -> Option<u32> {
        self.gaze_cue_start
            .checked_add(self.gaze_cue_count.saturating_sub(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.quotas.is_empty() {
            return Err(SessionError::Configuration(
                "at least one condition quota is required".into(),
            ));
        }
        if let Some((condition, _)) = self.quotas.iter().find(|(_, q)| **q == 0) {
            return Err(SessionError::Configuration(format!(
                "quota for {condition} must be positive"
            )));
        }
        let trial_ticks = self.trial_ticks()?;
        if trial_ticks == 0 {
            return Err(SessionError::Configuration(format!(
                "trial duration of {} ms is shorter than one tick",
                self.trial_duration_ms
            )));
        }
        if self.gaze_period_ticks == 0 {
            return Err(SessionError::Configuration(
                "gaze period must be at least one tick".into(),
            ));
        }
        if self.gaze_cue_count == 0 {
            return Err(SessionError::Configuration(
                "gaze cue count must be positive".into(),
            ));
        }
        let max_cue = self.gaze_cue_max().ok_or_else(|| {
            SessionError::Configuration(format!(
                "gaze cues {}..+{} overflow a 32-bit cue",
                self.gaze_cue_start, self.gaze_cue_count
            ))
        })?;
        if matches!(self.marker, MarkerEncoding::Scaled { .. }) && self.gaze_cue_start == 0 {
            return Err(SessionError::Configuration(
                "scaled markers need gazeCueStart >= 1, cue 0 repeats the trial-entry marker".into(),
            ));
        }
        let max_quota = self.quotas.values().copied().max().unwrap_or(0);
        self.marker
            .check_decodable(self.condition_count(), max_quota, max_cue)
    }
}
