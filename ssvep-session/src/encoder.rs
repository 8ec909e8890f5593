//! Phase/trial/cue to marker encoding, plus the emission step that forwards
//! markers to the transport and plays audio cues.

use crate::config::AudioPolicy;
use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use ssvep_core::{AudioCue, Marker, MarkerTransport, SessionPhase};

/// Wire encoding of markers. Must match what the acquisition side expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerEncoding {
    /// Active phases encode as `phase*phase_scale + trial_scale*trial + cue`,
    /// everything else as the bare phase code.
    #[serde(rename_all = "camelCase")]
    Scaled { phase_scale: u32, trial_scale: u32 },
    /// Phase changes as bare codes, gaze cues as the pair `"phase, cue"`.
    PhaseCuePair,
}

impl Default for MarkerEncoding {
    fn default() -> Self {
        MarkerEncoding::Scaled {
            phase_scale: 100,
            trial_scale: 10,
        }
    }
}

impl MarkerEncoding {
    /// Ensures every marker a session can produce decodes back to a unique
    /// phase/trial/cue triple.
    pub fn check_decodable(&self, condition_count: usize, max_quota: u32, max_cue: u32) -> Result<()> {
        let MarkerEncoding::Scaled {
            phase_scale,
            trial_scale,
        } = *self
        else {
            return Ok(());
        };
        let reject = |msg: String| Err(SessionError::Configuration(msg));

        if phase_scale == 0 || trial_scale == 0 {
            return reject("marker scales must be positive".into());
        }
        if max_cue >= trial_scale {
            return reject(format!(
                "gaze cue {max_cue} does not fit below trial scale {trial_scale}"
            ));
        }
        if (u64::from(max_quota) + 1) * u64::from(trial_scale) > u64::from(phase_scale) {
            return reject(format!(
                "{max_quota} trials at scale {trial_scale} overflow phase scale {phase_scale}"
            ));
        }
        let terminal = 2 + condition_count as u64;
        if terminal >= u64::from(phase_scale) {
            return reject(format!(
                "terminal phase code {terminal} collides with phase scale {phase_scale}"
            ));
        }
        if terminal * u64::from(phase_scale) > i32::MAX as u64 {
            return reject(format!("phase scale {phase_scale} overflows a 32-bit marker"));
        }
        Ok(())
    }
}

/// Components recovered from an integer marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMarker {
    pub phase: u32,
    /// 0 for bare phase markers.
    pub trial: u32,
    pub cue: u32,
}

/// Pure mapping from session context to marker payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerEncoder {
    pub encoding: MarkerEncoding,
    pub condition_count: usize,
}

impl MarkerEncoder {
    pub fn new(encoding: MarkerEncoding, condition_count: usize) -> Self {
        Self {
            encoding,
            condition_count,
        }
    }

    /// `trial` is the active condition's 1-based trial count; `cue` is `None`
    /// for phase-change markers.
    pub fn encode(&self, phase: SessionPhase, trial: u32, cue: Option<u32>) -> Marker {
        let code = phase.code(self.condition_count);
        if !phase.is_active() {
            return Marker::Code(code as i32);
        }
        match (self.encoding, cue) {
            (
                MarkerEncoding::Scaled {
                    phase_scale,
                    trial_scale,
                },
                cue,
            ) => Marker::Code((code * phase_scale + trial_scale * trial + cue.unwrap_or(0)) as i32),
            (MarkerEncoding::PhaseCuePair, None) => Marker::Code(code as i32),
            (MarkerEncoding::PhaseCuePair, Some(cue)) => Marker::PhaseCue { phase: code, cue },
        }
    }

    pub fn decode(&self, code: i32) -> Option<DecodedMarker> {
        let code = u32::try_from(code).ok()?;
        let bare = DecodedMarker {
            phase: code,
            trial: 0,
            cue: 0,
        };
        match self.encoding {
            MarkerEncoding::Scaled {
                phase_scale,
                trial_scale,
            } if code >= phase_scale => {
                let rest = code % phase_scale;
                Some(DecodedMarker {
                    phase: code / phase_scale,
                    trial: rest / trial_scale,
                    cue: rest % trial_scale,
                })
            }
            _ => Some(bare),
        }
    }
}

/// Delivery counters for the session summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmissionStats {
    pub markers_sent: u64,
    pub markers_dropped: u64,
    pub cues_played: u64,
    pub audio_failures: u64,
}

/// Encode-and-emit step. Owns the outgoing collaborators but no session
/// state; delivery failures are logged and counted, never retried.
pub struct MarkerEmitter {
    encoder: MarkerEncoder,
    audio_policy: AudioPolicy,
    transport: Box<dyn MarkerTransport>,
    audio: Box<dyn AudioCue>,
    stats: EmissionStats,
}

impl MarkerEmitter {
    pub fn new(
        encoder: MarkerEncoder,
        audio_policy: AudioPolicy,
        transport: Box<dyn MarkerTransport>,
        audio: Box<dyn AudioCue>,
    ) -> Self {
        Self {
            encoder,
            audio_policy,
            transport,
            audio,
            stats: EmissionStats::default(),
        }
    }

    pub fn encoder(&self) -> &MarkerEncoder {
        &self.encoder
    }

    pub fn stats(&self) -> EmissionStats {
        self.stats
    }

    pub fn emit_transition(&mut self, phase: SessionPhase, trial: u32) -> Marker {
        let marker = self.encoder.encode(phase, trial, None);
        log::debug!("marker {marker} ({phase}, trial {trial})");
        self.emit(&marker);
        self.play(self.audio_policy.transition_beeps);
        marker
    }

    pub fn emit_cue(&mut self, phase: SessionPhase, trial: u32, cue: u32, first_of_trial: bool) -> Marker {
        let marker = self.encoder.encode(phase, trial, Some(cue));
        log::debug!("marker {marker} ({phase}, trial {trial}, cue {cue})");
        self.emit(&marker);
        if self.audio_policy.cue_beeps.beeps(cue, first_of_trial) {
            self.play(1);
        }
        marker
    }

    fn emit(&mut self, marker: &Marker) {
        match self.transport.send_marker(marker) {
            Ok(()) => self.stats.markers_sent += 1,
            Err(e) => {
                self.stats.markers_dropped += 1;
                log::warn!("marker {marker} not delivered: {e}");
            }
        }
    }

    fn play(&mut self, times: u32) {
        for _ in 0..times {
            match self.audio.play_cue() {
                Ok(()) => self.stats.cues_played += 1,
                Err(e) => {
                    self.stats.audio_failures += 1;
                    log::warn!("audio cue failed: {e}");
                }
            }
        }
    }
}
