use crate::encoder::EmissionStats;
use crate::error::Result;
use serde::Serialize;
use ssvep_core::Condition;
use ssvep_timing::TickStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    pub condition: Condition,
    pub quota: u32,
    pub completed: u32,
}

/// What a run did, for the operator log and the optional JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub completed: bool,
    pub aborted: bool,
    pub final_phase: String,
    pub conditions: Vec<ConditionSummary>,
    /// Active-phase entries in the order they happened.
    pub entries: Vec<Condition>,
    pub iterations: u64,
    pub elapsed_ms: u64,
    pub emission: EmissionStats,
    pub render_failures: u64,
    pub tick_stats: TickStats,
}

impl SessionSummary {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn log(&self) {
        log::info!(
            "session {}: {} trials over {} ticks, {} markers sent, {} dropped",
            if self.completed { "completed" } else { "stopped early" },
            self.entries.len(),
            self.iterations,
            self.emission.markers_sent,
            self.emission.markers_dropped,
        );
        for c in &self.conditions {
            log::info!("  {}: {}/{}", c.condition, c.completed, c.quota);
        }
        if self.tick_stats.samples > 0 {
            log::info!(
                "  tick interval {:.3} ms, jitter {:.3} ms, {:.2} Hz",
                self.tick_stats.average_interval_ns / 1e6,
                self.tick_stats.jitter_ns / 1e6,
                self.tick_stats.effective_rate_hz,
            );
        }
    }
}
