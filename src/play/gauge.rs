use serde::{Deserialize, Serialize};

use crate::play::windows::Verdict;

/// Gauge preset selecting the health model for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaugePreset {
    /// Recovery gauge with a lowered clear border.
    Easy,
    /// Standard recovery gauge; clear at 80%.
    Normal,
    /// Survival gauge starting full; failed once empty.
    Hard,
    /// Survival gauge where any combo break empties it instantly.
    Hazard,
}

impl GaugePreset {
    fn is_survival(self) -> bool {
        matches!(self, GaugePreset::Hard | GaugePreset::Hazard)
    }
}

/// Per-session health, clamped to `[min_health, 1.0]` after every judged
/// note. Increments on the recovery presets scale with the chart's `#TOTAL`
/// over the note count, the way groove gauges are calibrated.
#[derive(Debug, Clone)]
pub struct Gauge {
    preset: GaugePreset,
    health: f64,
    min_health: f64,
    border: f64,
    deltas: [f64; 6],
    /// `[threshold, factor]` rows: below `threshold`, damage scales by
    /// `factor`. First matching row wins.
    guts: &'static [[f64; 2]],
    failed: bool,
}

impl Gauge {
    pub fn new(preset: GaugePreset, total: f64, total_notes: usize) -> Self {
        let gain = if total_notes > 0 {
            (total / 100.0 / total_notes as f64).max(0.0)
        } else {
            0.0
        };

        let (init, min_health, border, deltas, guts): (f64, f64, f64, [f64; 6], &[[f64; 2]]) =
            match preset {
                GaugePreset::Easy => (
                    0.2,
                    0.02,
                    0.8,
                    [
                        gain * 1.2,
                        gain * 1.2,
                        gain * 0.6,
                        -0.016,
                        -0.048,
                        -0.008,
                    ],
                    &[],
                ),
                GaugePreset::Normal => (
                    0.2,
                    0.02,
                    0.8,
                    [gain, gain, gain * 0.5, -0.02, -0.06, -0.01],
                    &[],
                ),
                GaugePreset::Hard => (
                    1.0,
                    0.0,
                    0.0,
                    [0.001, 0.001, 0.0005, -0.06, -0.10, -0.02],
                    &[[0.3, 0.6]],
                ),
                GaugePreset::Hazard => (
                    1.0,
                    0.0,
                    0.0,
                    [0.001, 0.001, 0.0005, -1.0, -1.0, -0.02],
                    &[],
                ),
            };

        Self {
            preset,
            health: init,
            min_health,
            border,
            deltas,
            guts,
            failed: false,
        }
    }

    pub fn preset(&self) -> GaugePreset {
        self.preset
    }

    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn min_health(&self) -> f64 {
        self.min_health
    }

    /// Apply one judged note. Failure on the survival presets is a latched
    /// flag; playback control stays with the caller.
    pub fn update(&mut self, verdict: Verdict) {
        let mut delta = self.deltas[verdict as usize];
        if delta < 0.0 {
            for gut in self.guts {
                if self.health < gut[0] {
                    delta *= gut[1];
                    break;
                }
            }
        }
        self.health = (self.health + delta).clamp(self.min_health, 1.0);
        if self.preset.is_survival() && delta < 0.0 && self.health <= self.min_health {
            self.failed = true;
        }
    }

    /// Direct damage outside the verdict table (landmines). `damage` is in
    /// gauge percent.
    pub fn apply_damage(&mut self, damage: f64) {
        self.health = (self.health - damage / 100.0).clamp(self.min_health, 1.0);
        if self.preset.is_survival() && self.health <= self.min_health {
            self.failed = true;
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Clear condition at the end of a session.
    pub fn is_cleared(&self) -> bool {
        if self.preset.is_survival() {
            !self.failed
        } else {
            self.health >= self.border
        }
    }
}
