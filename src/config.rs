use crate::chart::lane::PlayMode;
use crate::play::gauge::GaugePreset;
use crate::play::windows::{JudgeRank, WindowPreset};

/// Compiler configuration, passed at construction and never mutated.
/// Every knob the compiler consults lives here.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// BPM assumed when the chart declares none.
    pub default_bpm: f64,
    /// Upper bound for the LCM resolution; exceeding it clamps with a warning.
    pub max_resolution: u64,
    /// Force a play mode instead of detecting one from channel usage.
    pub forced_mode: Option<PlayMode>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            default_bpm: 130.0,
            max_resolution: 1 << 24,
            forced_mode: None,
        }
    }
}

/// Per-session play configuration consumed by the judgement engine.
#[derive(Debug, Clone)]
pub struct PlayConfig {
    pub windows: WindowPreset,
    /// Overrides the chart's `#RANK` when set.
    pub judge_rank: Option<JudgeRank>,
    pub gauge: GaugePreset,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            windows: WindowPreset::SevenKey,
            judge_rank: None,
            gauge: GaugePreset::Normal,
        }
    }
}
