use serde::{Deserialize, Serialize};

use crate::chart::lane::PlayMode;

/// Quality band of a judged hit.
///
/// The two miss bands both count as poor; they differ in whether the note is
/// consumed (a late miss ends the note, an early excessive hit does not
/// change the combo-breaking rules applied by the engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Perfect,
    Great,
    Good,
    Bad,
    MissLate,
    MissEarly,
}

impl Verdict {
    const ALL: [Verdict; 6] = [
        Verdict::Perfect,
        Verdict::Great,
        Verdict::Good,
        Verdict::Bad,
        Verdict::MissLate,
        Verdict::MissEarly,
    ];

    /// Whether the combo survives this verdict.
    pub fn keeps_combo(self) -> bool {
        matches!(self, Verdict::Perfect | Verdict::Great | Verdict::Good)
    }

    pub fn is_miss(self) -> bool {
        matches!(self, Verdict::MissLate | Verdict::MissEarly)
    }
}

/// Window preset family, one per key layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPreset {
    FiveKey,
    SevenKey,
    NineKey,
}

impl WindowPreset {
    /// Preset matching a chart's key layout.
    pub fn for_mode(mode: PlayMode) -> Self {
        match mode {
            PlayMode::Beat5K | PlayMode::Beat10K => WindowPreset::FiveKey,
            PlayMode::Beat7K | PlayMode::Beat14K => WindowPreset::SevenKey,
            PlayMode::PopN9K => WindowPreset::NineKey,
        }
    }

    /// Base thresholds in seconds, ascending:
    /// perfect, great, good, bad, miss-late, miss-early.
    fn base(self) -> [f64; 6] {
        match self {
            WindowPreset::FiveKey => [0.020, 0.050, 0.100, 0.150, 0.150, 1.0],
            WindowPreset::SevenKey => [0.018, 0.040, 0.100, 0.200, 0.200, 1.0],
            WindowPreset::NineKey => [0.020, 0.060, 0.150, 0.280, 0.280, 1.0],
        }
    }
}

/// Judge rank from the chart header, mapped to a window multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeRank {
    VeryHard,
    Hard,
    Normal,
    Easy,
}

impl JudgeRank {
    /// `#RANK` values 0-3 map hardest to easiest; anything else is Normal.
    pub fn from_rank(rank: i32) -> Self {
        match rank {
            0 => JudgeRank::VeryHard,
            1 => JudgeRank::Hard,
            2 => JudgeRank::Normal,
            3 => JudgeRank::Easy,
            _ => JudgeRank::Normal,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            JudgeRank::VeryHard => 0.25,
            JudgeRank::Hard => 0.50,
            JudgeRank::Normal => 0.75,
            JudgeRank::Easy => 1.00,
        }
    }
}

/// Resolved timing windows: the preset's six ascending thresholds with the
/// rank multiplier applied to the judged bands. The miss bands stay fixed,
/// they bound the note's lifetime rather than its quality.
#[derive(Debug, Clone, Copy)]
pub struct TimingWindows {
    bands: [f64; 6],
}

impl TimingWindows {
    pub fn new(preset: WindowPreset, rank: JudgeRank) -> Self {
        let mut bands = preset.base();
        let multiplier = rank.multiplier();
        for band in &mut bands[..4] {
            *band *= multiplier;
        }
        Self { bands }
    }

    /// First band satisfied by `|diff|`, checked in ascending order.
    /// `None` means the hit is outside every window and must be ignored.
    pub fn classify(&self, diff: f64) -> Option<Verdict> {
        let diff = diff.abs();
        self.bands
            .iter()
            .zip(Verdict::ALL)
            .find(|(&band, _)| diff <= band)
            .map(|(_, verdict)| verdict)
    }

    /// Latest accepted lateness for a pending note; past it the note is an
    /// automatic miss.
    pub fn miss_late(&self) -> f64 {
        self.bands[4]
    }

    /// Widest window of all, the outer bound of input matching.
    pub fn outermost(&self) -> f64 {
        self.bands[5]
    }
}
