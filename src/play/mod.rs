//! Play session: scheduling, judgement and per-session results.

pub mod gauge;
pub mod judge;
pub mod scheduler;
pub mod score;
pub mod windows;

pub use gauge::{Gauge, GaugePreset};
pub use judge::{JudgeState, JudgeType, JudgementEngine};
pub use scheduler::{EventConsumer, PlayerScheduler};
pub use score::{ex_score, grade, Grade};
pub use windows::{JudgeRank, TimingWindows, Verdict, WindowPreset};
