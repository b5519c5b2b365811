//! Rhythm-game runtime core: chart compilation, pulse↔time conversion,
//! event scheduling and input judgement.
//!
//! Data flows one direction. Notation text is compiled into an immutable
//! [`timeline::EventTimeline`]; a [`clock::TimelineClock`] derived from it
//! answers pulse↔time queries; a [`play::PlayerScheduler`] advances the
//! session clock and dispatches due events to consumers, one of which is
//! typically a [`play::JudgementEngine`]. Audio, rendering and input devices
//! live outside the crate and talk to it through those types.

pub mod chart;
pub mod clock;
pub mod config;
pub mod event;
pub mod play;
pub mod timeline;

pub use chart::{load_chart, Chart, ChartCompiler, ChartError, PlayMode};
pub use clock::{ClockCursor, TimelineClock};
pub use config::{CompileConfig, PlayConfig};
pub use event::{Event, EventIndex, EventKind};
pub use play::{EventConsumer, JudgementEngine, PlayerScheduler};
pub use timeline::EventTimeline;
