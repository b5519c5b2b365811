//! Chart compilation: notation text in, immutable event timeline out.

pub mod bmson;
pub mod channel;
pub mod compiler;
pub mod error;
pub mod lane;
pub mod loader;

pub use compiler::{Chart, ChartCompiler, ChartMeta};
pub use error::ChartError;
pub use lane::{PlayMode, PlayerSide};
pub use loader::load_chart;
