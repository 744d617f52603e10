pub mod config;
pub mod stats;
pub mod system;
pub mod trace;

pub use config::{CacheInfo, CacheLevel, ControllerKind, SimConfig};
pub use stats::{ControllerSummary, CoreSummary, SummaryStats};
pub use system::{MemSystem, System};
pub use trace::{Instruction, Op, Trace};
