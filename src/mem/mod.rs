pub mod array;
pub mod controller;
pub mod cp_log;
pub mod decode;
pub mod pump;
pub mod request;
pub mod scheduler;


pub use array::Array;
pub use controller::{ControllerParams, ControllerStats, PcmController};
pub use cp_log::{CpAnalysisLog, CpEvent};
pub use decode::{AddrDecoder, AddrVec, Level, NUM_LEVELS};
pub use pump::{BankState, CpKind, CpStatus, AGING_LIMIT, DESTRESS_TICKS};
pub use request::{ReqKind, Request};
