//! Order management: the validated order/fill/position model plus the
//! engines that size, gate, execute, and book trades against it.

pub mod accounting;
pub mod execution;
pub mod risk;
pub mod safety;
pub mod types;

pub use accounting::{AccountingConfig, PaperAccount, TrailingStopConfig};
pub use execution::{ExecutionEngine, Mode, Venue};
pub use risk::{RiskConfig, RiskEngine, RiskOutcome, SizedOrder};
pub use safety::{SafetyConfig, SafetyMonitor};
pub use types::{ExecutionResult, OrderFill, OrderKind, OrderRequest, Position, RejectKind};
