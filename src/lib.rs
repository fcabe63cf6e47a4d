pub mod config;
pub mod controller;
pub mod countdown;
pub mod http;
pub mod meters;
pub mod types;
pub mod view;

pub use config::Config;
pub use controller::MeterController;
pub use types::{CreditsStatus, MeterKind, Mode, ModeDecision, ModeSource, UsageStatus};
pub use view::{MemoryView, MeterView, Slots, TerminalView, ViewState};
