//! CLI commands for the spread monitor.

pub mod balance;
pub mod check_config;
pub mod fees;
pub mod quote;
pub mod rotation;
pub mod run;

pub use balance::{run_balance, BalanceArgs};
pub use check_config::{run_check_config, CheckConfigArgs};
pub use fees::{run_fees, FeesArgs};
pub use quote::{run_quote, QuoteArgs};
pub use rotation::{run_rotation, RotationArgs};
pub use run::{run_monitor, RunArgs};
