//! Propmedia worker runtime
//!
//! Two roles share this binary:
//! - `serve` drains the callback queue and runs the maintenance loops against
//!   the job ledger
//! - `step` runs one pipeline step, reading the event JSON on stdin and
//!   writing the result JSON on stdout

pub mod serve;
pub mod step;

pub use serve::Runtime;
pub use step::run_step;
