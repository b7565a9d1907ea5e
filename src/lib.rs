#![warn(clippy::pedantic)]
// Noisy doc/signature lints: would require annotating every pub function
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference: keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts for epoch-millisecond timestamps and sizes
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]

pub mod activity;
pub mod allowlist;
pub mod bridge;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod decision;
pub mod dedup;
pub mod dispatch;
pub mod errors;
pub mod gateway;
pub mod host;
pub mod message;
pub mod reply;
pub mod scheduler;
pub mod storage;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
