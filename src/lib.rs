//! Classifies compiler, traceback, debugger and generic log output into a
//! deduplicated list of error and warning events.

pub mod analyzer;
pub mod config;
pub mod input;
pub mod model;
pub mod patterns;
pub mod report;
pub mod runner;

pub use analyzer::Analyzer;
pub use model::{Event, EventKey, Level};
