//! Core types: targets, command formatting, tasks and completion signals.

pub mod format;
pub mod signal;
pub mod target;
pub mod task;
pub mod types;
