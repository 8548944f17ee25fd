//! Incremental build driver for Twirl templates.
//!
//! Change events for template sources are classified into compile and delete units, each
//! unit owns exactly one generated `.template.scala` file, and units run in parallel on a
//! worker pool that reports every failure of a batch together.

pub mod action;
pub mod cache;
pub mod classify;
pub mod compiler;
pub mod config;
pub mod derive;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod format;
pub mod output;
pub mod source;
pub mod walker;
pub mod watcher;
