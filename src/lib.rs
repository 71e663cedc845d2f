pub mod catalog;
pub mod config;
pub mod error;
pub mod filename;
pub mod progress;
pub mod reconcile;
pub mod relocate;
pub mod scanner;
pub mod tags;
pub mod template;
