//! Mathink Core Library
//!
//! Configuration, logging and stroke-file loading for the `mathink` CLI.

pub mod colored_logger;
pub mod config;
pub mod ink_file;
