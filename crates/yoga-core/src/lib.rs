//! Core types and utilities for the yoga pose dataset pipeline.
//!
//! This crate provides the error type, configuration structures and shared
//! types used by the dataset crate and the command-line tool.

pub mod cli;
pub mod config;
pub mod error;
pub mod types;

pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use types::*;
