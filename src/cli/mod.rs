//! CLI module for the alarm clock.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `display`: Output formatting and display logic

pub mod commands;
pub mod display;

pub use commands::{AddArgs, Cli, Commands, EditArgs, SettingsArgs};
pub use display::Display;
