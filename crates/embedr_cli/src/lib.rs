//! Headless line-oriented driver for the session controller.

pub mod bridges;
pub mod commands;
pub mod output;
