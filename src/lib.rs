//! App Book - a launcher for personal script apps
//!
//! Discovers `*.app` scripts, checks their imports against an isolated
//! interpreter environment, offers to install what is missing, and runs
//! them with their output streamed line by line.

pub mod autostart;
pub mod config;
pub mod environment;
pub mod error;
pub mod installer;
pub mod logging;
pub mod metadata;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod session;
pub mod setup;
