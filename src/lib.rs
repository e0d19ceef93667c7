//! Loopcast - continuous playlist re-streaming over a looping video
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod playlist;
pub mod server;
pub mod startup;
pub mod state;
pub mod supervisor;
