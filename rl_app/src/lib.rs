//! # rl_app
//!
//! Demo application driving the `rl_core` limiters with burst and steady load

pub mod cli;
pub mod config_loader;
pub mod demo;
pub mod shutdown_handler;
pub mod tracing_setup;
