//! shiftrole library - work-schedule role bot
//!
//! This module exports internal components for integration testing.

pub mod cli;
pub mod commands;
pub mod config;
pub mod health;
pub mod orchestrator;
pub mod redact;
pub mod roles;
pub mod schedule;
pub mod scheduler;
pub mod status;
pub mod store;
