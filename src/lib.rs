//! Civic issue reporting: residents photograph a problem, an image
//! classification service tags it, and the community votes it up or down in a
//! shared feed.
//!
//! The crate is a small HTTP server over SQLite plus a few terminal commands
//! for operators. [`vote`] holds the only real state machine.

pub mod auth;
pub mod classify;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod server;
pub mod uploads;
pub mod vote;
