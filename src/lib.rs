//! qvote: quantum-channel security checks for vote transmission.
//!
//! This crate provides:
//! - A seeded BB84 channel simulator with QBER reconciliation
//! - E91 entanglement trials with CHSH (Bell-inequality) verification
//! - A parameterised intercept-resend adversary
//! - The SECURE / REJECTED decision rule over both statistics
//! - An append-only, hash-chained SQLite audit log of vote attempts
//! - An axum HTTP API for casting votes, running simulations and reading history
//!
//! The CLI wrapper lives in `src/main.rs`.

#![deny(unsafe_code)]

pub mod error;
pub mod config;

pub mod adversary;
pub mod audit;
pub mod bb84;
pub mod channel;
pub mod decision;
pub mod e91;
pub mod rng;
pub mod server;
pub mod simulation;
pub mod util;
pub mod vote;
