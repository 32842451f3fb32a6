//! IpLimit - per-address session limits for a proxy front door
//!
//! Decides at connection time whether a new client session may proceed,
//! based on how many sessions are already online from the same address.

// ============================================
// Admission Core
// ============================================

/// Address normalization and line framing
pub mod network;
/// Address key → online sessions
pub mod registry;
/// Capacity rule
pub mod policy;
/// Pre-login / login checkpoints and session lifetime
pub mod gate;

// ============================================
// Host Integration
// ============================================

/// YAML configuration with atomic reload
pub mod config;
/// Permission lookup contract
pub mod permissions;
/// `iplimit` admin commands
pub mod admin;
/// TCP front door driving the gate
pub mod server;
