//! Network helpers.
//!
//! # Design Decisions
//! - TLS material is parsed and checked once, when a plugin is built, so a
//!   bad certificate fails composition instead of the first report

pub mod tls;
