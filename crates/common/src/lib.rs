//! Common utilities shared across ticket service components.

#![warn(clippy::pedantic)]

/// Module for JWT primitives (size limits, segment decoding, time claims)
pub mod jwt;
