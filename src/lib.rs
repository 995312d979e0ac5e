//! camera-engine library crate.
//!
//! A camera acquisition engine: owns a capture device, runs a paced
//! acquisition loop on a background thread, and exposes the latest frame to
//! any number of readers.

pub mod camera;
pub mod config;
