//! Sensor data collection and aggregation.
//!
//! This module fans requests out over the sensors of a crossing, sums
//! their monthly and weekly volumes, and overlays toll-gate exemption
//! figures on the result.

pub mod aggregate;
pub mod collect;
pub mod toll;
pub mod types;
pub mod utility;
