//! Trusted time: network-synced readings, confidence scoring, and
//! clock-tamper anomaly detection.

pub mod protection;
pub mod sample;
pub mod trusted;
