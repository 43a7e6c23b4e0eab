//! Latency statistics engine.

mod latency;

pub use latency::{summarize, LatencyReport, LatencyStats, TAIL_MIN_SAMPLES};
