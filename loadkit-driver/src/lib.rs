//! Load generation and latency measurement.
//!
//! A [`runner::Runner`] drives one registered [`behavior::Behavior`] at a time. Behaviors draw
//! their choices from a seeded [`prng::Prng`], issue operations through the context's store and
//! report each outcome to a [`reporter::Reporter`], which buffers samples in a
//! [`collector::Collector`] and flushes them periodically.

pub mod behavior;
pub mod collector;
pub mod config;
pub mod context;
pub mod prng;
pub mod reporter;
pub mod runner;
pub mod workloads;
