//! Phasemeter - per-phase resource attribution for distributed executions
//!
//! Attributes shared-machine resource consumption (CPU, network, disk, or any
//! sampled or blocking resource) to the leaf phases of an execution trace,
//! one time slice at a time: how much of a resource each phase used and how
//! much was available to it.

pub mod attribution;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod mapping;
pub mod model;
pub mod monitor;
pub mod providers;
pub mod report;
pub mod rules;
pub mod scenario;
pub mod timeslice;

pub use error::{AttributionError, CodecError, Result};
