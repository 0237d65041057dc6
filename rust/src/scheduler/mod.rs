//! Resource scheduling over the compiled activity graph.
//!
//! This module assigns activities to resources over time, honouring
//! dependency order, explicit targets and each resource's allocation mode.

mod core;
mod timeline;

pub use core::{
    ActivityAllocation, ConflictKind, ResourceAllocation, ResourceScheduler, SchedulingConflict,
};
pub use timeline::Timeline;
