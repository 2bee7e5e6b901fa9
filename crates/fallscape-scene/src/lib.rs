//! Falling objects: how many there are, where they start and how they move.

pub mod config;
pub mod pool;
pub mod update;

pub use config::FieldConfig;
pub use pool::{InstanceBatch, ObjectState, Pool, build_pool, object_count, partition};
pub use update::{advance, recycle_if_below};
