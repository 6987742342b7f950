//! Data models
//!
//! Domain records produced by the operations dashboard. These are the
//! payloads submitted for audit anchoring; their source-of-truth storage
//! lives with the dashboard backend, not here. All IDs are `i64`
//! snowflake values (see [`crate::util::snowflake_id`]).

pub mod emission;
pub mod incident;
pub mod sensor_reading;

// Re-exports
pub use emission::*;
pub use incident::*;
pub use sensor_reading::*;
