//! Re-export public algorithms.

pub mod all_to_all;
pub mod clip;
pub mod collective;
pub mod communicator;
pub mod engine;
pub mod extract;
pub mod fan_in;
pub mod fan_in_merge;
pub mod filter;
pub mod merge;
pub mod serialize;
pub mod wire;

pub use all_to_all::redistribute_all_to_all;
pub use extract::extract_for_process;
pub use fan_in::{FanIn, compute_fan_in};
pub use fan_in_merge::redistribute_fan_in;
pub use filter::DistributedDataFilter;
pub use serialize::{deserialize_mesh, serialize_mesh};
