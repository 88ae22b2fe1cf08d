//! Hash worker pool: streaming content digests computed off the coordinator thread.

pub mod digest;
pub mod pool;
