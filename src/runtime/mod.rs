//! Runtime system
//!
//! Actor-based concurrency core: values and the immutability guard, atomic
//! cells, futures, the worker pool and actors.

pub mod actor;
pub mod atomic;
pub mod error;
pub mod future;
pub mod pool;
pub mod value;
