//! Runtime values and the immutability guard
//!
//! This module provides the value type handed between actors and the guard
//! deciding which values may cross a concurrency boundary.

pub mod guard;
pub mod runtime_value;
pub use runtime_value::*;

#[cfg(test)]
mod tests;
