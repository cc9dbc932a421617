//! Tests for runtime values and the immutability guard
