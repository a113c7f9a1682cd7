//! Deterministic, pure logic shared by the fixbot pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod duplicate;
pub mod plan;
pub mod types;
