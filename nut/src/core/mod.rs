//! Deterministic, pure logic shared by the streaming pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod context;
pub mod destination;
pub mod document;
pub mod inline;
pub mod reassembler;
