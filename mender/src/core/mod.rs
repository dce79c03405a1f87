//! Deterministic, pure logic shared by the mission loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod catalog;
pub mod context;
pub mod history;
pub mod invariants;
pub mod parser;
pub mod platform;
pub mod render;
pub mod retry;
pub mod safety;
pub mod simulation;
pub mod truncate;
pub mod types;
