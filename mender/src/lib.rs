//! Autonomous remediation agent driven by an observe-orient-decide-act loop.
//!
//! A mission pursues one natural-language objective against a target host.
//! Each cycle asks a reasoning backend for intents, vets every proposed action
//! through the safety gate and operator approval, executes it over a transport
//! and records the result. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, rendering, safety
//!   classification, backoff, simulation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (transports, backends, operator
//!   prompts, config, audit and knowledge files). Isolated behind traits.
//!
//! Orchestration modules ([`adapter`], [`dispatch`], [`mission`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod adapter;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod mission;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
