//! Deterministic fix-and-propose controller.
//!
//! One run targets one repository at the current head of its default branch:
//! it derives a revision-bound branch name, skips the run if an open proposal
//! from that branch already exists, applies an external fix tool to a
//! disposable shallow clone, and (only if files changed) commits, pushes, and
//! opens a single change proposal. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (branch naming, duplicate scan, types).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (environment, config, git, hosted API,
//!   fix tool, working copy). Trait seams allow fakes in tests.
//!
//! [`pipeline`] sequences the stages and tags failures with [`error::PipelineError`].

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
