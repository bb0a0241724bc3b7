//! Port mocks.
//!
//! - [`ports::RecordingMem`] / [`ports::RecordingCpu`]: hand-written ports that keep
//!   everything the cache sends so tests can inspect and answer it.
//! - [`ports::MockMemPort`]: a `mockall` mock for tests that script the port's answers.

pub mod ports;
