//! Control layer exposing session state to developer tooling.

/// Shared session handle and status queries.
pub mod api;
/// Background threads that keep groups fed with a test tone.
pub mod feeder;
/// Ratatui-based developer console.
pub mod ui;
