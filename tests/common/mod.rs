//! Common test infrastructure
//!
//! Provides an isolated test server per test: a real HTTP listener and
//! worker pool over a scratch database, with fixed in-process collaborators
//! standing in for the storage gateway and the DSP sidecar.

mod fixtures;
mod server;

pub use fixtures::{CLIPPED_REF, CLIP_REF, TINY_REF};
pub use server::TestServer;
