//! Common test infrastructure
//!
//! Spawns an in-process fake backend and builds clients against it.
//! Tests should only import from this module, not from internal submodules.

#![allow(dead_code, unused_imports)]

mod constants;
mod server;

pub use constants::*;
pub use server::{app_state, FakeBackend, TestServer};
