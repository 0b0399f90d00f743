//! Common test utilities for satchel-prefetch
//!
//! This module provides shared test infrastructure including:
//! - Mock package store, prefetch handler and session
//! - Module fixtures and a wired delegate harness

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
