//! Shared utilities for the muninn binaries.

pub mod common;
