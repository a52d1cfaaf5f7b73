//! Shared utilities.

pub mod hash;
