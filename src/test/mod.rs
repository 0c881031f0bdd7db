//! Shared helpers for the unit tests.

pub(crate) mod fixtures;
