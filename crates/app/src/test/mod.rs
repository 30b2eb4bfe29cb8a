//! Test support shared across modules.

pub(crate) mod helpers;
