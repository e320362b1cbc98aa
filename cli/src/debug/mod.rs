//! Debugging front ends.

#[cfg(feature = "dap")]
pub(crate) mod dap;
