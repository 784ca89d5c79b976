//! The C ABI and the pieces it hands broadcasts through.

pub mod abi;
pub mod callback;
pub mod envelope;
