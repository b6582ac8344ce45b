//! The three token schemes. Each is an `issue`/`verify` pair and they are
//! never interchangeable.

pub mod capability;
pub mod claim;
pub mod sealed;
