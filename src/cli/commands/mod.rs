//! Command implementations.

pub mod check;
pub mod completions;
pub mod duplicates;
pub mod export;
pub mod status;
pub mod sync;
pub mod version;
