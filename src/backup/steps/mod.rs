//! The external steps of a backup run, each wrapping one tool.

pub mod mount;
pub mod sql;
pub mod sync;
