//! Retrazar - call-nesting reformatter for `-finstrument-functions` trace logs
//!
//! This library provides the core functionality for post-processing the
//! enter/exit markers emitted by gcc's `-finstrument-functions`, resolving the
//! raw function addresses against a disassembly listing and printing the log
//! with an indentation layout that emphasizes call nesting. The event log may
//! still be growing while it is processed.

pub mod cli;
pub mod reader;
pub mod reformat;
pub mod symbols;
