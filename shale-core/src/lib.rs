//!
//! The Shale Core Library
//! ======================
//!
//! This crate contains common types that are useful to be shared across multiple tools when manipulating Shale-related things.
//!

pub mod ast;
pub mod pos;
