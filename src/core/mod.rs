//! Core types: pixel buffers, region math, errors and execution context.

pub mod buffer;
pub mod context;
pub mod error;
pub mod geometry;
