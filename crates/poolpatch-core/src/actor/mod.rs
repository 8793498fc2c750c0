//! Actor implementations

pub mod pool;
