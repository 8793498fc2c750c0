//! API route handlers

pub mod error;
pub mod host;
pub mod pool;
pub mod repository;
pub mod session;
pub mod system;

pub use error::AppError;
