// src/utils/mod.rs
pub mod error;
pub mod html;
pub mod logging;
pub mod retry;

pub use error::AppError; // Re-export main error type for convenience
