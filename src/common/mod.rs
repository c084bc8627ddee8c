//! Common types, traits, and error definitions for rust_rrtx
//!
//! This module provides the foundational building blocks shared by the
//! planning engine, the edge models and the utilities.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
