//! Utility types for ADV.
//!
//! - [`Error`] / [`Result`] - Error handling shared by every layer

mod error;

pub use error::*;
