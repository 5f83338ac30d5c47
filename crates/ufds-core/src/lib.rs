//! # ufds-core
//!
//! Foundational types shared by the UFDS directory client crates.
//!
//! This crate provides the domain error taxonomy that every directory
//! operation resolves to, plus strongly-typed UUID wrappers for directory
//! resources.
//!
//! ## Modules
//!
//! - [`error`] - Domain error taxonomy and structured error responses
//! - [`uuid`] - Strongly-typed UUID wrappers

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod uuid;

// Re-export commonly used types
pub use error::{Error, Result};
