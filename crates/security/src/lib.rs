//! Security helpers for parley.
//!
//! Names coming from user input (context documents) or from the model
//! (scratch file names) are resolved strictly inside a designated root
//! directory; traversal and absolute paths are refused.

pub mod path;

pub use path::{resolve_within, validate_relative_name, PathValidationError};
