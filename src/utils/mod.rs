//! Utility helpers

pub mod escape;

pub use escape::{escape_bytes, hex_dump, unescape};
