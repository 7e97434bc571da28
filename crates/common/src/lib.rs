//! Helpers shared by every relay crate.
//!
//! Library crates keep their own `thiserror` error enums; this crate only
//! supplies the glue that gives each of them `anyhow`-style `.context()`.

pub mod error;

pub use error::FromMessage;
