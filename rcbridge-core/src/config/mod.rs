//! Configuration types
//!
//! Board-agnostic configuration structures, read at boot from an embedded
//! TOML file by [`parse_config`].

pub mod hardware;
pub mod network;
pub mod parse;
pub mod types;

pub use hardware::*;
pub use network::*;
pub use parse::{parse_config, ParseError};
pub use types::*;
