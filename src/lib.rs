//! Chess960 engine matches and tournaments over UCI.
//!
//! The [`Arena`] owns every engine process and drives matches and
//! tournaments to completion, recording each finished game as PGN.

pub mod arena;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;

pub use arena::{Arena, ArenaControl, ArenaOptions, ArenaReport};
pub use error::{ArenaError, Result};
