//! General utilities.

#[macro_use]
mod macros;

mod arena;
mod key_index_mapper;

pub use arena::{Arena, ArenaKey};
pub use key_index_mapper::KeyIndexMapper;

#[doc(hidden)]
pub use log;
