//! Collection types used by the cut kernel.
//!
//! - [`aliases`]: hashed collections, small buffers and the arena backend
//! - `spatial_hash_grid`: tolerance-sized grid used by the point pool

pub mod aliases;
pub(crate) mod spatial_hash_grid;

pub use aliases::*;
