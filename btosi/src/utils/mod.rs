//! Internal data structures.
//!
//! Exposes the generation-checked [`Slab`] the reactor stores its watches in
//! and the byte [`RingBuffer`] used to stage partial packets.

mod ring;
mod slab;

pub use ring::RingBuffer;
pub(crate) use slab::Slab;
