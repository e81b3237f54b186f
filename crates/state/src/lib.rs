#![cfg_attr(not(test), deny(missing_docs, clippy::missing_docs_in_private_items))]
#![cfg_attr(test, allow(missing_docs, clippy::missing_docs_in_private_items))]
//! World-state access for block construction.
//!
//! [`IntraBlockState`] layers a journaled overlay on top of a read-only [`StateProvider`]. The
//! block builder opens a [`Checkpoint`] before every transaction and either commits it or rolls
//! it back, so a rejected transaction never leaks writes into the block. Once the block is
//! finalized, the accumulated [`StateChangeset`] is handed to a [`StateWriter`].

/// Sorted set of writes produced by a block.
pub mod changeset;
/// State access error type.
pub mod error;
/// The journaled overlay and its checkpoints.
pub mod intra_block;
/// In-memory backend implementing both the provider and writer traits.
pub mod memory;
/// Storage engine traits.
pub mod provider;

pub use changeset::StateChangeset;
pub use error::{BoxedStorageError, StateError};
pub use intra_block::{Checkpoint, IntraBlockState};
pub use memory::InMemoryState;
pub use provider::{Account, StateProvider, StateWriter};
