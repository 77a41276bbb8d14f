//! Client-side synchronization
//!
//! `list` holds the optimistic mutation state machine, `binding` ties it to
//! a live query for one service.

pub mod binding;
pub mod list;

pub use binding::{ListState, LiveCollection};
pub use list::{Keyed, MutationId, MutationState, SyncedList};
