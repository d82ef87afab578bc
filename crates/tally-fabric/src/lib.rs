//! Audit event fabric for Tally.
//!
//! Every state transition in the registry and the distribution engine is
//! appended here as a [`LedgerEvent`]. The journal is the durable audit trail
//! external indexers read to reconstruct history without replaying the
//! ledger; live consumers can subscribe with an [`EventFilter`].

pub mod error;
pub mod event;
pub mod journal;

pub use error::{FabricError, Result};
pub use event::{EventId, EventKind, EventPayload, EventSubject, LedgerEvent};
pub use journal::{EventFilter, EventJournal, EventStream};
