//! Replay of queued writes against the review server.
//!
//! Favorite toggles and new reviews are written to the `queuedData` store
//! first. `QueueReplayer` sends them in key order whenever it runs, and
//! `SyncWorker` runs it in the background on a timer or on demand.

pub mod connectivity;
pub mod replay;
pub mod worker;

pub use connectivity::Connectivity;
pub use replay::{QueueReplayer, SyncReport};
pub use worker::{SyncEvent, SyncTrigger, SyncWorker};
