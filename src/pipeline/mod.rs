//! Pipeline entry points.
//!
//! - [`SyncOrchestrator`]: one sync run over every configured source
//! - [`BackupSet`]: destination snapshots backing `backup_and_restore`

mod backup;
mod sync;

pub use backup::BackupSet;
pub use sync::{SourceOutcome, SyncOrchestrator, SyncReport};
