//! Bidirectional sync between Bear and a Markdown folder.
//!
//! - **Export**: database snapshot → staging tree → published destinations
//! - **Detect**: files edited in the export folder since the last pass
//! - **Reconcile**: edited files → commands for the notes app
//! - **Status**: marker times and pending edits
//!
//! # Architecture
//!
//! Exports are written to a staging folder first and mirrored to every
//! destination afterwards, so a destination never holds a half-written tree.
//! Two marker files inside the export folder record when it was last
//! generated and when it was last checked; only their mtimes matter.
//!
//! The database is never written. Changes flow back into Bear as
//! [`NoteCommand`]s delivered through a [`CommandSink`].
//!
//! # Example
//!
//! ```ignore
//! use bearsync::sync::{SyncDriver, UrlOpener};
//!
//! let mut sink = UrlOpener::new(&config);
//! let report = SyncDriver::new(&config, &mut sink).run()?;
//! println!("{} files reconciled", report.reconcile.total());
//! ```

pub mod command;
pub mod detect;
pub mod driver;
pub mod export;
pub mod file;
pub mod images;
mod log;
pub mod publish;
pub mod reconcile;
pub mod state;
mod status;
mod types;

pub use command::{CommandSink, NoteCommand, RecordingSink, UrlOpener};
pub use detect::{ChangeSet, detect_changed, peek_changed};
pub use driver::{ExportReport, SyncDriver, SyncReport, check_db_modified};
pub use export::Exporter;
pub use log::ActionLog;
pub use publish::{PublishedDestination, mirror_images, publish};
pub use reconcile::Reconciler;
pub use state::SyncMarkers;
pub use status::{SyncStatus, get_sync_status, print_status};
pub use types::{
    ExportStats, FileReconciliation, ReconcileOutcome, ReconcileStats, SyncError, SyncResult,
};
