//! Core library for auditing advertising billing line-item exports.
//!
//! The pipeline parses a CSV or spreadsheet export, normalizes
//! heterogeneous column layouts onto a canonical [`LineItem`], derives the
//! inclusive months-spanned value, and flags items whose cost method and
//! time span point at a billing anomaly. Flagged items feed the
//! alert/review lifecycle, which persists its records through a pluggable
//! [`StateBackend`] and re-surfaces alerted items whose content drifted
//! since the alert (detected via a versioned content hash).
//!
//! No presentation layer or notification dispatcher lives here; callers
//! render the returned state and implement [`Notifier`] for outbound
//! side effects.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use db::{MemoryBackend, SqliteBackend, StateBackend};
pub use error::{AuditError, Result};
pub use models::*;
pub use services::flagging::{is_flagged, quantity_gap};
pub use services::ingest::{
    cpu_upload_history, ingest_cpu_validation_export, ingest_order_export, upload_history,
    HISTORY_CAP,
};
pub use services::lifecycle::{content_hash, AlertOutcome, LifecycleStore, CONTENT_HASH_VERSION};
pub use services::normalizer::{normalize_rows, Normalized};
pub use services::notify::{NotificationError, Notifier, NullNotifier};
pub use services::parser::{parse_table, Cell, RawTable, SourceFormat};
pub use services::temporal::{months_spanned, normalize_date, parse_flexible_date};
