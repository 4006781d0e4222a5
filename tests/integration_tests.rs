use std::sync::Mutex;

use anyhow::Result;
use serde_json::Value;

use lineitem_audit::{
    ingest_order_export, upload_history, AlertState, AuditError, LifecycleStore, LineItem,
    MemoryBackend, NotificationError, Notifier, SqliteBackend,
};

const EXPORT_CSV: &str = "\
Line Item ID,Order ID,Order Name,Primary Advertiser,Line Item Cost Method,Order Owner,Net Line Item Cost,Net Line Item Unit Cost,Line Item Start Date,Line Item End Date,Line Item Quantity,Invoice Review Status
LI-1,O-1,Spring Push,Acme,CPU,jordan,1500,12.5,2024-01-01,2024-03-15,1,Pending
LI-2,O-1,Spring Push,Acme,CPM,jordan,800,4.0,2024-01-01,2024-03-15,120000,Approved
,O-2,Orphan,Globex,CPU,kim,100,1.0,2024-02-01,2024-02-28,1,Pending
";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ingest(backend: &mut impl lineitem_audit::StateBackend) -> Vec<LineItem> {
    let report = ingest_order_export(backend, EXPORT_CSV.as_bytes(), "export.csv").unwrap();
    report.items
}

#[test]
fn end_to_end_ingestion_flags_and_warns() -> Result<()> {
    init_tracing();
    let mut backend = MemoryBackend::new();
    let report = ingest_order_export(&mut backend, EXPORT_CSV.as_bytes(), "export.csv")?;

    // row without a Line Item ID is skipped, not fatal
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].reason.contains("Line Item ID"));

    let cpu = &report.items[0];
    assert_eq!(cpu.months_spanned, 3);
    assert!(cpu.has_flag);
    assert_eq!(cpu.net_cost, "$1500");

    let cpm = &report.items[1];
    assert_eq!(cpm.months_spanned, 3);
    assert!(!cpm.has_flag);

    let history = upload_history(&backend)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].item_count, 2);
    assert_eq!(history[0].flagged_count, 1);
    Ok(())
}

#[test]
fn alert_survives_reingestion_until_content_drifts() -> Result<()> {
    let mut backend = MemoryBackend::new();
    let items = ingest(&mut backend);
    let flagged = items.iter().find(|i| i.has_flag).unwrap().clone();

    LifecycleStore::new(&mut backend).record_alert(&flagged, "#finance", "sam")?;

    // identical re-ingest: alerted display, flag suppressed
    let mut fresh = ingest(&mut backend);
    let store = LifecycleStore::new(&mut backend);
    store.apply_lifecycle(&mut fresh)?;
    let same = fresh.iter().find(|i| i.id == flagged.id).unwrap();
    assert!(!same.has_flag);
    assert_eq!(same.alerted_to, "#finance");

    // drifted re-ingest: actionable again
    let drifted_csv = EXPORT_CSV.replace(",1500,", ",1750,");
    let report = ingest_order_export(&mut backend, drifted_csv.as_bytes(), "export.csv")?;
    let mut fresh = report.items;
    let store = LifecycleStore::new(&mut backend);
    store.apply_lifecycle(&mut fresh)?;
    let changed = fresh.iter().find(|i| i.id == flagged.id).unwrap();
    assert!(changed.has_flag);
    assert!(changed.alerted_to.is_empty());
    Ok(())
}

#[test]
fn lifecycle_state_survives_sqlite_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("audit.sqlite");

    {
        let mut backend = SqliteBackend::new(path.clone())?;
        let items = ingest(&mut backend);
        let flagged = items.iter().find(|i| i.has_flag).unwrap().clone();
        let mut store = LifecycleStore::new(&mut backend);
        store.record_alert(&flagged, "#finance", "sam")?;
        store.mark_as_reviewed("LI-2", "sam", "looks fine")?;
    }

    let mut backend = SqliteBackend::new(path)?;
    let mut fresh = ingest(&mut backend);
    let store = LifecycleStore::new(&mut backend);
    store.apply_lifecycle(&mut fresh)?;

    let alerted = fresh.iter().find(|i| i.id == "LI-1").unwrap();
    assert_eq!(alerted.alerted_to, "#finance");
    assert!(!alerted.has_flag);

    let status = store.item_status(fresh.iter().find(|i| i.id == "LI-2").unwrap())?;
    assert!(status.reviewed);
    assert_eq!(status.state, AlertState::Unflagged);
    Ok(())
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, Value)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, target: &str, payload: &Value) -> std::result::Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), payload.clone()));
        Ok(())
    }
}

#[test]
fn alert_notification_carries_item_identity() -> Result<()> {
    let mut backend = MemoryBackend::new();
    let items = ingest(&mut backend);
    let flagged = items.iter().find(|i| i.has_flag).unwrap().clone();

    let notifier = RecordingNotifier::default();
    let outcome = LifecycleStore::new(&mut backend).record_alert_with_notification(
        &flagged,
        "#finance",
        "sam",
        &notifier,
    )?;
    assert!(outcome.dispatch_error.is_none());

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#finance");
    assert_eq!(sent[0].1["lineItemId"], "LI-1");
    assert_eq!(sent[0].1["client"], "Acme");
    Ok(())
}

#[test]
fn empty_export_is_fatal_and_writes_nothing() {
    let mut backend = MemoryBackend::new();
    let err = ingest_order_export(&mut backend, b"Line Item ID\n", "empty.csv").unwrap_err();
    assert!(matches!(err, AuditError::Parse { .. }));
    assert!(upload_history(&backend).unwrap().is_empty());
}
