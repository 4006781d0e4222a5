use tracing::info;
use uuid::Uuid;

use crate::db::{read_json, write_json, StateBackend, KEY_CPU_UPLOAD_HISTORY, KEY_UPLOAD_HISTORY};
use crate::error::Result;
use crate::models::{CpuIngestReport, CpuValidationRow, IngestReport, UploadHistoryEntry};
use crate::services::flagging::quantity_gap;
use crate::services::normalizer::{normalize_rows, Normalized};
use crate::services::parser::{parse_table, SourceFormat};
use crate::utils::now_rfc3339;

/// Retention cap for the newest-first history lists. Entries past the cap
/// are dropped on append.
pub const HISTORY_CAP: usize = 200;

/// Standard pipeline: parse, normalize, derive months and flags, then
/// record the run. Nothing is persisted when parsing or normalization
/// fails, so a fatal error leaves prior state untouched.
pub fn ingest_order_export<B: StateBackend>(
    backend: &mut B,
    bytes: &[u8],
    file_name: &str,
) -> Result<IngestReport> {
    let normalized = run_pipeline(bytes, file_name)?;
    let flagged_count = normalized.items.iter().filter(|i| i.has_flag).count();

    let upload = UploadHistoryEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: now_rfc3339(),
        file_name: file_name.to_string(),
        item_count: normalized.items.len(),
        flagged_count,
        flagged_cpu_multi_month_items: None,
    };
    record_upload(backend, KEY_UPLOAD_HISTORY, &upload)?;

    info!(
        file = file_name,
        items = upload.item_count,
        flagged = upload.flagged_count,
        skipped = normalized.warnings.len(),
        "order export ingested"
    );

    Ok(IngestReport {
        items: normalized.items,
        warnings: normalized.warnings,
        upload,
    })
}

/// Validation variant: same pipeline, but each row additionally carries
/// its quantity gap against the months-spanned policy, and the run record
/// lands in the CPU upload history.
pub fn ingest_cpu_validation_export<B: StateBackend>(
    backend: &mut B,
    bytes: &[u8],
    file_name: &str,
) -> Result<CpuIngestReport> {
    let normalized = run_pipeline(bytes, file_name)?;

    let rows: Vec<CpuValidationRow> = normalized
        .items
        .into_iter()
        .map(|item| {
            let gap = quantity_gap(item.quantity, item.months_spanned);
            CpuValidationRow {
                item,
                quantity_gap: gap,
            }
        })
        .collect();

    let flagged = rows.iter().filter(|r| r.item.has_flag).count();
    let upload = UploadHistoryEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: now_rfc3339(),
        file_name: file_name.to_string(),
        item_count: rows.len(),
        flagged_count: flagged,
        flagged_cpu_multi_month_items: Some(flagged),
    };
    record_upload(backend, KEY_CPU_UPLOAD_HISTORY, &upload)?;

    info!(
        file = file_name,
        items = upload.item_count,
        flagged = upload.flagged_count,
        "CPU validation export ingested"
    );

    Ok(CpuIngestReport {
        rows,
        warnings: normalized.warnings,
        upload,
    })
}

pub fn upload_history<B: StateBackend>(backend: &B) -> Result<Vec<UploadHistoryEntry>> {
    read_json(backend, KEY_UPLOAD_HISTORY)
}

pub fn cpu_upload_history<B: StateBackend>(backend: &B) -> Result<Vec<UploadHistoryEntry>> {
    read_json(backend, KEY_CPU_UPLOAD_HISTORY)
}

fn run_pipeline(bytes: &[u8], file_name: &str) -> Result<Normalized> {
    let format = SourceFormat::from_file_name(file_name)?;
    let table = parse_table(bytes, format)?;
    normalize_rows(&table)
}

fn record_upload<B: StateBackend>(
    backend: &mut B,
    key: &str,
    entry: &UploadHistoryEntry,
) -> Result<()> {
    let mut history: Vec<UploadHistoryEntry> = read_json(&*backend, key)?;
    history.insert(0, entry.clone());
    history.truncate(HISTORY_CAP);
    write_json(backend, key, &history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::error::AuditError;

    const SCENARIO_CSV: &str = "\
Line Item ID,Order ID,Primary Advertiser,Line Item Cost Method,Line Item Start Date,Line Item End Date,Line Item Quantity
LI-1,O-1,Acme,CPU,2024-01-01,2024-03-15,1
";

    #[test]
    fn ingest_records_upload_history_newest_first() {
        let mut backend = MemoryBackend::new();
        ingest_order_export(&mut backend, SCENARIO_CSV.as_bytes(), "jan.csv").unwrap();
        ingest_order_export(&mut backend, SCENARIO_CSV.as_bytes(), "feb.csv").unwrap();

        let history = upload_history(&backend).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].file_name, "feb.csv");
        assert_eq!(history[1].file_name, "jan.csv");
        assert_eq!(history[0].item_count, 1);
        assert_eq!(history[0].flagged_count, 1);
    }

    #[test]
    fn cpu_variant_computes_gap_and_separate_ledger() {
        let mut backend = MemoryBackend::new();
        let report =
            ingest_cpu_validation_export(&mut backend, SCENARIO_CSV.as_bytes(), "cpu.csv").unwrap();

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].quantity_gap, -2.0);
        assert!(report.rows[0].item.has_flag);
        assert_eq!(report.upload.flagged_cpu_multi_month_items, Some(1));

        assert!(upload_history(&backend).unwrap().is_empty());
        assert_eq!(cpu_upload_history(&backend).unwrap().len(), 1);
    }

    #[test]
    fn fatal_parse_leaves_state_untouched() {
        let mut backend = MemoryBackend::new();
        ingest_order_export(&mut backend, SCENARIO_CSV.as_bytes(), "good.csv").unwrap();

        let err =
            ingest_order_export(&mut backend, b"Order ID\nO-1\n", "bad.csv").unwrap_err();
        assert!(matches!(err, AuditError::Parse { .. }));

        let history = upload_history(&backend).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].file_name, "good.csv");
    }

    #[test]
    fn unsupported_extension_fails_fast() {
        let mut backend = MemoryBackend::new();
        let err = ingest_order_export(&mut backend, SCENARIO_CSV.as_bytes(), "export.pdf")
            .unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedFileType(_)));
    }

    #[test]
    fn history_is_capped() {
        let mut backend = MemoryBackend::new();
        for i in 0..(HISTORY_CAP + 5) {
            ingest_order_export(
                &mut backend,
                SCENARIO_CSV.as_bytes(),
                &format!("run-{i}.csv"),
            )
            .unwrap();
        }

        let history = upload_history(&backend).unwrap();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].file_name, format!("run-{}.csv", HISTORY_CAP + 4));
    }
}
