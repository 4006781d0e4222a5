use serde::{Deserialize, Serialize};

/// Canonical representation of one billable line of an advertising order.
/// Built fresh on every ingestion run and never persisted itself; lifecycle
/// records are joined against it by `id` at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub order_id: String,
    pub order_name: String,
    pub client: String,
    pub cost_method: String,
    pub order_owner: String,
    /// ISO-8601 when parseable, else the raw source string, else empty.
    pub start_date: String,
    pub end_date: String,
    pub quantity: f64,
    pub net_cost: String,
    pub cpm: String,
    pub delivery_percent: String,
    pub approval_status: String,
    pub months_spanned: i64,
    pub has_flag: bool,
    pub alerted_to: String,
}

/// One per line item ever alerted. Created on the first alert action,
/// mutated in place on resolve/ignore, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub line_item_id: String,
    pub order_id: String,
    pub client: String,
    pub alerted_at: String,
    pub alerted_to: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<String>,
    #[serde(default)]
    pub ignored: bool,
    /// Content fingerprint at alert time, see `lifecycle::content_hash`.
    pub saved_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub line_item_id: String,
    pub reviewer: String,
    pub timestamp: String,
    pub notes: String,
}

/// Denormalized display log, one entry per line item, upserted whenever
/// its AlertRecord changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    pub line_item_id: String,
    pub order_id: String,
    pub client: String,
    pub alerted_at: String,
    pub alerted_by: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadHistoryEntry {
    pub id: String,
    pub timestamp: String,
    pub file_name: String,
    pub item_count: usize,
    pub flagged_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged_cpu_multi_month_items: Option<usize>,
}

/// A single skipped row. Non-fatal: ingestion continues and the warning is
/// returned alongside the surviving items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowWarning {
    /// 1-based row number in the source file, counting the header as row 1.
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub items: Vec<LineItem>,
    pub warnings: Vec<RowWarning>,
    pub upload: UploadHistoryEntry,
}

#[derive(Debug, Clone)]
pub struct CpuValidationRow {
    pub item: LineItem,
    /// `quantity - months_spanned`; negative means under-allocation.
    pub quantity_gap: f64,
}

#[derive(Debug, Clone)]
pub struct CpuIngestReport {
    pub rows: Vec<CpuValidationRow>,
    pub warnings: Vec<RowWarning>,
    pub upload: UploadHistoryEntry,
}

/// Alert-axis state reconstructed from record presence, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Unflagged,
    Flagged,
    Alerted,
    Resolved,
    Ignored,
}

/// Per-item display state: the alert axis plus the orthogonal review axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatus {
    pub state: AlertState,
    pub reviewed: bool,
}
