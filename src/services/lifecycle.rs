use std::collections::HashMap;

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::db::{
    read_json, write_json, StateBackend, KEY_ALERT_HISTORY, KEY_FINANCE_ALERTS, KEY_REVIEWED_ITEMS,
};
use crate::error::{AuditError, Result};
use crate::models::{AlertHistoryEntry, AlertRecord, AlertState, ItemStatus, LineItem, ReviewRecord};
use crate::services::flagging::is_flagged;
use crate::services::notify::Notifier;
use crate::utils::now_rfc3339;

/// Bump when the drift-sensitive tuple below changes; stored hashes from
/// older versions then read as drift and re-surface their items.
pub const CONTENT_HASH_VERSION: u32 = 1;

/// Deterministic fingerprint over the mutable business fields of a line
/// item. The sensitivity set is exactly this tuple: net cost, unit cost,
/// delivery percentage, approval status.
pub fn content_hash(item: &LineItem) -> String {
    let input = format!(
        "v{}|{}|{}|{}|{}",
        CONTENT_HASH_VERSION, item.net_cost, item.cpm, item.delivery_percent, item.approval_status
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of an alert transition that also dispatched a notification.
/// `dispatch_error` is populated when the outbound side effect failed; the
/// record itself is committed either way.
#[derive(Debug)]
pub struct AlertOutcome {
    pub record: AlertRecord,
    pub dispatch_error: Option<AuditError>,
}

/// Typed repository over the persisted lifecycle state. Holds a mutable
/// borrow of the backend for the duration of a user action; every read
/// path re-evaluates against freshly loaded records, nothing is cached.
pub struct LifecycleStore<'a, B: StateBackend> {
    backend: &'a mut B,
}

impl<'a, B: StateBackend> LifecycleStore<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        LifecycleStore { backend }
    }

    pub fn alerts(&self) -> Result<HashMap<String, AlertRecord>> {
        read_json(&*self.backend, KEY_FINANCE_ALERTS)
    }

    pub fn alert_history(&self) -> Result<Vec<AlertHistoryEntry>> {
        read_json(&*self.backend, KEY_ALERT_HISTORY)
    }

    pub fn reviewed_items(&self) -> Result<HashMap<String, ReviewRecord>> {
        read_json(&*self.backend, KEY_REVIEWED_ITEMS)
    }

    pub fn review_for(&self, line_item_id: &str) -> Result<Option<ReviewRecord>> {
        Ok(self.reviewed_items()?.remove(line_item_id))
    }

    /// Creates or overwrites the alert record for the item, stamping the
    /// current time and content hash. Re-alerting resets `alerted_at`.
    pub fn record_alert(
        &mut self,
        item: &LineItem,
        alerted_to: &str,
        alerted_by: &str,
    ) -> Result<AlertRecord> {
        let record = AlertRecord {
            line_item_id: item.id.clone(),
            order_id: item.order_id.clone(),
            client: item.client.clone(),
            alerted_at: now_rfc3339(),
            alerted_to: alerted_to.to_string(),
            resolved: false,
            resolved_at: None,
            ignored: false,
            saved_hash: content_hash(item),
        };

        let mut alerts = self.alerts()?;
        alerts.insert(record.line_item_id.clone(), record.clone());
        write_json(self.backend, KEY_FINANCE_ALERTS, &alerts)?;
        self.upsert_history(&record, Some(alerted_by))?;

        info!(
            line_item_id = %record.line_item_id,
            alerted_to = %record.alerted_to,
            "alert recorded"
        );
        Ok(record)
    }

    /// Persist-then-notify: the alert record is committed before dispatch,
    /// and a dispatch failure never rolls it back.
    pub fn record_alert_with_notification(
        &mut self,
        item: &LineItem,
        alerted_to: &str,
        alerted_by: &str,
        notifier: &dyn Notifier,
    ) -> Result<AlertOutcome> {
        let record = self.record_alert(item, alerted_to, alerted_by)?;

        let payload = json!({
            "lineItemId": record.line_item_id,
            "orderId": record.order_id,
            "client": record.client,
            "alertedAt": record.alerted_at,
            "alertedBy": alerted_by,
        });

        let dispatch_error = match notifier.notify(alerted_to, &payload) {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    line_item_id = %record.line_item_id,
                    error = %err,
                    "notification dispatch failed after alert was persisted"
                );
                Some(AuditError::NotificationDispatch(err.to_string()))
            }
        };

        Ok(AlertOutcome {
            record,
            dispatch_error,
        })
    }

    /// No-op when no alert record exists for the id.
    pub fn resolve_alert(&mut self, line_item_id: &str) -> Result<()> {
        self.resolve_all_alerts(&[line_item_id.to_string()])
            .map(|_| ())
    }

    /// Resolves every matching alert record; ids without a record are
    /// skipped. Returns how many records were actually resolved.
    pub fn resolve_all_alerts(&mut self, line_item_ids: &[String]) -> Result<usize> {
        let mut alerts = self.alerts()?;
        let now = now_rfc3339();
        let mut resolved_records = Vec::new();

        for id in line_item_ids {
            if let Some(record) = alerts.get_mut(id) {
                record.resolved = true;
                record.resolved_at = Some(now.clone());
                resolved_records.push(record.clone());
            }
        }

        if resolved_records.is_empty() {
            return Ok(0);
        }

        write_json(self.backend, KEY_FINANCE_ALERTS, &alerts)?;
        for record in &resolved_records {
            self.upsert_history(record, None)?;
        }

        info!(count = resolved_records.len(), "alerts resolved");
        Ok(resolved_records.len())
    }

    /// One-way: there is no un-ignore. Ignoring an item that was never
    /// alerted creates a minimal ignored record so the flag suppression
    /// still applies on subsequent reads.
    pub fn ignore_alert(&mut self, item: &LineItem) -> Result<()> {
        let mut alerts = self.alerts()?;
        match alerts.get_mut(&item.id) {
            Some(record) => record.ignored = true,
            None => {
                alerts.insert(
                    item.id.clone(),
                    AlertRecord {
                        line_item_id: item.id.clone(),
                        order_id: item.order_id.clone(),
                        client: item.client.clone(),
                        alerted_at: now_rfc3339(),
                        alerted_to: String::new(),
                        resolved: false,
                        resolved_at: None,
                        ignored: true,
                        saved_hash: content_hash(item),
                    },
                );
            }
        }
        write_json(self.backend, KEY_FINANCE_ALERTS, &alerts)?;
        info!(line_item_id = %item.id, "item ignored");
        Ok(())
    }

    /// Upserts the review record, silently overwriting prior notes.
    pub fn mark_as_reviewed(
        &mut self,
        line_item_id: &str,
        reviewer: &str,
        notes: &str,
    ) -> Result<ReviewRecord> {
        let record = ReviewRecord {
            line_item_id: line_item_id.to_string(),
            reviewer: reviewer.to_string(),
            timestamp: now_rfc3339(),
            notes: notes.to_string(),
        };

        let mut reviewed = self.reviewed_items()?;
        reviewed.insert(record.line_item_id.clone(), record.clone());
        write_json(self.backend, KEY_REVIEWED_ITEMS, &reviewed)?;
        Ok(record)
    }

    /// No-op when no review record exists.
    pub fn remove_review(&mut self, line_item_id: &str) -> Result<()> {
        let mut reviewed = self.reviewed_items()?;
        if reviewed.remove(line_item_id).is_some() {
            write_json(self.backend, KEY_REVIEWED_ITEMS, &reviewed)?;
        }
        Ok(())
    }

    /// Joins freshly computed line items against stored alert records.
    /// This is the one place persisted state overrides the flag evaluator:
    /// ignored records suppress the flag outright; a hash mismatch clears
    /// the alert metadata and forces the flag back on; a hash match
    /// displays the item as alerted. Must run on every read since the
    /// dataset may be re-ingested under the same ids at any time.
    pub fn apply_lifecycle(&self, items: &mut [LineItem]) -> Result<()> {
        let alerts = self.alerts()?;

        for item in items.iter_mut() {
            let record = match alerts.get(&item.id) {
                Some(record) => record,
                None => continue,
            };

            if record.ignored {
                item.has_flag = false;
                item.alerted_to.clear();
                continue;
            }

            let current = content_hash(item);
            if current != record.saved_hash {
                debug!(
                    line_item_id = %item.id,
                    "content drift since alert, item actionable again"
                );
                item.has_flag = true;
                item.alerted_to.clear();
            } else {
                item.has_flag = false;
                item.alerted_to = record.alerted_to.clone();
            }
        }

        Ok(())
    }

    /// Display state for one freshly computed item, before any join has
    /// touched it. Same precedence as `apply_lifecycle`, plus the
    /// orthogonal review axis.
    pub fn item_status(&self, item: &LineItem) -> Result<ItemStatus> {
        let reviewed = self.reviewed_items()?.contains_key(&item.id);
        let alerts = self.alerts()?;

        let state = match alerts.get(&item.id) {
            Some(record) if record.ignored => AlertState::Ignored,
            Some(record) => {
                if content_hash(item) != record.saved_hash {
                    AlertState::Flagged
                } else if record.resolved {
                    AlertState::Resolved
                } else {
                    AlertState::Alerted
                }
            }
            None => {
                if is_flagged(&item.cost_method, item.months_spanned) {
                    AlertState::Flagged
                } else {
                    AlertState::Unflagged
                }
            }
        };

        Ok(ItemStatus { state, reviewed })
    }

    fn upsert_history(&mut self, record: &AlertRecord, alerted_by: Option<&str>) -> Result<()> {
        let mut history: Vec<AlertHistoryEntry> = self.alert_history()?;

        match history
            .iter_mut()
            .find(|entry| entry.line_item_id == record.line_item_id)
        {
            Some(entry) => {
                entry.order_id = record.order_id.clone();
                entry.client = record.client.clone();
                entry.alerted_at = record.alerted_at.clone();
                entry.resolved = record.resolved;
                entry.resolved_at = record.resolved_at.clone();
                if let Some(by) = alerted_by {
                    entry.alerted_by = by.to_string();
                }
            }
            None => {
                history.insert(
                    0,
                    AlertHistoryEntry {
                        line_item_id: record.line_item_id.clone(),
                        order_id: record.order_id.clone(),
                        client: record.client.clone(),
                        alerted_at: record.alerted_at.clone(),
                        alerted_by: alerted_by.unwrap_or("").to_string(),
                        resolved: record.resolved,
                        resolved_at: record.resolved_at.clone(),
                    },
                );
                history.truncate(crate::services::ingest::HISTORY_CAP);
            }
        }

        write_json(self.backend, KEY_ALERT_HISTORY, &history)
    }
}
