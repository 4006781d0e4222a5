use std::collections::HashMap;

use tracing::warn;

use crate::error::{AuditError, Result};
use crate::models::{LineItem, RowWarning};
use crate::services::flagging::is_flagged;
use crate::services::parser::{Cell, RawTable};
use crate::services::temporal::{months_spanned, normalize_date};
use crate::utils::{currency_text, parse_quantity};

/// Candidate source headers per canonical field, in fallback priority
/// order. Matching is exact and case-sensitive; the fallback applies at
/// the cell level, so an empty "Primary Advertiser" cell still falls
/// through to "Billing Account Name".
pub mod columns {
    pub const LINE_ITEM_ID: &[&str] = &["Line Item ID"];
    pub const ORDER_ID: &[&str] = &["Order ID"];
    pub const ORDER_NAME: &[&str] = &["Order Name", "Order"];
    pub const CLIENT: &[&str] = &["Primary Advertiser", "Billing Account Name"];
    pub const COST_METHOD: &[&str] = &["Line Item Cost Method", "Cost Method"];
    pub const ORDER_OWNER: &[&str] = &["Order Owner"];
    pub const NET_COST: &[&str] = &["Net Line Item Cost"];
    pub const UNIT_COST: &[&str] = &["Net Line Item Unit Cost", "CPM"];
    pub const APPROVAL_STATUS: &[&str] = &["Invoice Review Status"];
    pub const DELIVERY_PERCENT: &[&str] = &["Delivery Percentage", "Delivered %"];
    pub const START_DATE: &[&str] = &["Line Item Start Date", "Start Date"];
    pub const END_DATE: &[&str] = &["Line Item End Date", "End Date"];
    pub const QUANTITY: &[&str] = &["Line Item Quantity", "Quantity"];
    pub const MONTHS: &[&str] = &["Line Item Months", "Months"];
}

pub const UNKNOWN_CLIENT: &str = "Unknown Client";

/// Resolves canonical fields against whatever header layout the export
/// used, independent of column order.
struct ColumnResolver {
    index: HashMap<String, usize>,
}

impl ColumnResolver {
    fn new(headers: &[String]) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        ColumnResolver { index }
    }

    fn cell<'a>(&self, row: &'a [Cell], candidates: &[&str]) -> Option<&'a Cell> {
        // ragged rows simply lack the cell, which reads as empty
        candidates
            .iter()
            .filter_map(|name| self.index.get(*name))
            .filter_map(|&i| row.get(i))
            .find(|cell| !cell.is_empty())
    }

    fn text(&self, row: &[Cell], candidates: &[&str]) -> String {
        self.cell(row, candidates)
            .map(|cell| cell.to_text())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub items: Vec<LineItem>,
    pub warnings: Vec<RowWarning>,
}

/// Builds canonical line items from parsed rows. Rows without a Line Item
/// ID are skipped with a warning; if nothing survives the run fails.
pub fn normalize_rows(table: &RawTable) -> Result<Normalized> {
    let resolver = ColumnResolver::new(&table.headers);
    let mut items = Vec::new();
    let mut warnings = Vec::new();

    for (idx, row) in table.rows.iter().enumerate() {
        // header occupies row 1 in the source file
        let row_number = idx + 2;

        let id = resolver.text(row, columns::LINE_ITEM_ID);
        if id.is_empty() {
            warn!(row = row_number, "skipping row without Line Item ID");
            warnings.push(RowWarning {
                row: row_number,
                reason: "missing Line Item ID".to_string(),
            });
            continue;
        }

        let start_date = normalize_date(&resolver.text(row, columns::START_DATE));
        let end_date = normalize_date(&resolver.text(row, columns::END_DATE));
        let months_field = resolver.text(row, columns::MONTHS);
        let months = months_spanned(&start_date, &end_date, &months_field);

        let cost_method = resolver.text(row, columns::COST_METHOD);
        let client = {
            let value = resolver.text(row, columns::CLIENT);
            if value.is_empty() {
                UNKNOWN_CLIENT.to_string()
            } else {
                value
            }
        };

        let mut item = LineItem {
            id,
            order_id: resolver.text(row, columns::ORDER_ID),
            order_name: resolver.text(row, columns::ORDER_NAME),
            client,
            cost_method,
            order_owner: resolver.text(row, columns::ORDER_OWNER),
            start_date,
            end_date,
            quantity: parse_quantity(&resolver.text(row, columns::QUANTITY)),
            net_cost: currency_text(&resolver.text(row, columns::NET_COST)),
            cpm: currency_text(&resolver.text(row, columns::UNIT_COST)),
            delivery_percent: resolver.text(row, columns::DELIVERY_PERCENT),
            approval_status: resolver.text(row, columns::APPROVAL_STATUS),
            months_spanned: months,
            has_flag: false,
            alerted_to: String::new(),
        };
        item.has_flag = is_flagged(&item.cost_method, item.months_spanned);

        items.push(item);
    }

    if items.is_empty() {
        return Err(AuditError::NoValidLineItems);
    }

    Ok(Normalized { items, warnings })
}
