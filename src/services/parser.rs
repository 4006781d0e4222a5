use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::error::{AuditError, Result};
use crate::services::normalizer::columns;
use crate::utils::format_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_file_name(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("xlsx") | Some("xls") => Ok(SourceFormat::Spreadsheet),
            other => Err(AuditError::UnsupportedFileType(
                other.unwrap_or("").to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => format_number(*n),
            Cell::Empty => String::new(),
        }
    }
}

/// One parsed source file: a header row plus ordered data rows. Rows may be
/// shorter than the header when the source was ragged; lookups treat missing
/// cells as empty.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn parse_table(bytes: &[u8], format: SourceFormat) -> Result<RawTable> {
    let table = match format {
        SourceFormat::Csv => parse_csv(bytes)?,
        SourceFormat::Spreadsheet => parse_spreadsheet(bytes)?,
    };

    if table.rows.is_empty() {
        return Err(AuditError::Parse {
            reason: "source file contains no data rows".to_string(),
        });
    }

    let has_id_header = table
        .headers
        .iter()
        .any(|h| columns::LINE_ITEM_ID.contains(&h.as_str()));
    if !has_id_header {
        return Err(AuditError::Parse {
            reason: format!(
                "required header {:?} not found among {:?}",
                columns::LINE_ITEM_ID[0],
                table.headers
            ),
        });
    }

    Ok(table)
}

fn parse_csv(bytes: &[u8]) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| AuditError::Parse {
            reason: format!("CSV header: {e}"),
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AuditError::Parse {
            reason: format!("CSV row: {e}"),
        })?;
        let cells = record
            .iter()
            .map(|field| {
                let trimmed = field.trim();
                if trimmed.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        rows.push(cells);
    }

    Ok(RawTable { headers, rows })
}

fn parse_spreadsheet(bytes: &[u8]) -> Result<RawTable> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| AuditError::Parse {
        reason: format!("Spreadsheet: {e}"),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AuditError::Parse {
            reason: "spreadsheet contains no sheets".to_string(),
        })?
        .map_err(|e| AuditError::Parse {
            reason: format!("Spreadsheet sheet: {e}"),
        })?;

    let mut row_iter = range.rows();
    let headers = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|d| cell_from_data(d).to_text())
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for data_row in row_iter {
        let cells = data_row.iter().map(cell_from_data).collect::<Vec<_>>();
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        rows.push(cells);
    }

    Ok(RawTable { headers, rows })
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        // Excel serial dates land as ISO date strings so the normalizer
        // treats both sources identically.
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::Text(naive.format("%Y-%m-%d").to_string()),
            None => Cell::Empty,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
