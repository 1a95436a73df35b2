//! Row transformation: raw parsed rows + column mapping → normalized entry
//! records.
//!
//! Pure and order-preserving. Every row is classified exactly once: it either
//! yields a valid entry or increments the invalid count, so
//! `invalid_count + valid.len() == rows.len()` always holds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ingest::Row;
use crate::mapping::{ColumnMapping, EntryField};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// A normalized entry record, in the backend's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Non-empty, trimmed external identifier.
    pub external_id: String,
    /// Optional display name; never an empty string.
    pub display_name: Option<String>,
    /// Optional source URL; never an empty string.
    pub external_url: Option<String>,
    /// Unmapped column values keyed by their original header, or `None`
    /// when every column was mapped.
    pub raw_data: Option<Map<String, Value>>,
}

/// Result of transforming a row set.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    /// Entries that passed validation, in source-row order.
    pub valid: Vec<EntryRecord>,
    /// Number of rows rejected (missing or blank external id).
    pub invalid_count: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transform
// ─────────────────────────────────────────────────────────────────────────────

/// Converts raw rows into entry records using the given mapping.
///
/// Rows whose external-id cell is missing or blank after trimming are
/// counted invalid and excluded. When no header is mapped to the external id
/// at all, every row is invalid.
pub fn transform(headers: &[String], rows: &[Row], mapping: &ColumnMapping) -> TransformOutcome {
    let external_id_idx = column_index(headers, mapping, EntryField::ExternalId);
    let display_name_idx = column_index(headers, mapping, EntryField::DisplayName);
    let external_url_idx = column_index(headers, mapping, EntryField::ExternalUrl);

    let Some(external_id_idx) = external_id_idx else {
        return TransformOutcome {
            valid: Vec::new(),
            invalid_count: rows.len() as u64,
        };
    };

    // Columns that feed raw_data: mapped to skip, or absent from the mapping
    let raw_columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            matches!(mapping.get(header), None | Some(EntryField::Skip))
        })
        .map(|(i, _)| i)
        .collect();

    let mut valid = Vec::new();
    let mut invalid_count = 0u64;

    for row in rows {
        let external_id = match row.get(external_id_idx) {
            Some(cell) if !cell.trim().is_empty() => cell.trim().to_string(),
            _ => {
                invalid_count += 1;
                continue;
            }
        };

        let mut raw_data = Map::new();
        for &i in &raw_columns {
            if let Some(cell) = row.get(i) {
                raw_data.insert(headers[i].clone(), Value::String(cell.clone()));
            }
        }

        valid.push(EntryRecord {
            external_id,
            display_name: optional_cell(row, display_name_idx),
            external_url: optional_cell(row, external_url_idx),
            raw_data: if raw_data.is_empty() {
                None
            } else {
                Some(raw_data)
            },
        });
    }

    TransformOutcome {
        valid,
        invalid_count,
    }
}

/// Index of the first header mapped to the given field.
fn column_index(
    headers: &[String],
    mapping: &ColumnMapping,
    field: EntryField,
) -> Option<usize> {
    let column = mapping.column_for(field)?;
    headers.iter().position(|h| h == column)
}

/// Resolves an optional field: an unmapped column or an empty cell yields
/// `None`, never an empty string.
fn optional_cell(row: &Row, idx: Option<usize>) -> Option<String> {
    let cell = row.get(idx?)?;
    if cell.is_empty() {
        None
    } else {
        Some(cell.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
