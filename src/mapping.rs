//! Column mapping: which source column feeds which entry field.
//!
//! Mappings are auto-detected from header names after a parse completes and
//! then mutated only by explicit user edits. Header order is preserved; when
//! two headers target the same field, the first one in header order wins.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// EntryField
// ─────────────────────────────────────────────────────────────────────────────

/// The entry fields a source column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryField {
    /// The required external identifier of the entry.
    ExternalId,
    /// Optional human-readable name.
    DisplayName,
    /// Optional link back to the source system.
    ExternalUrl,
    /// Column is not mapped; its values land in `raw_data`.
    Skip,
}

impl EntryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryField::ExternalId => "external_id",
            EntryField::DisplayName => "display_name",
            EntryField::ExternalUrl => "external_url",
            EntryField::Skip => "skip",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ColumnMapping
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered mapping from header name to entry field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    fields: Vec<(String, EntryField)>,
}

impl ColumnMapping {
    /// Infers a mapping from header names.
    ///
    /// For each header, case-insensitive rules are applied in fixed priority
    /// order; the first matching rule wins:
    /// 1. external_id: exact `id` / `ext_id` / `externalid`, or contains
    ///    `external_id`
    /// 2. display_name: contains `name` or `title`, or exact `label`
    /// 3. external_url: contains `url`, `link`, or `href`
    ///
    /// Headers matching no rule are mapped to skip. Pure function of the
    /// header list: same headers, same mapping.
    pub fn auto_detect(headers: &[String]) -> Self {
        let fields = headers
            .iter()
            .map(|header| (header.clone(), detect_field(header)))
            .collect();
        Self { fields }
    }

    /// Returns the field the given header is mapped to.
    pub fn get(&self, header: &str) -> Option<EntryField> {
        self.fields
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, field)| *field)
    }

    /// Maps a header to a field, replacing any previous assignment for it.
    pub fn set(&mut self, header: &str, field: EntryField) {
        match self.fields.iter_mut().find(|(name, _)| name == header) {
            Some(entry) => entry.1 = field,
            None => self.fields.push((header.to_string(), field)),
        }
    }

    /// Returns the first header (in header order) mapped to the given field.
    ///
    /// `Skip` has no dedicated column; asking for it returns `None`.
    pub fn column_for(&self, field: EntryField) -> Option<&str> {
        if field == EntryField::Skip {
            return None;
        }
        self.fields
            .iter()
            .find(|(_, f)| *f == field)
            .map(|(name, _)| name.as_str())
    }

    /// True iff some header is mapped to `ExternalId`.
    ///
    /// This is the sole gate for progressing past the mapping step.
    pub fn is_valid(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, field)| *field == EntryField::ExternalId)
    }

    /// Iterates header/field pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EntryField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), *field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Applies the detection rules to a single header.
fn detect_field(header: &str) -> EntryField {
    let lower = header.trim().to_lowercase();

    if lower.contains("external_id")
        || lower == "id"
        || lower == "ext_id"
        || lower == "externalid"
    {
        EntryField::ExternalId
    } else if lower.contains("name") || lower.contains("title") || lower == "label" {
        EntryField::DisplayName
    } else if lower.contains("url") || lower.contains("link") || lower.contains("href") {
        EntryField::ExternalUrl
    } else {
        EntryField::Skip
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
