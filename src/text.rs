// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::models::RawRecord;

/// Canonical text of one record, ready for the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub record_id: Option<String>,
    pub text: String,
}

/// Title and description joined by a single space, trimmed. Missing parts
/// count as empty. No truncation happens here.
pub fn assemble(record: &RawRecord) -> TextUnit {
    let text = format!(
        "{} {}",
        record.title.as_deref().unwrap_or(""),
        record.description.as_deref().unwrap_or("")
    );

    TextUnit {
        record_id: record.id.clone(),
        text: text.trim().to_string(),
    }
}

pub fn assemble_all(records: &[RawRecord]) -> Vec<TextUnit> {
    records.iter().map(assemble).collect()
}
