use std::{fmt, ops::Range, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of an editable element in the page. The injected script assigns
/// these; two surfaces are the same only if their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable capture of a surface's text at the moment a check was issued.
///
/// Offsets handed out by the grammar service and by the page are UTF-16 code
/// units, so the snapshot keeps its length in those units and translates
/// ranges to byte offsets on demand.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    surface: SurfaceId,
    content: Arc<str>,
    utf16_len: usize,
    captured_at: DateTime<Utc>,
}

impl TextSnapshot {
    pub fn capture(surface: SurfaceId, content: impl Into<String>) -> Self {
        let content: String = content.into();
        let utf16_len = utf16_len(&content);
        Self {
            surface,
            content: Arc::from(content),
            utf16_len,
            captured_at: Utc::now(),
        }
    }

    pub fn surface(&self) -> &SurfaceId {
        &self.surface
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len_utf16(&self) -> usize {
        self.utf16_len
    }

    pub fn byte_range(&self, offset: usize, length: usize) -> Option<Range<usize>> {
        utf16_to_byte_range(&self.content, offset, length)
    }

    pub fn slice(&self, offset: usize, length: usize) -> Option<&str> {
        self.byte_range(offset, length)
            .map(|range| &self.content[range])
    }
}

pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Maps a UTF-16 `offset..offset + length` range onto byte offsets of `text`.
///
/// Returns `None` when the range runs past the end of the text or when either
/// boundary falls between the two halves of a surrogate pair.
pub fn utf16_to_byte_range(text: &str, offset: usize, length: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(length)?;
    let start_byte = utf16_to_byte(text, offset)?;
    let end_byte = utf16_to_byte(text, end)?;
    Some(start_byte..end_byte)
}

fn utf16_to_byte(text: &str, target: usize) -> Option<usize> {
    let mut units = 0;
    for (byte_idx, ch) in text.char_indices() {
        if units == target {
            return Some(byte_idx);
        }
        units += ch.len_utf16();
        if units > target {
            return None;
        }
    }
    (units == target).then_some(text.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Typo,
    Grammar,
    Style,
    Other,
}

impl Category {
    /// Maps a LanguageTool `rule.category.id` onto the four buckets the UI
    /// distinguishes.
    pub fn from_service_id(id: &str) -> Self {
        match id.to_ascii_uppercase().as_str() {
            "TYPOS" => Category::Typo,
            "GRAMMAR" | "CONFUSED_WORDS" | "PUNCTUATION" | "CASING" => Category::Grammar,
            "STYLE" | "REDUNDANCY" | "TYPOGRAPHY" | "PLAIN_ENGLISH" => Category::Style,
            _ => Category::Other,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Category::Typo => Severity::High,
            Category::Grammar | Category::Style | Category::Other => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub value: String,
}

impl Replacement {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// One reported issue, positioned against the snapshot it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub offset: usize,
    pub length: usize,
    pub message: String,
    pub short_message: Option<String>,
    pub category: Category,
    /// Ranked by the service; the first entry is the default suggestion.
    pub replacements: Vec<Replacement>,
    pub rule_id: Option<String>,
}

impl Finding {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn default_replacement(&self) -> Option<&Replacement> {
        self.replacements.first()
    }

    pub fn overlaps(&self, other: &Finding) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Marker bound to exactly one finding in one surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSpan {
    pub id: Uuid,
    pub surface: SurfaceId,
    pub finding_index: usize,
    pub generation: u64,
    pub start: usize,
    pub end: usize,
    pub severity: Severity,
    pub message: String,
}

/// Viewport coordinates of the interaction that asked for a picker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PickerPosition {
    pub x: f64,
    pub y: f64,
}
