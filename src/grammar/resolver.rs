use serde::Serialize;

use super::{
    model::{utf16_to_byte_range, Category, Finding, Replacement, TextSnapshot},
    service::{CheckResponse, RawMatch},
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub findings: Vec<Finding>,
    pub discarded: usize,
}

/// Converts a raw response into findings that are guaranteed to fit inside
/// `snapshot`. Invalid matches are dropped one by one; the batch survives.
pub fn normalize(response: &CheckResponse, snapshot: &TextSnapshot) -> Normalized {
    let mut normalized = Normalized::default();

    for raw in &response.matches {
        match to_finding(raw, snapshot) {
            Some(finding) => normalized.findings.push(finding),
            None => {
                normalized.discarded += 1;
                log_debug!(
                    "discarding match offset={} length={} on surface {} (snapshot is {} units)",
                    raw.offset,
                    raw.length,
                    snapshot.surface(),
                    snapshot.len_utf16()
                );
            }
        }
    }

    normalized
}

fn to_finding(raw: &RawMatch, snapshot: &TextSnapshot) -> Option<Finding> {
    let offset = usize::try_from(raw.offset).ok()?;
    let length = usize::try_from(raw.length).ok().filter(|len| *len > 0)?;
    // also rejects ranges that cut through a surrogate pair
    snapshot.byte_range(offset, length)?;

    let (category, rule_id) = match &raw.rule {
        Some(rule) => (
            Category::from_service_id(&rule.category.id),
            Some(rule.id.clone()),
        ),
        None => (Category::Other, None),
    };

    Some(Finding {
        offset,
        length,
        message: raw.message.clone(),
        short_message: raw.short_message.clone().filter(|msg| !msg.is_empty()),
        category,
        replacements: raw
            .replacements
            .iter()
            .map(|replacement| Replacement::new(replacement.value.clone()))
            .collect(),
        rule_id,
    })
}

/// A finding's position in live content, in UTF-16 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedSpan),
    Stale,
}

impl Resolution {
    pub fn span(self) -> Option<ResolvedSpan> {
        match self {
            Resolution::Resolved(span) => Some(span),
            Resolution::Stale => None,
        }
    }
}

/// Locates `finding` in `live`. The live text must still agree with the
/// snapshot on everything up to the end of the finding; any edit before or
/// inside the span shifts or alters what the finding refers to.
pub fn resolve(finding: &Finding, snapshot: &TextSnapshot, live: &str) -> Resolution {
    let Some(snapshot_range) = snapshot.byte_range(0, finding.end()) else {
        return Resolution::Stale;
    };
    let Some(live_range) = utf16_to_byte_range(live, 0, finding.end()) else {
        return Resolution::Stale;
    };

    if snapshot.content()[snapshot_range] != live[live_range] {
        return Resolution::Stale;
    }

    Resolution::Resolved(ResolvedSpan {
        start: finding.offset,
        end: finding.end(),
    })
}
