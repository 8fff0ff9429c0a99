use serde::Serialize;

use super::{
    host::{HostError, Notice, SurfaceHost},
    model::{utf16_len, Finding, Replacement, SurfaceId, TextSnapshot},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ApplyResult {
    Committed { text: String, caret: usize },
    /// The surface could not take the edit; the corrected text went to the
    /// clipboard instead.
    Fallback { text: String, reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub text: String,
    /// Just past the inserted replacement, in UTF-16 units.
    pub caret: usize,
}

/// `content[..offset] + replacement + content[offset + length..]`, computed on
/// the snapshot. `None` if the finding does not fit the snapshot.
pub fn corrected_text(
    snapshot: &TextSnapshot,
    finding: &Finding,
    replacement: &Replacement,
) -> Option<Correction> {
    let range = snapshot.byte_range(finding.offset, finding.length)?;
    let content = snapshot.content();

    let mut text = String::with_capacity(content.len() + replacement.value.len());
    text.push_str(&content[..range.start]);
    text.push_str(&replacement.value);
    text.push_str(&content[range.end..]);

    Some(Correction {
        text,
        caret: finding.offset + utf16_len(&replacement.value),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCorrection {
    pub text: String,
    pub applied: usize,
    /// Findings dropped because they overlap one already applied, or do not
    /// fit the snapshot.
    pub skipped: usize,
}

/// Applies every edit against the snapshot, highest offset first, so each
/// splice only moves text that has already been handled.
pub fn corrected_text_all(snapshot: &TextSnapshot, edits: &[(Finding, Replacement)]) -> BatchCorrection {
    let mut ordered: Vec<&(Finding, Replacement)> = edits.iter().collect();
    ordered.sort_by(|(a, _), (b, _)| {
        b.offset
            .cmp(&a.offset)
            .then_with(|| b.length.cmp(&a.length))
    });

    let mut text = snapshot.content().to_string();
    let mut applied = 0;
    let mut skipped = 0;
    // start of the leftmost edit applied so far, in snapshot units
    let mut floor = usize::MAX;

    for (finding, replacement) in ordered {
        if finding.end() > floor {
            skipped += 1;
            continue;
        }
        let Some(range) = snapshot.byte_range(finding.offset, finding.length) else {
            skipped += 1;
            continue;
        };
        text.replace_range(range, &replacement.value);
        floor = finding.offset;
        applied += 1;
    }

    BatchCorrection {
        text,
        applied,
        skipped,
    }
}

pub async fn apply<H: SurfaceHost>(
    host: &H,
    snapshot: &TextSnapshot,
    finding: &Finding,
    replacement: &Replacement,
) -> ApplyResult {
    let Some(correction) = corrected_text(snapshot, finding, replacement) else {
        return ApplyResult::Failed {
            reason: format!(
                "finding {}..{} does not fit the checked text",
                finding.offset,
                finding.end()
            ),
        };
    };

    commit_correction(host, snapshot.surface(), correction).await
}

pub async fn apply_all<H: SurfaceHost>(
    host: &H,
    snapshot: &TextSnapshot,
    edits: &[(Finding, Replacement)],
) -> (ApplyResult, BatchCorrection) {
    let batch = corrected_text_all(snapshot, edits);
    if batch.applied == 0 {
        let result = ApplyResult::Failed {
            reason: "no applicable corrections".into(),
        };
        return (result, batch);
    }

    let correction = Correction {
        caret: utf16_len(&batch.text),
        text: batch.text.clone(),
    };
    let result = commit_correction(host, snapshot.surface(), correction).await;
    (result, batch)
}

/// Writes the corrected text into the surface, or onto the clipboard when the
/// surface is gone or refuses the edit.
pub async fn commit_correction<H: SurfaceHost>(
    host: &H,
    surface: &SurfaceId,
    correction: Correction,
) -> ApplyResult {
    let Correction { text, caret } = correction;

    let err = match host.commit_text(surface, &text, caret).await {
        Ok(()) => return ApplyResult::Committed { text, caret },
        Err(err) => err,
    };

    log_warn!("direct commit into {} failed ({}); using clipboard", surface, err);
    clipboard_fallback(host, surface, text, err)
}

/// Hands a correction the surface cannot take to the clipboard and tells the
/// user about it.
pub fn clipboard_fallback<H: SurfaceHost>(
    host: &H,
    surface: &SurfaceId,
    text: String,
    err: HostError,
) -> ApplyResult {
    match host.write_clipboard_fallback(&text) {
        Ok(()) => {
            if let Err(notify_err) = host.notify(Notice::CopiedToClipboard) {
                log_warn!("could not show clipboard notice: {}", notify_err);
            }
            log_info!("correction for {} copied to clipboard", surface);
            ApplyResult::Fallback {
                text,
                reason: err.to_string(),
            }
        }
        Err(clipboard_err) => ApplyResult::Failed {
            reason: format!("{err}; clipboard fallback failed: {clipboard_err}"),
        },
    }
}
