use std::collections::HashMap;

use uuid::Uuid;

use super::{
    host::{HostError, PickerView, SurfaceHost},
    model::{AnnotationSpan, Finding, PickerPosition, SurfaceId, TextSnapshot},
};

pub const MAX_PICKER_CHOICES: usize = 5;

/// Tracks which spans are currently drawn in each surface and whether the
/// correction picker is open. One generation of spans per surface, one picker
/// for the whole page.
pub struct AnnotationRenderer {
    generations: HashMap<SurfaceId, SpanGeneration>,
    next_generation: u64,
    picker: Option<OpenPicker>,
    max_choices: usize,
}

struct SpanGeneration {
    generation: u64,
    spans: Vec<AnnotationSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPicker {
    pub surface: SurfaceId,
    pub finding_index: usize,
}

impl AnnotationRenderer {
    pub fn new(max_choices: usize) -> Self {
        Self {
            generations: HashMap::new(),
            next_generation: 1,
            picker: None,
            max_choices: max_choices.clamp(1, MAX_PICKER_CHOICES),
        }
    }

    /// Applies to pickers opened from now on.
    pub fn set_max_choices(&mut self, max_choices: usize) {
        self.max_choices = max_choices.clamp(1, MAX_PICKER_CHOICES);
    }

    /// Replaces every span previously drawn for the snapshot's surface with
    /// one span per finding. An empty `findings` slice just clears.
    pub fn render<H: SurfaceHost>(
        &mut self,
        host: &H,
        snapshot: &TextSnapshot,
        findings: &[Finding],
    ) -> Result<Vec<AnnotationSpan>, HostError> {
        let surface = snapshot.surface();
        self.clear(host, surface)?;

        if findings.is_empty() {
            return Ok(Vec::new());
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let spans: Vec<AnnotationSpan> = findings
            .iter()
            .enumerate()
            .map(|(finding_index, finding)| AnnotationSpan {
                id: Uuid::new_v4(),
                surface: surface.clone(),
                finding_index,
                generation,
                start: finding.offset,
                end: finding.end(),
                severity: finding.category.severity(),
                message: finding
                    .short_message
                    .clone()
                    .unwrap_or_else(|| finding.message.clone()),
            })
            .collect();

        host.mark_spans(surface, &spans)?;

        self.generations.insert(
            surface.clone(),
            SpanGeneration {
                generation,
                spans: spans.clone(),
            },
        );

        Ok(spans)
    }

    /// Removes the surface's spans from the page and closes a picker that
    /// belongs to it.
    pub fn clear<H: SurfaceHost>(&mut self, host: &H, surface: &SurfaceId) -> Result<(), HostError> {
        self.generations.remove(surface);
        if self.picker_is_on(surface) {
            self.dismiss_picker(host)?;
        }
        host.clear_spans(surface)
    }

    /// Drops state for a surface that has already left the page. Its spans
    /// went with it, but a picker opened on it is still on screen and gets
    /// dismissed. Returns whether that happened.
    pub fn release<H: SurfaceHost>(&mut self, host: &H, surface: &SurfaceId) -> Result<bool, HostError> {
        self.generations.remove(surface);
        if !self.picker_is_on(surface) {
            return Ok(false);
        }
        self.dismiss_picker(host)?;
        Ok(true)
    }

    pub fn spans(&self, surface: &SurfaceId) -> &[AnnotationSpan] {
        self.generations
            .get(surface)
            .map(|generation| generation.spans.as_slice())
            .unwrap_or(&[])
    }

    pub fn generation(&self, surface: &SurfaceId) -> Option<u64> {
        self.generations.get(surface).map(|generation| generation.generation)
    }

    pub fn open_picker(&self) -> Option<&OpenPicker> {
        self.picker.as_ref()
    }

    /// Opens the picker for a finding that currently has a span. Any picker
    /// already open is dismissed first. Returns `None` when the finding has no
    /// live span, e.g. after a newer check replaced it.
    pub fn show_picker<H: SurfaceHost>(
        &mut self,
        host: &H,
        position: PickerPosition,
        surface: &SurfaceId,
        finding_index: usize,
        finding: &Finding,
    ) -> Result<Option<PickerView>, HostError> {
        let has_span = self
            .spans(surface)
            .iter()
            .any(|span| span.finding_index == finding_index);
        if !has_span {
            return Ok(None);
        }

        if self.picker.is_some() {
            self.dismiss_picker(host)?;
        }

        let view = PickerView {
            surface: surface.clone(),
            finding_index,
            position,
            message: finding.message.clone(),
            replacements: finding
                .replacements
                .iter()
                .take(self.max_choices)
                .cloned()
                .collect(),
        };

        host.show_picker(&view)?;
        self.picker = Some(OpenPicker {
            surface: surface.clone(),
            finding_index,
        });

        Ok(Some(view))
    }

    pub fn dismiss_picker<H: SurfaceHost>(&mut self, host: &H) -> Result<(), HostError> {
        if self.picker.take().is_some() {
            host.dismiss_picker()?;
        }
        Ok(())
    }

    fn picker_is_on(&self, surface: &SurfaceId) -> bool {
        self.picker
            .as_ref()
            .is_some_and(|picker| &picker.surface == surface)
    }
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        Self::new(MAX_PICKER_CHOICES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::host::testing::{HostCall, RecordingHost};
    use crate::grammar::model::{Category, Replacement, Severity};

    fn finding(offset: usize, length: usize, category: Category, choices: &[&str]) -> Finding {
        Finding {
            offset,
            length,
            message: format!("issue at {offset}"),
            short_message: None,
            category,
            replacements: choices.iter().map(|c| Replacement::new(*c)).collect(),
            rule_id: None,
        }
    }

    fn snapshot() -> TextSnapshot {
        TextSnapshot::capture(SurfaceId::new("composer"), "I has a apple")
    }

    #[test]
    fn render_replaces_previous_generation() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let snap = snapshot();
        let surface = snap.surface().clone();

        let first = renderer
            .render(&host, &snap, &[finding(2, 3, Category::Typo, &["have"])])
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].severity, Severity::High);
        let first_generation = renderer.generation(&surface).unwrap();

        let second = renderer
            .render(
                &host,
                &snap,
                &[
                    finding(2, 3, Category::Grammar, &["have"]),
                    finding(6, 1, Category::Style, &["an"]),
                ],
            )
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|span| span.severity == Severity::Low));
        assert_eq!(second[1].finding_index, 1);
        assert!(renderer.generation(&surface).unwrap() > first_generation);
        assert_eq!(renderer.spans(&surface).len(), 2);

        let calls = host.calls();
        assert!(matches!(calls[0], HostCall::Clear(_)));
        assert!(matches!(calls[1], HostCall::Mark(_, ref spans) if spans.len() == 1));
        assert!(matches!(calls[2], HostCall::Clear(_)));
        assert!(matches!(calls[3], HostCall::Mark(_, ref spans) if spans.len() == 2));
    }

    #[test]
    fn zero_findings_clears_without_marking_or_picker() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let snap = snapshot();

        renderer
            .render(&host, &snap, &[finding(2, 3, Category::Typo, &["have"])])
            .unwrap();
        host.take_calls();

        let spans = renderer.render(&host, &snap, &[]).unwrap();
        assert!(spans.is_empty());
        assert!(renderer.spans(snap.surface()).is_empty());
        assert_eq!(host.calls(), vec![HostCall::Clear(snap.surface().clone())]);
        assert!(renderer.open_picker().is_none());
    }

    #[test]
    fn picker_is_single_instance_and_capped() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let snap = snapshot();
        let surface = snap.surface().clone();
        let findings = vec![
            finding(2, 3, Category::Typo, &["a", "b", "c", "d", "e", "f", "g"]),
            finding(6, 1, Category::Grammar, &["an"]),
        ];
        renderer.render(&host, &snap, &findings).unwrap();
        host.take_calls();

        let view = renderer
            .show_picker(&host, PickerPosition { x: 4.0, y: 9.0 }, &surface, 0, &findings[0])
            .unwrap()
            .unwrap();
        assert_eq!(view.replacements.len(), MAX_PICKER_CHOICES);
        assert_eq!(view.replacements[0].value, "a");

        renderer
            .show_picker(&host, PickerPosition::default(), &surface, 1, &findings[1])
            .unwrap();
        assert_eq!(
            renderer.open_picker(),
            Some(&OpenPicker {
                surface: surface.clone(),
                finding_index: 1
            })
        );

        let calls = host.calls();
        assert!(matches!(calls[0], HostCall::ShowPicker(_)));
        assert_eq!(calls[1], HostCall::DismissPicker);
        assert!(matches!(calls[2], HostCall::ShowPicker(ref v) if v.finding_index == 1));
    }

    #[test]
    fn lowered_cap_applies_to_next_picker() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let snap = snapshot();
        let findings = vec![finding(2, 3, Category::Typo, &["a", "b", "c", "d"])];
        renderer.render(&host, &snap, &findings).unwrap();

        renderer.set_max_choices(2);
        let view = renderer
            .show_picker(&host, PickerPosition::default(), snap.surface(), 0, &findings[0])
            .unwrap()
            .unwrap();
        assert_eq!(view.replacements.len(), 2);

        renderer.set_max_choices(0);
        let view = renderer
            .show_picker(&host, PickerPosition::default(), snap.surface(), 0, &findings[0])
            .unwrap()
            .unwrap();
        assert_eq!(view.replacements.len(), 1);
    }

    #[test]
    fn releasing_a_surface_dismisses_its_picker_only() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let snap = snapshot();
        let surface = snap.surface().clone();
        let other = SurfaceId::new("thread-reply");
        let findings = vec![finding(2, 3, Category::Typo, &["have"])];
        renderer.render(&host, &snap, &findings).unwrap();
        renderer
            .show_picker(&host, PickerPosition::default(), &surface, 0, &findings[0])
            .unwrap();
        host.take_calls();

        assert!(!renderer.release(&host, &other).unwrap());
        assert!(renderer.open_picker().is_some());

        assert!(renderer.release(&host, &surface).unwrap());
        assert!(renderer.open_picker().is_none());
        assert!(renderer.spans(&surface).is_empty());
        // spans left with the element, only the picker needs removing
        assert_eq!(host.calls(), vec![HostCall::DismissPicker]);
    }

    #[test]
    fn picker_needs_a_live_span() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let surface = SurfaceId::new("composer");
        let shown = renderer
            .show_picker(
                &host,
                PickerPosition::default(),
                &surface,
                0,
                &finding(0, 1, Category::Typo, &["x"]),
            )
            .unwrap();
        assert!(shown.is_none());
        assert!(host.calls().is_empty());
    }

    #[test]
    fn clearing_a_surface_dismisses_its_picker() {
        let host = RecordingHost::new();
        let mut renderer = AnnotationRenderer::default();
        let snap = snapshot();
        let surface = snap.surface().clone();
        let findings = vec![finding(2, 3, Category::Typo, &["have"])];
        renderer.render(&host, &snap, &findings).unwrap();
        renderer
            .show_picker(&host, PickerPosition::default(), &surface, 0, &findings[0])
            .unwrap();
        host.take_calls();

        renderer.clear(&host, &surface).unwrap();
        assert!(renderer.open_picker().is_none());
        assert_eq!(
            host.calls(),
            vec![HostCall::DismissPicker, HostCall::Clear(surface)]
        );
    }
}
