use crate::error::{CoreError, Result};
use crate::types::*;
use serde::Serialize;

/// Display duration given to an untrimmed image.
pub const IMAGE_FALLBACK_DURATION: TimeUs = TimeUs(5_000_000);

// ---------------------------------------------------------------------------
// TimelineClip
// ---------------------------------------------------------------------------

/// A clip together with its resolved placement on the base timeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineClip {
    pub descriptor: ClipDescriptor,
    pub effective_duration: TimeUs,
    pub absolute_start: TimeUs,
}

impl TimelineClip {
    pub fn kind(&self) -> ClipKind {
        self.descriptor.kind
    }

    pub fn absolute_end(&self) -> TimeUs {
        self.absolute_start + self.effective_duration
    }

    /// Offset into the source at which rendering of this clip begins.
    pub fn source_offset(&self) -> TimeUs {
        self.descriptor
            .trim
            .map(|t| t.start)
            .unwrap_or(TimeUs::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// An ordered, gapless sequence of clips.
///
/// Placements are derived data: every edit rebuilds all of them from the
/// descriptor list, so a `Timeline` can never hold stale starts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Timeline {
    clips: Vec<TimelineClip>,
    total_duration: TimeUs,
    image_fallback: TimeUs,
}

impl Timeline {
    /// Resolve an ordered clip list using the default image duration.
    pub fn resolve(clips: &[ClipDescriptor]) -> Result<Self> {
        Self::resolve_with(clips, IMAGE_FALLBACK_DURATION)
    }

    /// Resolve an ordered clip list into absolute placements.
    ///
    /// Fails on an empty list, on an invalid trim, and on any video whose
    /// intrinsic duration is unknown. No partial timeline is ever returned.
    pub fn resolve_with(clips: &[ClipDescriptor], image_fallback: TimeUs) -> Result<Self> {
        if clips.is_empty() {
            return Err(CoreError::EmptyTimeline);
        }
        if image_fallback <= TimeUs::ZERO {
            return Err(CoreError::InvalidOperation(
                "image fallback duration must be positive".into(),
            ));
        }

        let mut resolved = Vec::with_capacity(clips.len());
        let mut cursor = TimeUs::ZERO;

        for (index, clip) in clips.iter().enumerate() {
            let effective_duration = effective_duration(index, clip, image_fallback)?;
            resolved.push(TimelineClip {
                descriptor: clip.clone(),
                effective_duration,
                absolute_start: cursor,
            });
            cursor = cursor + effective_duration;
        }

        Ok(Self {
            clips: resolved,
            total_duration: cursor,
            image_fallback,
        })
    }

    pub fn clips(&self) -> &[TimelineClip] {
        &self.clips
    }

    pub fn get(&self, index: usize) -> Option<&TimelineClip> {
        self.clips.get(index)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn total_duration(&self) -> TimeUs {
        self.total_duration
    }

    pub fn image_fallback(&self) -> TimeUs {
        self.image_fallback
    }

    /// Snapshot of the descriptors in timeline order.
    pub fn descriptors(&self) -> Vec<ClipDescriptor> {
        self.clips.iter().map(|c| c.descriptor.clone()).collect()
    }

    /// The clip covering `time` on the base timeline, if any.
    pub fn clip_at(&self, time: TimeUs) -> Option<(usize, &TimelineClip)> {
        self.clips
            .iter()
            .enumerate()
            .find(|(_, c)| time >= c.absolute_start && time < c.absolute_end())
    }

    /// Overlap between clip `index` and its successor during rendering.
    ///
    /// Zero for hard cuts and for the last clip. See [`Timeline::transition_windows`].
    pub fn transition_window(&self, index: usize, transition: &TransitionSpec) -> TimeUs {
        self.transition_windows(transition)
            .get(index)
            .copied()
            .unwrap_or(TimeUs::ZERO)
    }

    /// Overlap between every clip and its successor, one entry per clip.
    ///
    /// A window never exceeds the outgoing clip, nor the incoming clip, and a
    /// clip's incoming and outgoing windows together never exceed its length.
    /// Windows are fitted left to right, so a clip eaten entirely by its
    /// incoming transition hard-cuts to the next one.
    pub fn transition_windows(&self, transition: &TransitionSpec) -> Vec<TimeUs> {
        let mut windows = vec![TimeUs::ZERO; self.clips.len()];
        if transition.is_cut() {
            return windows;
        }
        let mut incoming = TimeUs::ZERO;
        for i in 0..self.clips.len().saturating_sub(1) {
            let dwell = self.clips[i].effective_duration - incoming;
            let w = transition
                .window
                .min(dwell)
                .min(self.clips[i + 1].effective_duration)
                .max(TimeUs::ZERO);
            windows[i] = w;
            incoming = w;
        }
        windows
    }

    /// Length of the rendered output once transitions overlap adjacent clips.
    pub fn render_duration(&self, transition: &TransitionSpec) -> TimeUs {
        let overlap: TimeUs = self.transition_windows(transition).into_iter().sum();
        self.total_duration - overlap
    }

    /// Replace the descriptor list, re-resolving every placement.
    /// Leaves `self` untouched on failure.
    pub(crate) fn rebuild(&mut self, clips: Vec<ClipDescriptor>) -> Result<()> {
        *self = Self::resolve_with(&clips, self.image_fallback)?;
        Ok(())
    }
}

fn effective_duration(index: usize, clip: &ClipDescriptor, image_fallback: TimeUs) -> Result<TimeUs> {
    if let Some(trim) = clip.trim {
        trim.validate()?;
        if let (ClipKind::Video, Some(intrinsic)) = (clip.kind, clip.intrinsic_duration) {
            if trim.end > intrinsic {
                return Err(CoreError::InvalidTrim(format!(
                    "clip {index}: trim end {} exceeds source duration {}",
                    trim.end, intrinsic
                )));
            }
        }
        return Ok(trim.duration());
    }

    match clip.kind {
        ClipKind::Image => Ok(image_fallback),
        ClipKind::Video => match clip.intrinsic_duration {
            Some(d) if d > TimeUs::ZERO => Ok(d),
            Some(_) => Err(CoreError::UnreadableMedia {
                index,
                path: clip.source.clone(),
                reason: "source reports zero duration".into(),
            }),
            None => Err(CoreError::UnreadableMedia {
                index,
                path: clip.source.clone(),
                reason: "duration unknown".into(),
            }),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn video(secs: f64) -> ClipDescriptor {
        ClipDescriptor::video("/tmp/clip.mp4").with_intrinsic_duration(TimeUs::from_seconds(secs))
    }

    #[test]
    fn resolve_empty_fails() {
        let err = Timeline::resolve(&[]).unwrap_err();
        assert!(matches!(err, CoreError::EmptyTimeline));
    }

    #[test]
    fn resolve_prefix_sums_starts() {
        let clips = vec![
            video(3.0),
            ClipDescriptor::image("/tmp/a.png"),
            video(10.0).with_trim(Trim::from_seconds(2.0, 4.5).unwrap()),
        ];
        let tl = Timeline::resolve(&clips).unwrap();

        assert_eq!(tl.len(), 3);
        assert_eq!(tl.clips()[0].absolute_start, TimeUs::ZERO);
        assert_eq!(tl.clips()[1].absolute_start, TimeUs::from_seconds(3.0));
        assert_eq!(tl.clips()[2].absolute_start, TimeUs::from_seconds(8.0));
        assert_eq!(tl.clips()[1].effective_duration, IMAGE_FALLBACK_DURATION);
        assert_eq!(tl.clips()[2].effective_duration, TimeUs::from_seconds(2.5));
        assert_eq!(tl.clips()[2].source_offset(), TimeUs::from_seconds(2.0));
    }

    #[test]
    fn total_duration_is_sum_of_effective_durations() {
        let clips = vec![video(1.5), video(2.25), ClipDescriptor::image("/tmp/b.png")];
        let tl = Timeline::resolve(&clips).unwrap();
        let sum: TimeUs = tl.clips().iter().map(|c| c.effective_duration).sum();
        assert_eq!(tl.total_duration(), sum);
        assert!(tl.clips().iter().all(|c| c.effective_duration > TimeUs::ZERO));
    }

    #[test]
    fn starts_are_non_decreasing_and_gapless() {
        let clips = vec![video(1.0), video(2.0), video(3.0)];
        let tl = Timeline::resolve(&clips).unwrap();
        for pair in tl.clips().windows(2) {
            assert!(pair[1].absolute_start >= pair[0].absolute_start);
            assert_eq!(pair[0].absolute_end(), pair[1].absolute_start);
        }
    }

    #[test]
    fn resolve_is_idempotent() {
        let clips = vec![video(4.0), ClipDescriptor::image("/tmp/c.png"), video(1.0)];
        let a = Timeline::resolve(&clips).unwrap();
        let b = Timeline::resolve(&clips).unwrap();
        let starts_a: Vec<_> = a.clips().iter().map(|c| c.absolute_start).collect();
        let starts_b: Vec<_> = b.clips().iter().map(|c| c.absolute_start).collect();
        assert_eq!(starts_a, starts_b);
    }

    #[test]
    fn unprobed_video_fails_whole_resolve() {
        let clips = vec![video(2.0), ClipDescriptor::video("/tmp/broken.mp4")];
        let err = Timeline::resolve(&clips).unwrap_err();
        match err {
            CoreError::UnreadableMedia { index, .. } => assert_eq!(index, 1),
            other => panic!("expected UnreadableMedia, got {other:?}"),
        }
    }

    #[test]
    fn zero_duration_video_is_unreadable() {
        let clips = vec![ClipDescriptor::video("/tmp/zero.mp4").with_intrinsic_duration(TimeUs::ZERO)];
        assert!(matches!(
            Timeline::resolve(&clips).unwrap_err(),
            CoreError::UnreadableMedia { .. }
        ));
    }

    #[test]
    fn zero_length_trim_from_json_is_rejected() {
        let clip: ClipDescriptor = serde_json::from_str(
            r#"{"kind":"image","source":"/tmp/a.png","trim":{"start":1000000,"end":1000000}}"#,
        )
        .unwrap();
        assert!(matches!(
            Timeline::resolve(&[clip]).unwrap_err(),
            CoreError::InvalidTrim(_)
        ));
    }

    #[test]
    fn trim_past_source_end_is_rejected() {
        let clip = video(3.0);
        let clip = ClipDescriptor {
            trim: Some(Trim::from_seconds(1.0, 4.0).unwrap()),
            ..clip
        };
        assert!(matches!(
            Timeline::resolve(&[clip]).unwrap_err(),
            CoreError::InvalidTrim(_)
        ));
    }

    #[test]
    fn custom_image_fallback() {
        let tl = Timeline::resolve_with(
            &[ClipDescriptor::image("/tmp/a.png")],
            TimeUs::from_seconds(2.0),
        )
        .unwrap();
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(2.0));
    }

    #[test]
    fn render_duration_subtracts_transition_overlaps() {
        let tl = Timeline::resolve(&[video(5.0), video(5.0)]).unwrap();
        let fade = TransitionSpec::new(TransitionKind::Fade);
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(10.0));
        assert_eq!(tl.render_duration(&fade), TimeUs::from_seconds(9.5));
        assert_eq!(tl.render_duration(&TransitionSpec::none()), TimeUs::from_seconds(10.0));
    }

    #[test]
    fn transition_window_clamped_to_short_clip() {
        let tl = Timeline::resolve(&[video(0.2), video(5.0)]).unwrap();
        let fade = TransitionSpec::new(TransitionKind::Fade);
        assert_eq!(tl.transition_window(0, &fade), TimeUs::from_seconds(0.2));
        assert_eq!(tl.transition_window(1, &fade), TimeUs::ZERO);
    }

    #[test]
    fn short_middle_clip_fits_both_windows() {
        let tl = Timeline::resolve(&[video(5.0), video(0.2), video(5.0)]).unwrap();
        let fade = TransitionSpec::new(TransitionKind::Fade);
        assert_eq!(
            tl.transition_windows(&fade),
            vec![TimeUs::from_seconds(0.2), TimeUs::ZERO, TimeUs::ZERO]
        );
        assert_eq!(tl.render_duration(&fade), TimeUs::from_seconds(10.0));

        let tl = Timeline::resolve(&[video(5.0), video(0.8), video(5.0)]).unwrap();
        let windows = tl.transition_windows(&fade);
        assert_eq!(windows[0], TimeUs::from_millis(500));
        assert_eq!(windows[1], TimeUs::from_millis(300));
        assert!(windows[0] + windows[1] <= TimeUs::from_seconds(0.8));
    }

    #[test]
    fn clip_at_lookup() {
        let tl = Timeline::resolve(&[video(1.0), video(2.0)]).unwrap();
        assert_eq!(tl.clip_at(TimeUs::from_seconds(0.5)).unwrap().0, 0);
        assert_eq!(tl.clip_at(TimeUs::from_seconds(1.0)).unwrap().0, 1);
        assert!(tl.clip_at(TimeUs::from_seconds(3.0)).is_none());
    }
}
