use crate::error::{CoreError, Result};
use crate::types::*;
use crate::timeline::Timeline;
use uuid::Uuid;

/// Shortest range a trim handle can be dragged down to.
pub const MIN_TRIM_LENGTH: TimeUs = TimeUs(100_000);

impl Timeline {
    /// Insert a clip at `index` (0..=len).
    pub fn insert(&mut self, index: usize, clip: ClipDescriptor) -> Result<()> {
        let mut clips = self.descriptors();
        if index > clips.len() {
            return Err(CoreError::InvalidOperation(format!(
                "insert index {} out of bounds (timeline has {} clips)",
                index,
                clips.len()
            )));
        }
        clips.insert(index, clip);
        self.rebuild(clips)
    }

    /// Append a clip at the end of the timeline.
    pub fn push(&mut self, clip: ClipDescriptor) -> Result<()> {
        self.insert(self.len(), clip)
    }

    /// Remove a clip by id. A timeline cannot be emptied this way.
    pub fn remove(&mut self, clip_id: Uuid) -> Result<ClipDescriptor> {
        let idx = self.position(clip_id)?;
        if self.len() == 1 {
            return Err(CoreError::EmptyTimeline);
        }
        let mut clips = self.descriptors();
        let removed = clips.remove(idx);
        self.rebuild(clips)?;
        Ok(removed)
    }

    /// Move a clip to a different position in the render order.
    pub fn reorder(&mut self, clip_id: Uuid, new_index: usize) -> Result<()> {
        let idx = self.position(clip_id)?;
        if new_index >= self.len() {
            return Err(CoreError::InvalidOperation(format!(
                "new_index {} out of bounds (timeline has {} clips)",
                new_index,
                self.len()
            )));
        }
        let mut clips = self.descriptors();
        let clip = clips.remove(idx);
        clips.insert(new_index, clip);
        self.rebuild(clips)
    }

    /// Exchange the positions of two clips.
    pub fn swap(&mut self, a: Uuid, b: Uuid) -> Result<()> {
        let ia = self.position(a)?;
        let ib = self.position(b)?;
        let mut clips = self.descriptors();
        clips.swap(ia, ib);
        self.rebuild(clips)
    }

    /// Replace a clip's trim. `None` restores its full duration.
    pub fn retrim(&mut self, clip_id: Uuid, trim: Option<Trim>) -> Result<()> {
        let idx = self.position(clip_id)?;
        if let Some(t) = trim {
            t.validate()?;
        }
        let mut clips = self.descriptors();
        clips[idx].trim = trim;
        self.rebuild(clips)
    }

    /// Drag the in-point of a clip. The value is clamped so the clip keeps
    /// at least `MIN_TRIM_LENGTH`.
    pub fn trim_start(&mut self, clip_id: Uuid, new_start: TimeUs) -> Result<()> {
        let idx = self.position(clip_id)?;
        let current = self.current_trim(idx);
        let limit = current.end - MIN_TRIM_LENGTH;
        let start = new_start.min(limit).max(TimeUs::ZERO);
        self.retrim(clip_id, Some(Trim::new(start, current.end)?))
    }

    /// Drag the out-point of a clip, clamped to the source length and to
    /// `MIN_TRIM_LENGTH` past the in-point.
    pub fn trim_end(&mut self, clip_id: Uuid, new_end: TimeUs) -> Result<()> {
        let idx = self.position(clip_id)?;
        let current = self.current_trim(idx);
        let mut end = new_end.max(current.start + MIN_TRIM_LENGTH);
        if let Some(source_len) = self.source_length(idx) {
            end = end.min(source_len);
        }
        self.retrim(clip_id, Some(Trim::new(current.start, end)?))
    }

    /// Index of a clip in render order.
    pub fn position(&self, clip_id: Uuid) -> Result<usize> {
        self.clips()
            .iter()
            .position(|c| c.descriptor.id == clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))
    }

    /// The explicit trim of a clip, or its full range when untrimmed.
    fn current_trim(&self, idx: usize) -> Trim {
        let clip = &self.clips()[idx];
        clip.descriptor.trim.unwrap_or(Trim {
            start: TimeUs::ZERO,
            end: clip.effective_duration,
        })
    }

    fn source_length(&self, idx: usize) -> Option<TimeUs> {
        let clip = &self.clips()[idx].descriptor;
        match clip.kind {
            ClipKind::Video => clip.intrinsic_duration,
            ClipKind::Image => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::IMAGE_FALLBACK_DURATION;

    fn video(secs: f64) -> ClipDescriptor {
        ClipDescriptor::video("/tmp/clip.mp4").with_intrinsic_duration(TimeUs::from_seconds(secs))
    }

    fn starts(tl: &Timeline) -> Vec<TimeUs> {
        tl.clips().iter().map(|c| c.absolute_start).collect()
    }

    #[test]
    fn reorder_recomputes_all_starts() {
        let a = video(1.0);
        let b = video(2.0);
        let c = video(3.0);
        let c_id = c.id;
        let mut tl = Timeline::resolve(&[a, b, c]).unwrap();

        tl.reorder(c_id, 0).unwrap();

        assert_eq!(tl.clips()[0].descriptor.id, c_id);
        assert_eq!(
            starts(&tl),
            vec![TimeUs::ZERO, TimeUs::from_seconds(3.0), TimeUs::from_seconds(4.0)]
        );
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(6.0));
    }

    #[test]
    fn swap_two_clips() {
        let a = video(1.0);
        let b = video(4.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut tl = Timeline::resolve(&[a, b]).unwrap();

        tl.swap(a_id, b_id).unwrap();

        assert_eq!(tl.clips()[0].descriptor.id, b_id);
        assert_eq!(tl.clips()[1].absolute_start, TimeUs::from_seconds(4.0));
    }

    #[test]
    fn reorder_out_of_bounds() {
        let a = video(1.0);
        let id = a.id;
        let mut tl = Timeline::resolve(&[a]).unwrap();
        assert!(matches!(
            tl.reorder(id, 5).unwrap_err(),
            CoreError::InvalidOperation(_)
        ));
    }

    #[test]
    fn insert_and_remove() {
        let a = video(2.0);
        let mut tl = Timeline::resolve(&[a]).unwrap();
        let img = ClipDescriptor::image("/tmp/x.png");
        let img_id = img.id;

        tl.insert(0, img).unwrap();
        assert_eq!(tl.len(), 2);
        assert_eq!(tl.clips()[1].absolute_start, IMAGE_FALLBACK_DURATION);

        let removed = tl.remove(img_id).unwrap();
        assert_eq!(removed.id, img_id);
        assert_eq!(tl.clips()[0].absolute_start, TimeUs::ZERO);
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(2.0));
    }

    #[test]
    fn remove_last_clip_refused() {
        let a = video(2.0);
        let id = a.id;
        let mut tl = Timeline::resolve(&[a]).unwrap();
        assert!(matches!(tl.remove(id).unwrap_err(), CoreError::EmptyTimeline));
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn remove_unknown_clip() {
        let mut tl = Timeline::resolve(&[video(1.0)]).unwrap();
        assert!(matches!(
            tl.remove(Uuid::new_v4()).unwrap_err(),
            CoreError::ClipNotFound(_)
        ));
    }

    #[test]
    fn retrim_updates_following_starts() {
        let a = video(10.0);
        let b = video(2.0);
        let a_id = a.id;
        let mut tl = Timeline::resolve(&[a, b]).unwrap();

        tl.retrim(a_id, Some(Trim::from_seconds(1.0, 3.0).unwrap())).unwrap();

        assert_eq!(tl.clips()[0].effective_duration, TimeUs::from_seconds(2.0));
        assert_eq!(tl.clips()[1].absolute_start, TimeUs::from_seconds(2.0));

        tl.retrim(a_id, None).unwrap();
        assert_eq!(tl.clips()[1].absolute_start, TimeUs::from_seconds(10.0));
    }

    #[test]
    fn failed_edit_leaves_timeline_untouched() {
        let a = video(3.0);
        let a_id = a.id;
        let mut tl = Timeline::resolve(&[a]).unwrap();
        let before = tl.clone();

        let err = tl.retrim(a_id, Some(Trim { start: TimeUs(0), end: TimeUs::from_seconds(9.0) }));
        assert!(err.is_err());
        assert_eq!(tl, before);
    }

    #[test]
    fn trim_start_clamps_to_min_length() {
        let a = video(4.0);
        let id = a.id;
        let mut tl = Timeline::resolve(&[a]).unwrap();

        tl.trim_start(id, TimeUs::from_seconds(10.0)).unwrap();

        let trim = tl.clips()[0].descriptor.trim.unwrap();
        assert_eq!(trim.end, TimeUs::from_seconds(4.0));
        assert_eq!(trim.duration(), MIN_TRIM_LENGTH);
    }

    #[test]
    fn trim_end_clamps_to_source_length() {
        let a = video(4.0);
        let id = a.id;
        let mut tl = Timeline::resolve(&[a]).unwrap();

        tl.trim_end(id, TimeUs::from_seconds(8.0)).unwrap();
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(4.0));

        tl.trim_end(id, TimeUs::from_seconds(1.5)).unwrap();
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(1.5));
    }

    #[test]
    fn trim_image_end() {
        let img = ClipDescriptor::image("/tmp/a.png");
        let id = img.id;
        let mut tl = Timeline::resolve(&[img]).unwrap();

        tl.trim_end(id, TimeUs::from_seconds(12.0)).unwrap();
        assert_eq!(tl.total_duration(), TimeUs::from_seconds(12.0));
    }
}
