use image::RgbaImage;

/// Stack of working-image snapshots, oldest first.
///
/// The bottom entry is the state right after the last load or crop. The stack
/// never drops below one entry, so there is always something to restore.
#[derive(Debug, Clone)]
pub struct UndoHistory {
    entries: Vec<RgbaImage>,
}

impl UndoHistory {
    pub fn new(seed: RgbaImage) -> Self {
        Self {
            entries: vec![seed],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn top(&self) -> &RgbaImage {
        // non-empty by construction
        &self.entries[self.entries.len() - 1]
    }

    pub fn can_undo(&self) -> bool {
        self.entries.len() > 1
    }

    /// Pushes a private copy of `candidate` unless it matches the top exactly.
    /// Returns whether a snapshot was added.
    pub fn push_if_changed(&mut self, candidate: &RgbaImage) -> bool {
        if same_pixels(self.top(), candidate) {
            return false;
        }
        self.entries.push(candidate.clone());
        true
    }

    /// Discards the top snapshot (if more than one remains) and returns a
    /// copy of the new top.
    pub fn undo(&mut self) -> RgbaImage {
        if self.can_undo() {
            self.entries.pop();
        }
        self.top().clone()
    }

    /// Drops every snapshot and installs `seed` as the only entry.
    pub fn reset(&mut self, seed: RgbaImage) {
        self.entries.clear();
        self.entries.push(seed);
    }
}

fn same_pixels(a: &RgbaImage, b: &RgbaImage) -> bool {
    a.dimensions() == b.dimensions() && a.as_raw() == b.as_raw()
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use super::UndoHistory;

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        ImageBuffer::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn fresh_history_cannot_undo() {
        let h = UndoHistory::new(solid(2, 2, 10));
        assert_eq!(h.len(), 1);
        assert!(!h.can_undo());
    }

    #[test]
    fn identical_candidate_is_pushed_once() {
        let mut h = UndoHistory::new(solid(2, 2, 10));
        assert!(h.push_if_changed(&solid(2, 2, 20)));
        assert!(!h.push_if_changed(&solid(2, 2, 20)));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn dimension_change_counts_as_change() {
        // Same byte count, different shape.
        let mut h = UndoHistory::new(solid(4, 1, 10));
        assert!(h.push_if_changed(&solid(1, 4, 10)));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn undo_stops_at_the_seed() {
        let mut h = UndoHistory::new(solid(2, 2, 1));
        h.push_if_changed(&solid(2, 2, 2));
        h.push_if_changed(&solid(2, 2, 3));

        assert_eq!(h.undo(), solid(2, 2, 2));
        assert_eq!(h.undo(), solid(2, 2, 1));
        assert!(!h.can_undo());
        assert_eq!(h.undo(), solid(2, 2, 1));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn snapshots_are_independent_of_the_candidate() {
        let mut h = UndoHistory::new(solid(2, 2, 1));
        let mut live = solid(2, 2, 5);
        h.push_if_changed(&live);
        live.put_pixel(0, 0, Rgba([99, 99, 99, 99]));
        assert_eq!(h.top(), &solid(2, 2, 5));
    }

    #[test]
    fn reset_reseeds_with_single_entry() {
        let mut h = UndoHistory::new(solid(2, 2, 1));
        h.push_if_changed(&solid(2, 2, 2));
        h.push_if_changed(&solid(2, 2, 3));
        h.reset(solid(3, 3, 7));
        assert_eq!(h.len(), 1);
        assert_eq!(h.top(), &solid(3, 3, 7));
    }
}
