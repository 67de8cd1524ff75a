//! Rectangle regions for non-trivial clips.
//!
//! A region is a set of device pixels stored as y-sorted, non-overlapping
//! boxes. The painter only ever combines regions by intersection (the work
//! region is the meta region restricted by the user region), so the
//! representation stays deliberately small: no band merging beyond what
//! intersection itself produces.

use crate::geom::IntBox;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    boxes: Vec<IntBox>,
}

impl Region {
    pub fn new() -> Self {
        Self { boxes: Vec::new() }
    }

    pub fn from_box(b: IntBox) -> Self {
        let mut region = Self::new();
        if b.is_valid() {
            region.boxes.push(b);
        }
        region
    }

    pub fn from_boxes(boxes: impl IntoIterator<Item = IntBox>) -> Self {
        let mut list: Vec<IntBox> = boxes.into_iter().filter(IntBox::is_valid).collect();
        list.sort_by_key(|b| (b.y0, b.x0));
        Self { boxes: list }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[IntBox] {
        &self.boxes
    }

    /// Bounding box of the region; an invalid box when empty.
    pub fn extents(&self) -> IntBox {
        let mut iter = self.boxes.iter();
        let Some(first) = iter.next() else {
            return IntBox::default();
        };
        let mut ext = *first;
        for b in iter {
            ext.x0 = ext.x0.min(b.x0);
            ext.y0 = ext.y0.min(b.y0);
            ext.x1 = ext.x1.max(b.x1);
            ext.y1 = ext.y1.max(b.y1);
        }
        ext
    }

    /// A region is simple when the clip-box fast path can stand in for it.
    pub fn is_simple(&self) -> bool {
        self.boxes.len() <= 1
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for b in &mut self.boxes {
            *b = b.translated(dx, dy);
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        let mut r = self.clone();
        r.translate(dx, dy);
        r
    }

    /// Intersection of two regions. Members of each region are disjoint, so
    /// pairwise box intersection already yields a disjoint result.
    pub fn intersect(a: &Region, b: &Region) -> Region {
        let mut out = Vec::new();
        for ba in &a.boxes {
            for bb in &b.boxes {
                let c = ba.intersected(bb);
                if c.is_valid() {
                    out.push(c);
                }
            }
        }
        out.sort_by_key(|b| (b.y0, b.x0));
        Region { boxes: out }
    }

    pub fn intersect_box(&self, clip: &IntBox) -> Region {
        Region::intersect(self, &Region::from_box(*clip))
    }

    /// Clips `b` against the region, appending surviving pieces to `out`.
    pub fn clip_box_into(&self, b: &IntBox, out: &mut Vec<IntBox>) {
        for rb in &self.boxes {
            let c = rb.intersected(b);
            if c.is_valid() {
                out.push(c);
            }
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.boxes.iter().any(|b| b.contains(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::Region;
    use crate::geom::IntBox;

    #[test]
    fn from_box_drops_degenerate_input() {
        assert!(Region::from_box(IntBox::new(0, 0, 0, 10)).is_empty());
        assert!(!Region::from_box(IntBox::new(0, 0, 1, 1)).is_empty());
    }

    #[test]
    fn intersect_of_overlapping_boxes() {
        let a = Region::from_boxes([IntBox::new(0, 0, 10, 5), IntBox::new(0, 5, 5, 10)]);
        let b = Region::from_box(IntBox::new(3, 3, 8, 8));
        let c = Region::intersect(&a, &b);
        assert_eq!(
            c.boxes(),
            &[IntBox::new(3, 3, 8, 5), IntBox::new(3, 5, 5, 8)]
        );
        assert_eq!(c.extents(), IntBox::new(3, 3, 8, 8));
    }

    #[test]
    fn simple_flag_tracks_box_count() {
        assert!(Region::new().is_simple());
        assert!(Region::from_box(IntBox::new(0, 0, 2, 2)).is_simple());
        let two = Region::from_boxes([IntBox::new(0, 0, 1, 1), IntBox::new(5, 5, 6, 6)]);
        assert!(!two.is_simple());
    }

    #[test]
    fn clip_box_into_collects_pieces() {
        let region = Region::from_boxes([IntBox::new(0, 0, 4, 4), IntBox::new(6, 0, 10, 4)]);
        let mut out = Vec::new();
        region.clip_box_into(&IntBox::new(2, 1, 8, 3), &mut out);
        assert_eq!(out, vec![IntBox::new(2, 1, 4, 3), IntBox::new(6, 1, 8, 3)]);
    }
}
