// src/geometry.rs
//
// Buffer geometry for 4:2:0 planar images.
// Pure arithmetic: no engine calls. The decoder writes straight into buffers
// sized from these numbers, so they must be exact.

/// Pixel rectangle, half-open on the max side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Rect {
    /// Build a rectangle from two corners. Corners are swapped if reversed.
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Zero for a rectangle built with reversed corners.
    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    /// An empty rectangle disables crop/scale in decode options.
    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }
}

/// Chroma extent for a luma extent: `ceil(n / 2)`.
#[inline]
pub fn chroma_extent(luma: u32) -> u32 {
    luma.div_ceil(2)
}

/// Plane sizes for one contiguous `Y | Cb | Cr | [A]` allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub luma_width: u32,
    pub luma_height: u32,
    pub chroma_width: u32,
    pub chroma_height: u32,
    pub has_alpha: bool,
}

impl PlaneLayout {
    /// Compute the layout of a tightly packed planar image covering `rect`.
    ///
    /// Chroma dimensions depend only on the rectangle's size: the engine
    /// always samples chroma as `ceil(w/2) x ceil(h/2)` for a `w x h` picture,
    /// whatever origin the caller attached to it.
    pub fn compute(rect: Rect, has_alpha: bool) -> Self {
        let luma_width = rect.width();
        let luma_height = rect.height();
        Self {
            luma_width,
            luma_height,
            chroma_width: chroma_extent(luma_width),
            chroma_height: chroma_extent(luma_height),
            has_alpha,
        }
    }

    pub fn y_stride(&self) -> usize {
        self.luma_width as usize
    }

    pub fn c_stride(&self) -> usize {
        self.chroma_width as usize
    }

    pub fn a_stride(&self) -> usize {
        if self.has_alpha {
            self.luma_width as usize
        } else {
            0
        }
    }

    pub fn y_len(&self) -> usize {
        self.y_stride() * self.luma_height as usize
    }

    /// Size of one chroma plane (Cb and Cr are the same size).
    pub fn c_len(&self) -> usize {
        self.c_stride() * self.chroma_height as usize
    }

    pub fn a_len(&self) -> usize {
        if self.has_alpha {
            self.y_len()
        } else {
            0
        }
    }

    /// Byte count of the whole allocation: exactly the sum of the planes.
    pub fn total_len(&self) -> usize {
        self.y_len() + 2 * self.c_len() + self.a_len()
    }

    pub fn cb_offset(&self) -> usize {
        self.y_len()
    }

    pub fn cr_offset(&self) -> usize {
        self.y_len() + self.c_len()
    }

    pub fn a_offset(&self) -> usize {
        self.y_len() + 2 * self.c_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_normalizes_reversed_corners() {
        let r = Rect::new(300, 200, 100, 100);
        assert_eq!(r, Rect::new(100, 100, 300, 200));
        assert_eq!((r.width(), r.height()), (200, 100));
    }

    #[test]
    fn empty_rect_detection() {
        assert!(Rect::default().is_empty());
        assert!(Rect::new(5, 5, 5, 10).is_empty());
        assert!(!Rect::from_size(1, 1).is_empty());
    }

    #[test]
    fn literal_with_reversed_corners_is_empty() {
        let r = Rect {
            min_x: 5,
            min_y: 9,
            max_x: 1,
            max_y: 2,
        };
        assert_eq!((r.width(), r.height()), (0, 0));
        assert!(r.is_empty());
        let layout = PlaneLayout::compute(r, true);
        assert_eq!(layout.total_len(), 0);
    }

    #[test]
    fn even_dimensions_halve_exactly() {
        let layout = PlaneLayout::compute(Rect::from_size(640, 480), false);
        assert_eq!((layout.chroma_width, layout.chroma_height), (320, 240));
        assert_eq!(layout.total_len(), 640 * 480 + 2 * 320 * 240);
        assert_eq!(layout.a_len(), 0);
        assert_eq!(layout.a_stride(), 0);
    }

    #[test]
    fn odd_dimensions_round_up() {
        let layout = PlaneLayout::compute(Rect::from_size(1, 10), false);
        assert_eq!((layout.chroma_width, layout.chroma_height), (1, 5));

        let layout = PlaneLayout::compute(Rect::from_size(7, 3), true);
        assert_eq!((layout.chroma_width, layout.chroma_height), (4, 2));
        assert_eq!(layout.total_len(), 21 + 2 * 8 + 21);
    }

    #[test]
    fn odd_origin_does_not_change_chroma_size() {
        let at_origin = PlaneLayout::compute(Rect::from_size(5, 5), true);
        let shifted = PlaneLayout::compute(Rect::new(3, 1, 8, 6), true);
        assert_eq!(at_origin, shifted);
    }

    #[test]
    fn plane_offsets_are_back_to_back() {
        let layout = PlaneLayout::compute(Rect::from_size(9, 4), true);
        assert_eq!(layout.cb_offset(), 36);
        assert_eq!(layout.cr_offset(), 36 + 10);
        assert_eq!(layout.a_offset(), 36 + 20);
        assert_eq!(layout.a_offset() + layout.a_len(), layout.total_len());
    }
}
