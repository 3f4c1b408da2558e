use crate::proxy::Pixmap;

/// A single icon of a tray item, as published on the bus: raw ARGB32 pixels
/// plus their dimensions. The pixel data is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub width: i32,
    pub height: i32,
    pub bytes: Vec<u8>,
}

impl Icon {
    fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }
}

/// The set of icons a tray item publishes for one of its icon slots.
///
/// Items typically provide the same image in several sizes; the set keeps
/// them sorted by pixel area so a host can pick the best fit in O(1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconSet {
    icons: Vec<Icon>,
}

impl IconSet {
    /// Build a set from the pixmap tuples of an `a(iiay)` property.
    ///
    /// Entries with non-positive dimensions or no pixel data are dropped.
    pub fn from_pixmaps(pixmaps: Vec<Pixmap>) -> Self {
        let mut icons: Vec<Icon> = pixmaps
            .into_iter()
            .filter(|p| p.width > 0 && p.height > 0 && !p.data.is_empty())
            .map(|p| Icon { width: p.width, height: p.height, bytes: p.data })
            .collect();
        icons.sort_by_key(Icon::area);
        Self { icons }
    }

    /// The icon with the smallest pixel area, if any.
    pub fn smallest(&self) -> Option<&Icon> {
        self.icons.first()
    }

    /// The icon with the largest pixel area, if any.
    pub fn largest(&self) -> Option<&Icon> {
        self.icons.last()
    }

    /// The icon best suited for rendering at `size`x`size` pixels: the
    /// smallest icon at least that large, or the largest one when none is.
    pub fn closest(&self, size: i32) -> Option<&Icon> {
        let wanted = i64::from(size.max(0)).pow(2);
        self.icons.iter().find(|icon| icon.area() >= wanted).or_else(|| self.largest())
    }

    /// All icons, ordered by ascending pixel area.
    pub fn all(&self) -> &[Icon] {
        &self.icons
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixmap(width: i32, height: i32, len: usize) -> Pixmap {
        Pixmap { width, height, data: vec![0u8; len] }
    }

    #[test]
    fn sorts_by_pixel_area() {
        let set = IconSet::from_pixmaps(vec![
            pixmap(32, 32, 4096),
            pixmap(16, 16, 512),
            pixmap(24, 24, 2304),
        ]);

        let areas: Vec<i64> = set.all().iter().map(Icon::area).collect();
        assert_eq!(areas, vec![256, 576, 1024]);
        assert_eq!(set.smallest().unwrap().width, 16);
        assert_eq!(set.largest().unwrap().height, 32);
    }

    #[test]
    fn drops_degenerate_entries() {
        let set = IconSet::from_pixmaps(vec![
            pixmap(0, 16, 64),
            pixmap(16, -1, 64),
            pixmap(16, 16, 0),
            pixmap(8, 8, 256),
        ]);

        assert_eq!(set.len(), 1);
        assert_eq!(set.smallest(), set.largest());
    }

    #[test]
    fn empty_set_has_no_endpoints() {
        let set = IconSet::from_pixmaps(Vec::new());
        assert!(set.is_empty());
        assert!(set.smallest().is_none());
        assert!(set.largest().is_none());
    }

    #[test]
    fn non_square_ordering_uses_area_not_width() {
        let set = IconSet::from_pixmaps(vec![pixmap(100, 1, 400), pixmap(8, 8, 256)]);
        assert_eq!(set.smallest().unwrap().width, 8);
        assert_eq!(set.largest().unwrap().width, 100);
    }

    #[test]
    fn closest_prefers_the_smallest_sufficient_icon() {
        let set = IconSet::from_pixmaps(vec![
            pixmap(16, 16, 512),
            pixmap(24, 24, 2304),
            pixmap(48, 48, 9216),
        ]);

        assert_eq!(set.closest(20).unwrap().width, 24);
        assert_eq!(set.closest(24).unwrap().width, 24);
        assert_eq!(set.closest(8).unwrap().width, 16);
    }

    #[test]
    fn closest_falls_back_to_the_largest_icon() {
        let set = IconSet::from_pixmaps(vec![pixmap(16, 16, 512), pixmap(32, 32, 4096)]);
        assert_eq!(set.closest(64).unwrap().width, 32);
        assert!(IconSet::default().closest(64).is_none());
    }
}
