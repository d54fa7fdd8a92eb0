use crate::geo::{LatLng, LatLngBounds};

/// Red, as RGBA
pub const DEFAULT_PATH_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
pub const DEFAULT_PATH_WIDTH: f64 = 3.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub position: LatLng,
}

impl Marker {
    pub fn new(position: LatLng) -> Self {
        Self { position }
    }
}

/// Polyline drawn over the tiles
#[derive(Clone, Debug, PartialEq)]
pub struct PathOverlay {
    pub points: Vec<LatLng>,
    pub color: [f32; 4],
    pub width: f64,
}

impl PathOverlay {
    pub fn new(points: Vec<LatLng>) -> Self {
        Self {
            points,
            color: DEFAULT_PATH_COLOR,
            width: DEFAULT_PATH_WIDTH,
        }
    }

    pub fn with_style(mut self, color: [f32; 4], width: f64) -> Self {
        self.color = color;
        self.width = width;
        self
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(&self.points)
    }

    /// Consecutive point pairs
    pub fn segments(&self) -> impl Iterator<Item = (LatLng, LatLng)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

/// The overlays attached to a map surface: one slot per kind.
/// Writing a slot detaches whatever was there before.
#[derive(Clone, Debug, Default)]
pub struct OverlaySlots {
    marker: Option<Marker>,
    path: Option<PathOverlay>,
}

impl OverlaySlots {
    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    pub fn path(&self) -> Option<&PathOverlay> {
        self.path.as_ref()
    }

    /// Attach `marker`, returning the detached previous one
    pub fn replace_marker(&mut self, marker: Marker) -> Option<Marker> {
        self.marker.replace(marker)
    }

    /// Attach `path`, returning the detached previous one
    pub fn replace_path(&mut self, path: PathOverlay) -> Option<PathOverlay> {
        self.path.replace(path)
    }

    pub fn take_marker(&mut self) -> Option<Marker> {
        self.marker.take()
    }

    pub fn take_path(&mut self) -> Option<PathOverlay> {
        self.path.take()
    }

    pub fn attached_count(&self) -> usize {
        self.marker.is_some() as usize + self.path.is_some() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacing_detaches_previous() {
        let mut slots = OverlaySlots::default();
        assert!(slots.replace_marker(Marker::new(LatLng::new(1.0, 1.0))).is_none());
        let old = slots.replace_marker(Marker::new(LatLng::new(2.0, 2.0)));
        assert_eq!(old, Some(Marker::new(LatLng::new(1.0, 1.0))));
        assert_eq!(slots.marker().unwrap().position, LatLng::new(2.0, 2.0));
        assert_eq!(slots.attached_count(), 1);
    }

    #[test]
    fn path_segments() {
        let path = PathOverlay::new(vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), LatLng::new(2.0, 0.0)]);
        assert_eq!(path.segments().count(), 2);
        assert_eq!(path.color, DEFAULT_PATH_COLOR);
        assert!(PathOverlay::new(vec![LatLng::new(3.0, 3.0)]).segments().next().is_none());
    }
}
