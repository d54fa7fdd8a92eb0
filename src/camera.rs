use crate::geo::{self, LatLng, LatLngBounds, MAX_LATITUDE};

/// What the map surface shows: a center, a fractional zoom and the size of
/// the viewport it is drawn into.
#[derive(Clone, Debug, PartialEq)]
pub struct MapCamera {
    pub center: LatLng,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Fitted zoom levels are snapped down to a multiple of this, 0 disables snapping
    pub zoom_snap: f64,
    viewport: (f64, f64),
}

impl Default for MapCamera {
    fn default() -> Self {
        Self {
            center: LatLng::new(0.0, 0.0),
            zoom: 1.0,
            min_zoom: 1.0,
            max_zoom: 19.0,
            zoom_snap: 1.0,
            viewport: (0.0, 0.0),
        }
    }
}

impl MapCamera {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        let mut camera = Self::default();
        camera.set_view(center, zoom);
        camera
    }

    pub fn viewport_size(&self) -> (f64, f64) {
        self.viewport
    }

    pub fn has_viewport(&self) -> bool {
        self.viewport.0 > 0.0 && self.viewport.1 > 0.0
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport = (width.max(0.0), height.max(0.0));
    }

    /// Clamp into the zoom range. An inverted range collapses to `min_zoom`.
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom.max(self.min_zoom))
    }

    /// Center on `center` at `zoom`. The coordinate is taken as is.
    pub fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.center = center;
        self.zoom = self.clamp_zoom(zoom);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = self.clamp_zoom(zoom);
    }

    /// Center in world pixels at the current zoom
    fn center_world(&self) -> (f64, f64) {
        geo::project(self.center, self.zoom)
    }

    /// Viewport-relative pixel position of a coordinate
    pub fn geo_to_screen(&self, point: LatLng) -> (f64, f64) {
        let (cx, cy) = self.center_world();
        let (px, py) = geo::project(point, self.zoom);
        (px - cx + self.viewport.0 / 2.0, py - cy + self.viewport.1 / 2.0)
    }

    /// Coordinate under a viewport-relative pixel position
    pub fn screen_to_geo(&self, x: f64, y: f64) -> LatLng {
        let (cx, cy) = self.center_world();
        geo::unproject(cx + x - self.viewport.0 / 2.0, cy + y - self.viewport.1 / 2.0, self.zoom)
    }

    /// Move the center so that the map follows a drag of `(dx, dy)` pixels
    /// that started while the map was centered on `start`.
    pub fn pan_from(&mut self, start: LatLng, dx: f64, dy: f64) {
        let (sx, sy) = geo::project(start, self.zoom);
        let mut center = geo::unproject(sx - dx, sy - dy, self.zoom);
        center.lat = center.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        center.lng = wrap_longitude(center.lng);
        self.center = center;
    }

    /// Geographic area currently on screen
    pub fn visible_bounds(&self) -> LatLngBounds {
        let (w, h) = self.viewport;
        let mut bounds = LatLngBounds::from_point(self.screen_to_geo(0.0, 0.0));
        bounds.extend(self.screen_to_geo(w, h));
        bounds
    }

    /// Largest zoom at which `bounds` fits the viewport minus `padding`
    /// pixels on each side. `None` without a viewport or when the bounds
    /// are a single point.
    pub fn bounds_zoom(&self, bounds: &LatLngBounds, padding: f64) -> Option<f64> {
        if !self.has_viewport() {
            return None;
        }
        let (x0, y0) = geo::project(LatLng::new(bounds.north(), bounds.west()), 0.0);
        let (x1, y1) = geo::project(LatLng::new(bounds.south(), bounds.east()), 0.0);
        let avail_w = (self.viewport.0 - 2.0 * padding).max(1.0);
        let avail_h = (self.viewport.1 - 2.0 * padding).max(1.0);
        // a flat box is fitted along its other axis only
        let fit = |avail: f64, span: f64| if span > 0.0 { avail / span } else { f64::INFINITY };
        let scale = fit(avail_w, (x1 - x0).abs()).min(fit(avail_h, (y1 - y0).abs()));
        if !scale.is_finite() {
            return None;
        }
        let mut zoom = scale.log2();
        if self.zoom_snap > 0.0 {
            zoom = (zoom / self.zoom_snap).floor() * self.zoom_snap;
        }
        Some(self.clamp_zoom(zoom))
    }

    /// Fit the view to `bounds`. A single point only re-centers.
    /// Returns false when there is no viewport yet and nothing changed.
    pub fn fit_bounds(&mut self, bounds: &LatLngBounds, padding: f64) -> bool {
        if !self.has_viewport() {
            return false;
        }
        match self.bounds_zoom(bounds, padding) {
            Some(zoom) => {
                let (x0, y0) = geo::project(LatLng::new(bounds.north(), bounds.west()), zoom);
                let (x1, y1) = geo::project(LatLng::new(bounds.south(), bounds.east()), zoom);
                self.center = geo::unproject((x0 + x1) / 2.0, (y0 + y1) / 2.0, zoom);
                self.zoom = zoom;
            }
            None => self.center = bounds.center(),
        }
        true
    }
}

fn wrap_longitude(mut lng: f64) -> f64 {
    while lng > 180.0 { lng -= 360.0; }
    while lng < -180.0 { lng += 360.0; }
    lng
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_800x600() -> MapCamera {
        let mut camera = MapCamera::new(LatLng::new(0.0, 0.0), 3.0);
        camera.set_viewport_size(800.0, 600.0);
        camera
    }

    #[test]
    fn center_maps_to_viewport_middle() {
        let mut camera = camera_800x600();
        camera.set_view(LatLng::new(48.8566, 2.3522), 9.0);
        let (x, y) = camera.geo_to_screen(camera.center);
        assert_relative_eq!(x, 400.0, epsilon = 1e-6);
        assert_relative_eq!(y, 300.0, epsilon = 1e-6);
        let back = camera.screen_to_geo(x, y);
        assert_relative_eq!(back.lat, 48.8566, epsilon = 1e-9);
        assert_relative_eq!(back.lng, 2.3522, epsilon = 1e-9);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = camera_800x600();
        camera.set_zoom(42.0);
        assert_eq!(camera.zoom, 19.0);
        camera.set_zoom(-3.0);
        assert_eq!(camera.zoom, 1.0);
    }

    #[test]
    fn inverted_zoom_range_does_not_panic() {
        let mut camera = camera_800x600();
        camera.min_zoom = 12.0;
        camera.max_zoom = 4.0;
        camera.set_zoom(7.0);
        assert_eq!(camera.zoom, 12.0);
        camera.set_view(LatLng::new(1.0, 2.0), 20.0);
        assert_eq!(camera.zoom, 12.0);
    }

    #[test]
    fn fit_bounds_encloses_points() {
        let mut camera = camera_800x600();
        let points = [LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), LatLng::new(2.0, 0.0)];
        let bounds = LatLngBounds::from_points(&points).unwrap();
        assert!(camera.fit_bounds(&bounds, 0.0));
        assert_eq!(camera.zoom, 8.0);
        let visible = camera.visible_bounds();
        assert!(points.iter().all(|p| visible.contains(p, 1e-9)));
    }

    #[test]
    fn unsnapped_fit_is_tight() {
        let mut camera = camera_800x600();
        camera.zoom_snap = 0.0;
        let bounds = LatLngBounds::from_points(&[LatLng::new(0.0, 0.0), LatLng::new(2.0, 1.0)]).unwrap();
        camera.fit_bounds(&bounds, 0.0);
        let (_, top) = camera.geo_to_screen(LatLng::new(2.0, 0.0));
        let (_, bottom) = camera.geo_to_screen(LatLng::new(0.0, 0.0));
        assert_relative_eq!(top, 0.0, epsilon = 1e-6);
        assert_relative_eq!(bottom, 600.0, epsilon = 1e-6);
    }

    #[test]
    fn fit_without_viewport_does_nothing() {
        let mut camera = MapCamera::new(LatLng::new(5.0, 5.0), 4.0);
        let bounds = LatLngBounds::from_points(&[LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)]).unwrap();
        assert!(!camera.fit_bounds(&bounds, 0.0));
        assert_eq!(camera.center, LatLng::new(5.0, 5.0));
        assert_eq!(camera.zoom, 4.0);
    }

    #[test]
    fn single_point_recenters_only() {
        let mut camera = camera_800x600();
        camera.set_zoom(6.0);
        camera.fit_bounds(&LatLngBounds::from_point(LatLng::new(10.0, 20.0)), 0.0);
        assert_eq!(camera.center, LatLng::new(10.0, 20.0));
        assert_eq!(camera.zoom, 6.0);
    }

    #[test]
    fn flat_bounds_fit_along_other_axis() {
        let mut camera = camera_800x600();
        let bounds = LatLngBounds::from_points(&[LatLng::new(0.0, 0.0), LatLng::new(0.0, 10.0)]).unwrap();
        camera.fit_bounds(&bounds, 0.0);
        // 800 px across 10 degrees: 2^z * 256 * 10 / 360 <= 800
        assert_eq!(camera.zoom, 6.0);
        assert_relative_eq!(camera.center.lng, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn pan_wraps_longitude() {
        let mut camera = camera_800x600();
        camera.set_view(LatLng::new(0.0, 179.0), 1.0);
        let start = camera.center;
        // one world width at zoom 1 is 512 px, 16 px is 11.25 degrees
        camera.pan_from(start, -16.0, 0.0);
        assert_relative_eq!(camera.center.lng, -169.75, epsilon = 1e-9);
    }
}
