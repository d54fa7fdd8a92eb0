//! Host-facing map operations, independent of any window or draw context.
//!
//! [`MapState`] is the map surface behind the `GeoMapView` widget: the camera,
//! the single tile layer and the marker/path overlay slots. The widget
//! forwards host calls here and only adds drawing and input handling.

use tracing::debug;

use crate::camera::MapCamera;
use crate::geo::{LatLng, LatLngBounds};
use crate::overlay::{Marker, OverlaySlots, PathOverlay, DEFAULT_PATH_COLOR, DEFAULT_PATH_WIDTH};
use crate::tiles::TileSource;

/// Zoom used by `set_location` when the caller gives none
pub const DEFAULT_LOCATION_ZOOM: f64 = 9.0;

#[derive(Clone, Debug)]
pub struct MapState {
    pub camera: MapCamera,
    overlays: OverlaySlots,
    tile_layer: TileSource,
    /// Fit requested before the viewport had a size
    pending_fit: Option<LatLngBounds>,
    pub fit_padding: f64,
    pub path_color: [f32; 4],
    pub path_width: f64,
}

impl Default for MapState {
    fn default() -> Self {
        Self::new(MapCamera::default())
    }
}

impl MapState {
    /// Create the map surface with the OpenStreetMap tile layer
    pub fn new(camera: MapCamera) -> Self {
        Self {
            camera,
            overlays: OverlaySlots::default(),
            tile_layer: TileSource::openstreetmap(),
            pending_fit: None,
            fit_padding: 0.0,
            path_color: DEFAULT_PATH_COLOR,
            path_width: DEFAULT_PATH_WIDTH,
        }
    }

    pub fn tile_layer(&self) -> &TileSource {
        &self.tile_layer
    }

    /// Swap the tile layer; the map keeps exactly one
    pub fn set_tile_layer(&mut self, source: TileSource) {
        self.tile_layer = source;
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.overlays.marker()
    }

    pub fn path(&self) -> Option<&PathOverlay> {
        self.overlays.path()
    }

    pub fn overlays(&self) -> &OverlaySlots {
        &self.overlays
    }

    /// Center on the coordinate at `zoom_level` (or [`DEFAULT_LOCATION_ZOOM`])
    /// and move the marker there. Drops a fit still waiting for layout.
    pub fn set_location(&mut self, latitude: f64, longitude: f64, zoom_level: Option<f64>) {
        let target = LatLng::new(latitude, longitude);
        self.pending_fit = None;
        self.camera.set_view(target, zoom_level.unwrap_or(DEFAULT_LOCATION_ZOOM));
        if let Some(previous) = self.overlays.take_marker() {
            debug!(lat = previous.position.lat, lng = previous.position.lng, "removing marker");
        }
        self.overlays.replace_marker(Marker::new(target));
        debug!(latitude, longitude, zoom = self.camera.zoom, "location set");
    }

    /// Change only the zoom level. Drops a fit still waiting for layout.
    pub fn set_zoom_level(&mut self, zoom_level: f64) {
        self.pending_fit = None;
        self.camera.set_zoom(zoom_level);
    }

    /// Replace the path overlay and fit the view to it.
    ///
    /// An empty path still replaces the overlay but leaves the view alone; a
    /// path of identical points only re-centers.
    pub fn draw_path(&mut self, path: &[LatLng]) {
        if let Some(previous) = self.overlays.take_path() {
            debug!(points = previous.points.len(), "removing path");
        }
        let overlay = PathOverlay::new(path.to_vec()).with_style(self.path_color, self.path_width);
        let bounds = overlay.bounds();
        self.overlays.replace_path(overlay);
        debug!(points = path.len(), "path drawn");

        match bounds {
            Some(bounds) => self.fit_bounds(bounds),
            None => self.pending_fit = None,
        }
    }

    /// Detach the path overlay, if any
    pub fn clear_path(&mut self) -> Option<PathOverlay> {
        self.pending_fit = None;
        self.overlays.take_path()
    }

    pub fn fit_bounds(&mut self, bounds: LatLngBounds) {
        if self.camera.fit_bounds(&bounds, self.fit_padding) {
            self.pending_fit = None;
        } else {
            debug!("viewport not laid out yet, deferring fit");
            self.pending_fit = Some(bounds);
        }
    }

    pub fn has_pending_fit(&self) -> bool {
        self.pending_fit.is_some()
    }

    /// Record the viewport size and apply a deferred fit once it is known
    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.camera.set_viewport_size(width, height);
        if let Some(bounds) = self.pending_fit {
            self.fit_bounds(bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn laid_out() -> MapState {
        let mut state = MapState::default();
        state.set_viewport_size(800.0, 600.0);
        state
    }

    fn triangle() -> Vec<LatLng> {
        vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), LatLng::new(2.0, 0.0)]
    }

    #[test]
    fn starts_with_osm_layer_and_no_overlays() {
        let state = MapState::default();
        assert_eq!(state.tile_layer().url_template, "http://{s}.tile.osm.org/{z}/{x}/{y}.png");
        assert_eq!(state.overlays().attached_count(), 0);
    }

    #[test]
    fn set_location_uses_default_zoom() {
        let mut state = laid_out();
        state.set_location(48.8566, 2.3522, None);
        assert_eq!(state.camera.center, LatLng::new(48.8566, 2.3522));
        assert_eq!(state.camera.zoom, 9.0);
        assert_eq!(state.marker().unwrap().position, LatLng::new(48.8566, 2.3522));
    }

    #[test]
    fn set_location_with_zoom() {
        let mut state = laid_out();
        state.set_location(48.8566, 2.3522, Some(14.0));
        assert_eq!(state.camera.zoom, 14.0);
    }

    #[test]
    fn consecutive_locations_keep_one_marker() {
        let mut state = laid_out();
        state.set_location(48.8566, 2.3522, None);
        state.set_location(52.52, 13.405, None);
        assert_eq!(state.overlays().attached_count(), 1);
        assert_eq!(state.marker().unwrap().position, LatLng::new(52.52, 13.405));
    }

    #[test]
    fn coordinates_are_not_validated() {
        let mut state = laid_out();
        state.set_location(123.0, -400.0, None);
        assert_eq!(state.marker().unwrap().position, LatLng::new(123.0, -400.0));
    }

    #[test]
    fn set_zoom_level_changes_only_zoom() {
        let mut state = laid_out();
        state.set_location(48.8566, 2.3522, Some(12.0));
        state.draw_path(&[LatLng::new(48.85, 2.35), LatLng::new(48.86, 2.36)]);
        let center = state.camera.center;
        let path = state.path().cloned();
        state.set_zoom_level(5.0);
        assert_eq!(state.camera.zoom, 5.0);
        assert_eq!(state.camera.center, center);
        assert_eq!(state.path().cloned(), path);
        assert_eq!(state.marker().unwrap().position, LatLng::new(48.8566, 2.3522));
    }

    #[test]
    fn draw_path_fits_view() {
        let mut state = laid_out();
        let points = triangle();
        state.draw_path(&points);
        let visible = state.camera.visible_bounds();
        assert!(points.iter().all(|p| visible.contains(p, 1e-9)));
        let path = state.path().unwrap();
        assert_eq!(path.points, points);
        assert_eq!(path.color, DEFAULT_PATH_COLOR);
    }

    #[test]
    fn second_path_replaces_first() {
        let mut state = laid_out();
        state.draw_path(&triangle());
        let second = vec![LatLng::new(10.0, 10.0), LatLng::new(11.0, 12.0)];
        state.draw_path(&second);
        assert_eq!(state.overlays().attached_count(), 1);
        assert_eq!(state.path().unwrap().points, second);
        let visible = state.camera.visible_bounds();
        assert!(second.iter().all(|p| visible.contains(p, 1e-9)));
    }

    #[test]
    fn empty_path_keeps_view() {
        let mut state = laid_out();
        state.set_location(48.8566, 2.3522, Some(12.0));
        state.draw_path(&[]);
        assert_eq!(state.camera.center, LatLng::new(48.8566, 2.3522));
        assert_eq!(state.camera.zoom, 12.0);
        assert!(state.path().unwrap().points.is_empty());
    }

    #[test]
    fn single_point_path_recenters() {
        let mut state = laid_out();
        state.set_location(0.0, 0.0, Some(7.0));
        state.draw_path(&[LatLng::new(10.0, 20.0)]);
        assert_eq!(state.camera.center, LatLng::new(10.0, 20.0));
        assert_eq!(state.camera.zoom, 7.0);
    }

    #[test]
    fn fit_waits_for_layout() {
        let mut state = MapState::default();
        state.draw_path(&triangle());
        assert!(state.has_pending_fit());
        state.set_viewport_size(800.0, 600.0);
        assert!(!state.has_pending_fit());
        assert_eq!(state.camera.zoom, 8.0);
        assert_relative_eq!(state.camera.center.lng, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn location_after_unlaid_path_wins() {
        let mut state = MapState::default();
        state.draw_path(&triangle());
        state.set_location(48.8566, 2.3522, Some(14.0));
        assert!(!state.has_pending_fit());
        state.set_viewport_size(800.0, 600.0);
        assert_eq!(state.camera.center, LatLng::new(48.8566, 2.3522));
        assert_eq!(state.camera.zoom, 14.0);
        assert_eq!(state.path().unwrap().points, triangle());
    }

    #[test]
    fn zoom_after_unlaid_path_wins() {
        let mut state = MapState::default();
        state.draw_path(&triangle());
        state.set_zoom_level(3.0);
        state.set_viewport_size(800.0, 600.0);
        assert_eq!(state.camera.zoom, 3.0);
    }
}
