use makepad_widgets::*;
use tracing::debug;

use crate::camera::MapCamera;
use crate::geo::{self, LatLng, TILE_SIZE};
use crate::map_state::MapState;
use crate::disk_cache::DiskCache;
use crate::tiles::{TileCache, TileCoord, TileSource};

live_design! {
    link widgets;
    use link::shaders::*;
    use link::widgets::*;
    use link::theme::*;

    // Map tile with a UV window so a scaled parent can stand in while loading
    DrawMapTile = {{DrawMapTile}} {
        texture tile_texture: texture2d
        has_texture: 0.0
        uv_offset: vec2(0.0, 0.0)
        uv_scale: vec2(1.0, 1.0)

        fn pixel(self) -> vec4 {
            if self.has_texture > 0.5 {
                let uv = self.uv_offset + self.pos * self.uv_scale;
                return sample2d(self.tile_texture, uv)
            }
            return vec4(0.95, 0.95, 0.95, 1.0)
        }
    }

    DrawMapMarker = {{DrawMapMarker}} {
        fn pixel(self) -> vec4 {
            let sdf = Sdf2d::viewport(self.pos * self.rect_size);
            let r = min(self.rect_size.x, self.rect_size.y) * 0.5;
            sdf.circle(r, r, r - 2.0);
            sdf.fill_keep(self.color);
            sdf.stroke(#ffffff, 2.0);
            return sdf.result
        }
    }

    // One polyline segment, endpoints relative to the quad
    DrawPathSegment = {{DrawPathSegment}} {
        fn pixel(self) -> vec4 {
            let sdf = Sdf2d::viewport(self.pos * self.rect_size);
            sdf.move_to(self.seg_start.x, self.seg_start.y);
            sdf.line_to(self.seg_end.x, self.seg_end.y);
            sdf.stroke(self.color, self.line_width);
            return sdf.result
        }
    }

    pub GeoMapViewBase = {{GeoMapView}} {
        draw_marker: {
            color: #2a81cb
        }
        path_color: #ff0000
        draw_attribution_bg: {
            color: #ffffffcc
        }
        draw_attribution_text: {
            color: #666666
            text_style: <THEME_FONT_REGULAR> {
                font_size: 9.0
            }
        }
    }

    pub GeoMapView = <GeoMapViewBase> {
        width: Fill,
        height: Fill,
    }
}

#[derive(Live, LiveRegister, LiveHook)]
#[repr(C)]
pub struct DrawMapTile {
    #[deref] pub draw_super: DrawQuad,
    #[live] pub has_texture: f32,
    #[live] pub uv_offset: Vec2,
    #[live] pub uv_scale: Vec2,
}

#[derive(Live, LiveRegister, LiveHook)]
#[repr(C)]
pub struct DrawMapMarker {
    #[deref] pub draw_super: DrawQuad,
    #[live] pub color: Vec4,
}

#[derive(Live, LiveRegister, LiveHook)]
#[repr(C)]
pub struct DrawPathSegment {
    #[deref] pub draw_super: DrawQuad,
    #[live] pub color: Vec4,
    #[live] pub seg_start: Vec2,
    #[live] pub seg_end: Vec2,
    #[live] pub line_width: f32,
}

#[derive(Clone, Debug, DefaultNone)]
pub enum GeoMapViewAction {
    None,
    RegionChanged {
        center: LatLng,
        zoom: f64,
    },
    Tapped(LatLng),
    LongPressed(LatLng),
}

/// Wheel zoom step
const SCROLL_ZOOM_STEP: f64 = 0.5;

/// Map surface showing OpenStreetMap tiles, one marker and one path.
///
/// Hosts drive it through [`GeoMapViewRef::set_location`],
/// [`GeoMapViewRef::set_zoom_level`] and [`GeoMapViewRef::draw_path`].
#[derive(Live, Widget)]
pub struct GeoMapView {
    #[walk] walk: Walk,
    #[redraw] #[live] pub draw_tile: DrawMapTile,
    #[live] draw_marker: DrawMapMarker,
    #[live] draw_segment: DrawPathSegment,

    #[live] draw_attribution_bg: DrawColor,
    #[live] draw_attribution_text: DrawText,
    #[live(true)] pub show_attribution: bool,
    /// Keep downloaded tiles in the platform cache directory
    #[live(true)] pub disk_cache: bool,

    // View at mount time
    #[live(0.0)] pub center_lat: f64,
    #[live(0.0)] pub center_lng: f64,
    #[live(2.0)] pub zoom: f64,
    #[live(1.0)] pub min_zoom: f64,
    #[live(19.0)] pub max_zoom: f64,
    #[live(1.0)] pub zoom_snap: f64,

    #[live(0.0)] pub fit_padding: f64,
    #[live] pub path_color: Vec4,
    #[live(3.0)] pub path_width: f64,
    #[live(18.0)] pub marker_size: f64,

    #[rust] map: MapState,
    #[rust] tile_cache: TileCache,
    #[rust] rect_pos: DVec2,

    #[rust] drag_start: Option<(DVec2, LatLng)>,
    #[rust] initial_pinch_distance: Option<f64>,
    #[rust] pinch_zoom_start: Option<f64>,
}

impl LiveHook for GeoMapView {
    fn after_new_from_doc(&mut self, _cx: &mut Cx) {
        let mut camera = MapCamera::default();
        camera.min_zoom = self.min_zoom;
        camera.max_zoom = self.max_zoom.max(self.min_zoom);
        camera.zoom_snap = self.zoom_snap;
        camera.set_view(LatLng::new(self.center_lat, self.center_lng), self.zoom);

        self.map = MapState::new(camera);
        self.map.fit_padding = self.fit_padding;
        let c = self.path_color;
        self.map.path_color = [c.x, c.y, c.z, c.w];
        self.map.path_width = self.path_width;
        let disk = if self.disk_cache { DiskCache::platform_default() } else { None };
        self.tile_cache = TileCache::new(self.map.tile_layer().clone()).with_disk_cache(disk);
        debug!(url = %self.map.tile_layer().url_template, "map view mounted");
    }
}

impl Widget for GeoMapView {
    fn handle_event(&mut self, cx: &mut Cx, event: &Event, scope: &mut Scope) {
        let uid = self.widget_uid();

        if let Event::NetworkResponses(responses) = event {
            for response in responses {
                match &response.response {
                    NetworkResponse::HttpResponse(http_response) => {
                        if self.tile_cache.handle_response(cx, response.request_id, http_response) {
                            self.draw_tile.redraw(cx);
                        }
                    }
                    NetworkResponse::HttpRequestError(error) => {
                        self.tile_cache.handle_error(response.request_id, error);
                    }
                    _ => {}
                }
            }
        }

        if let Event::TouchUpdate(te) = event {
            if te.touches.len() >= 2 {
                let d = te.touches[1].abs - te.touches[0].abs;
                let distance = (d.x * d.x + d.y * d.y).sqrt();

                match (self.initial_pinch_distance, self.pinch_zoom_start) {
                    (Some(initial), Some(start_zoom)) => {
                        let zoom = self.map.camera.clamp_zoom(start_zoom + (distance / initial).log2());
                        if (zoom - self.map.camera.zoom).abs() > 0.01 {
                            self.map.set_zoom_level(zoom);
                            self.draw_tile.redraw(cx);
                        }
                    }
                    _ => {
                        self.initial_pinch_distance = Some(distance);
                        self.pinch_zoom_start = Some(self.map.camera.zoom);
                    }
                }
                self.drag_start = None;
            }
        }

        match event.hits(cx, self.draw_tile.area()) {
            Hit::FingerDown(fe) if fe.is_primary_hit() => {
                cx.set_key_focus(self.draw_tile.area());
                self.drag_start = Some((fe.abs, self.map.camera.center));
            }
            Hit::FingerMove(fe) => {
                if self.initial_pinch_distance.is_none() {
                    if let Some((start, start_center)) = self.drag_start {
                        let delta = fe.abs - start;
                        self.map.camera.pan_from(start_center, delta.x, delta.y);
                        self.draw_tile.redraw(cx);
                    }
                }
            }
            Hit::FingerUp(fe) if fe.is_primary_hit() => {
                self.initial_pinch_distance = None;
                self.pinch_zoom_start = None;

                if fe.is_over && fe.tap_count == 1 && self.drag_start.is_some() {
                    let at = self.screen_to_geo(fe.abs);
                    cx.widget_action(uid, &scope.path, GeoMapViewAction::Tapped(at));
                } else if fe.is_over && fe.tap_count == 2 {
                    self.map.set_zoom_level(self.map.camera.zoom + 1.0);
                    self.draw_tile.redraw(cx);
                }
                self.drag_start = None;
                self.emit_region_changed(cx, uid, &scope.path);
            }
            Hit::FingerScroll(fe) => {
                let step = if fe.scroll.y > 0.0 { SCROLL_ZOOM_STEP } else { -SCROLL_ZOOM_STEP };
                let before = self.map.camera.zoom;
                self.map.set_zoom_level(before + step);
                if self.map.camera.zoom != before {
                    self.draw_tile.redraw(cx);
                    self.emit_region_changed(cx, uid, &scope.path);
                }
            }
            Hit::FingerLongPress(fe) => {
                let at = self.screen_to_geo(fe.abs);
                cx.widget_action(uid, &scope.path, GeoMapViewAction::LongPressed(at));
            }
            _ => {}
        }
    }

    fn draw_walk(&mut self, cx: &mut Cx2d, _scope: &mut Scope, walk: Walk) -> DrawStep {
        cx.begin_turtle(walk, Layout::default());
        let rect = cx.turtle().rect();
        self.rect_pos = rect.pos;
        self.map.set_viewport_size(rect.size.x, rect.size.y);

        self.draw_tiles(cx, rect);
        self.draw_path_overlay(cx, rect);
        self.draw_marker_overlay(cx, rect);
        if self.show_attribution {
            self.draw_attribution(cx, rect);
        }

        cx.end_turtle_with_area(&mut self.draw_tile.draw_super.draw_vars.area);
        DrawStep::done()
    }
}

impl GeoMapView {
    fn screen_to_geo(&self, abs: DVec2) -> LatLng {
        let local = abs - self.rect_pos;
        self.map.camera.screen_to_geo(local.x, local.y)
    }

    fn draw_tiles(&mut self, cx: &mut Cx2d, rect: Rect) {
        let camera = &self.map.camera;
        let tile_zoom = (camera.zoom.floor().max(0.0) as u8).min(19);
        let zoom_scale = 2.0_f64.powf(camera.zoom - tile_zoom as f64);
        let scaled_tile_size = TILE_SIZE * zoom_scale;
        let (center_x, center_y) = geo::project(camera.center, tile_zoom as f64);

        // world pixel span of the viewport at tile zoom
        let half_w = rect.size.x / 2.0 / zoom_scale;
        let half_h = rect.size.y / 2.0 / zoom_scale;
        let first_x = ((center_x - half_w) / TILE_SIZE).floor() as i64;
        let last_x = ((center_x + half_w) / TILE_SIZE).floor() as i64;
        let first_y = ((center_y - half_h) / TILE_SIZE).floor() as i64;
        let last_y = ((center_y + half_h) / TILE_SIZE).floor() as i64;
        let max_tile = 1i64 << tile_zoom;

        for ty in first_y.max(0)..=last_y.min(max_tile - 1) {
            for tx in first_x..=last_x {
                let coord = TileCoord {
                    x: tx.rem_euclid(max_tile) as u32,
                    y: ty as u32,
                    z: tile_zoom,
                };
                self.tile_cache.request_tile(cx.cx.cx, coord);

                if let Some(texture) = self.tile_cache.get_tile(&coord) {
                    self.draw_tile.draw_vars.set_texture(0, texture);
                    self.draw_tile.has_texture = 1.0;
                    self.draw_tile.uv_offset = vec2(0.0, 0.0);
                    self.draw_tile.uv_scale = vec2(1.0, 1.0);
                } else if let Some((texture, offset, scale)) = self.tile_cache.fallback_tile(&coord) {
                    self.draw_tile.draw_vars.set_texture(0, texture);
                    self.draw_tile.has_texture = 1.0;
                    self.draw_tile.uv_offset = vec2(offset[0], offset[1]);
                    self.draw_tile.uv_scale = vec2(scale, scale);
                } else {
                    self.draw_tile.has_texture = 0.0;
                }

                let tile_rect = Rect {
                    pos: dvec2(
                        rect.pos.x + rect.size.x / 2.0 + (tx as f64 * TILE_SIZE - center_x) * zoom_scale,
                        rect.pos.y + rect.size.y / 2.0 + (ty as f64 * TILE_SIZE - center_y) * zoom_scale,
                    ),
                    size: dvec2(scaled_tile_size, scaled_tile_size),
                };
                self.draw_tile.draw_abs(cx, tile_rect);
            }
        }
    }

    fn draw_path_overlay(&mut self, cx: &mut Cx2d, rect: Rect) {
        let Some(path) = self.map.path() else { return };
        let camera = &self.map.camera;
        let pad = path.width + 1.0;
        self.draw_segment.color = vec4(path.color[0], path.color[1], path.color[2], path.color[3]);
        self.draw_segment.line_width = path.width as f32;

        for (a, b) in path.segments() {
            let (ax, ay) = camera.geo_to_screen(a);
            let (bx, by) = camera.geo_to_screen(b);
            let min = dvec2(ax.min(bx) - pad, ay.min(by) - pad);
            let max = dvec2(ax.max(bx) + pad, ay.max(by) + pad);
            if max.x < 0.0 || max.y < 0.0 || min.x > rect.size.x || min.y > rect.size.y {
                continue;
            }
            self.draw_segment.seg_start = vec2((ax - min.x) as f32, (ay - min.y) as f32);
            self.draw_segment.seg_end = vec2((bx - min.x) as f32, (by - min.y) as f32);
            self.draw_segment.draw_abs(cx, Rect { pos: rect.pos + min, size: max - min });
        }
    }

    fn draw_marker_overlay(&mut self, cx: &mut Cx2d, rect: Rect) {
        let Some(marker) = self.map.marker() else { return };
        let (x, y) = self.map.camera.geo_to_screen(marker.position);
        let size = self.marker_size;
        self.draw_marker.draw_abs(cx, Rect {
            pos: dvec2(rect.pos.x + x - size / 2.0, rect.pos.y + y - size / 2.0),
            size: dvec2(size, size),
        });
    }

    fn draw_attribution(&mut self, cx: &mut Cx2d, rect: Rect) {
        let text = self.tile_cache.source().attribution_text();
        let margin = 6.0;
        let padding = 4.0;

        // rough text extent, glyphs at about half the font size
        let font_size = self.draw_attribution_text.text_style.font_size as f64;
        let text_width = text.chars().count() as f64 * font_size * 0.5;
        let text_height = font_size * 1.2;

        let bg = Rect {
            pos: dvec2(
                rect.pos.x + rect.size.x - margin - text_width - padding * 2.0,
                rect.pos.y + rect.size.y - margin - text_height - padding * 2.0,
            ),
            size: dvec2(text_width + padding * 2.0, text_height + padding * 2.0),
        };
        self.draw_attribution_bg.draw_abs(cx, bg);
        self.draw_attribution_text.draw_abs(cx, bg.pos + dvec2(padding, padding), &text);
    }

    fn emit_region_changed(&self, cx: &mut Cx, uid: WidgetUid, path: &HeapLiveIdPath) {
        cx.widget_action(
            uid,
            path,
            GeoMapViewAction::RegionChanged {
                center: self.map.camera.center,
                zoom: self.map.camera.zoom,
            },
        );
    }

    pub fn map_state(&self) -> &MapState {
        &self.map
    }

    /// Center the view on a coordinate and move the marker there.
    /// `zoom_level` defaults to 9.
    pub fn set_location(&mut self, cx: &mut Cx, latitude: f64, longitude: f64, zoom_level: Option<f64>) {
        self.map.set_location(latitude, longitude, zoom_level);
        self.draw_tile.redraw(cx);
    }

    pub fn set_zoom_level(&mut self, cx: &mut Cx, zoom_level: f64) {
        self.map.set_zoom_level(zoom_level);
        self.draw_tile.redraw(cx);
    }

    /// Replace the drawn path and fit the view to it
    pub fn draw_path(&mut self, cx: &mut Cx, path: &[LatLng]) {
        self.map.draw_path(path);
        self.draw_tile.redraw(cx);
    }

    pub fn clear_path(&mut self, cx: &mut Cx) {
        self.map.clear_path();
        self.draw_tile.redraw(cx);
    }

    pub fn set_tile_source(&mut self, cx: &mut Cx, source: TileSource) {
        self.tile_cache.set_source(source.clone());
        self.map.set_tile_layer(source);
        self.draw_tile.redraw(cx);
    }

    /// Forget every downloaded tile, in memory and on disk
    pub fn clear_tile_cache(&mut self, cx: &mut Cx) {
        self.tile_cache.clear();
        self.draw_tile.redraw(cx);
    }
}

impl GeoMapViewRef {
    pub fn set_location(&self, cx: &mut Cx, latitude: f64, longitude: f64, zoom_level: Option<f64>) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.set_location(cx, latitude, longitude, zoom_level);
        }
    }

    pub fn set_zoom_level(&self, cx: &mut Cx, zoom_level: f64) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.set_zoom_level(cx, zoom_level);
        }
    }

    pub fn draw_path(&self, cx: &mut Cx, path: &[LatLng]) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.draw_path(cx, path);
        }
    }

    pub fn clear_path(&self, cx: &mut Cx) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.clear_path(cx);
        }
    }

    pub fn set_tile_source(&self, cx: &mut Cx, source: TileSource) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.set_tile_source(cx, source);
        }
    }

    pub fn clear_tile_cache(&self, cx: &mut Cx) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.clear_tile_cache(cx);
        }
    }

    /// Current zoom, `None` when the ref is empty
    pub fn zoom_level(&self) -> Option<f64> {
        self.borrow().map(|inner| inner.map.camera.zoom)
    }

    fn action(&self, actions: &Actions) -> GeoMapViewAction {
        actions
            .find_widget_action(self.widget_uid())
            .map(|action| action.cast())
            .unwrap_or_default()
    }

    pub fn tapped(&self, actions: &Actions) -> Option<LatLng> {
        match self.action(actions) {
            GeoMapViewAction::Tapped(at) => Some(at),
            _ => None,
        }
    }

    pub fn long_pressed(&self, actions: &Actions) -> Option<LatLng> {
        match self.action(actions) {
            GeoMapViewAction::LongPressed(at) => Some(at),
            _ => None,
        }
    }

    pub fn region_changed(&self, actions: &Actions) -> Option<(LatLng, f64)> {
        match self.action(actions) {
            GeoMapViewAction::RegionChanged { center, zoom } => Some((center, zoom)),
            _ => None,
        }
    }
}
