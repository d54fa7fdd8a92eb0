use makepad_widgets::*;
use makepad_track_map::*;
use tracing::{info, warn};

live_design! {
    use link::theme::*;
    use link::shaders::*;
    use link::widgets::*;

    use makepad_track_map::map_view::GeoMapView;

    App = {{App}} {
        ui: <Root> {
            main_window = <Window> {
                window: { title: "Track Map" },
                body = <View> {
                    flow: Down,

                    <View> {
                        height: Fit,
                        flow: Right,
                        spacing: 10,
                        padding: { top: 6, bottom: 6, left: 10, right: 10 },
                        align: { y: 0.5 }
                        show_bg: true
                        draw_bg: { color: #2196F3 }

                        status_label = <Label> {
                            width: Fill,
                            height: Fit,
                            text: "Tap on the map"
                            draw_text: {
                                text_style: { font_size: 12.0 }
                                color: #fff
                            }
                        }
                        locate_btn = <Button> { text: "Paris" }
                        track_btn = <Button> { text: "Draw track" }
                        next_point_btn = <Button> { text: "Next point" }
                        zoom_in_btn = <Button> { text: "+" }
                        zoom_out_btn = <Button> { text: "-" }
                    }

                    <View> {
                        width: Fill,
                        height: Fill,

                        geo_map = <GeoMapView> {
                            width: Fill,
                            height: Fill,
                            fit_padding: 20.0
                        }
                    }
                }
            }
        }
    }
}

app_main!(App);

#[derive(Live, LiveHook)]
pub struct App {
    #[live] ui: WidgetRef,
    #[rust] track: GeoPath,
    #[rust] point_index: usize,
}

impl LiveRegister for App {
    fn live_register(cx: &mut Cx) {
        makepad_widgets::live_design(cx);
        makepad_track_map::live_design(cx);
    }
}

/// Track from the GPX or SRT file named on the command line, or a
/// triangle around Paris
fn load_track() -> GeoPath {
    if let Some(file) = std::env::args().nth(1) {
        match GeoPath::from_file(&file) {
            Ok(path) => {
                info!(%file, points = path.len(), km = path.total_distance(), "loaded track");
                return path;
            }
            Err(e) => warn!(%file, error = %e, "could not load track"),
        }
    }
    GeoPath::from_points([(48.8584, 2.2945), (48.8606, 2.3376), (48.8530, 2.3499), (48.8584, 2.2945)])
}

impl MatchEvent for App {
    fn handle_startup(&mut self, cx: &mut Cx) {
        self.ui.geo_map_view(ids!(geo_map)).set_location(cx, 48.8566, 2.3522, None);
    }

    fn handle_actions(&mut self, cx: &mut Cx, actions: &Actions) {
        let map = self.ui.geo_map_view(ids!(geo_map));
        let status = self.ui.label(ids!(status_label));

        if self.ui.button(ids!(locate_btn)).clicked(actions) {
            map.set_location(cx, 48.8566, 2.3522, Some(14.0));
        }

        if self.ui.button(ids!(track_btn)).clicked(actions) {
            self.track = load_track();
            self.point_index = 0;
            map.draw_path(cx, &self.track.latlngs());
            status.set_text(cx, &format!("{} points, {:.2} km", self.track.len(), self.track.total_distance()));
        }

        // step through the drawn track at the current zoom
        if self.ui.button(ids!(next_point_btn)).clicked(actions) && !self.track.is_empty() {
            let index = self.point_index % self.track.len();
            self.point_index = index + 1;
            if let Ok(point) = self.track.get(index) {
                map.set_location(cx, point.lat, point.lon, map.zoom_level());
                let (lat, lng) = point.as_dms();
                status.set_text(cx, &format!("Point {} of {}: {lat} {lng}", index + 1, self.track.len()));
                info!(index, info = %point.info(), "marked trackpoint");
            }
        }

        let step = if self.ui.button(ids!(zoom_in_btn)).clicked(actions) {
            1.0
        } else if self.ui.button(ids!(zoom_out_btn)).clicked(actions) {
            -1.0
        } else {
            0.0
        };
        if step != 0.0 {
            if let Some(zoom) = map.zoom_level() {
                map.set_zoom_level(cx, zoom + step);
                if let Some(zoom) = map.zoom_level() {
                    status.set_text(cx, &format!("Zoom: {:.1}", zoom));
                }
            }
        }

        if let Some(at) = map.tapped(actions) {
            let point = Trackpoint::new(at.lat, at.lng);
            let (lat, lng) = point.as_dms();
            status.set_text(cx, &format!("Tapped at {lat} {lng}"));
        } else if let Some(at) = map.long_pressed(actions) {
            map.set_location(cx, at.lat, at.lng, map.zoom_level());
        } else if let Some((center, zoom)) = map.region_changed(actions) {
            status.set_text(cx, &format!("Lat: {:.4}, Lng: {:.4}, Zoom: {:.1}", center.lat, center.lng, zoom));
        }
    }
}

impl AppMain for App {
    fn handle_event(&mut self, cx: &mut Cx, event: &Event) {
        self.match_event(cx, event);
        self.ui.handle_event(cx, event, &mut Scope::empty());
    }
}
