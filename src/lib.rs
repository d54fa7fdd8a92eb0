pub use makepad_widgets;
pub use makepad_widgets::*;

pub mod camera;
pub mod disk_cache;
pub mod error;
pub mod geo;
pub mod map_state;
pub mod map_view;
pub mod overlay;
pub mod srt;
pub mod tiles;
pub mod track;

pub use camera::MapCamera;
pub use error::TrackError;
pub use geo::{LatLng, LatLngBounds};
pub use map_state::{MapState, DEFAULT_LOCATION_ZOOM};
pub use map_view::*;
pub use overlay::{Marker, PathOverlay};
pub use srt::SrtTrack;
pub use tiles::*;
pub use track::{GeoPath, Trackpoint};

pub fn live_design(cx: &mut Cx) {
    crate::map_view::live_design(cx);
}
