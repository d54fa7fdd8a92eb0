//! Recorded tracks: timestamped points with distance and display helpers.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

use crate::error::{Result, TrackError};
use crate::geo::{LatLng, LatLngBounds};
use crate::srt::SrtTrack;

/// A 4D geographic trackpoint
#[derive(Clone, Debug, PartialEq)]
pub struct Trackpoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
}

impl Trackpoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, elevation: None, timestamp: None }
    }

    pub fn latlng(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }

    /// Degrees/minutes/seconds strings for latitude and longitude,
    /// e.g. `48° 29' 10.9500'' N`
    pub fn as_dms(&self) -> (String, String) {
        (
            format_dms(self.lat, if self.lat >= 0.0 { 'N' } else { 'S' }),
            format_dms(self.lon, if self.lon >= 0.0 { 'E' } else { 'W' }),
        )
    }

    pub fn google_maps_link(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lon)
    }

    /// HTML anchor to the Google Maps link, labelled with the DMS position
    pub fn google_maps_anchor(&self) -> String {
        let (lat, lon) = self.as_dms();
        format!(
            "<a href='{}' title='google maps' target='_blank'>{lat}{lon}</a>",
            self.google_maps_link()
        )
    }

    /// Timestamp line (when known) followed by the maps anchor
    pub fn info(&self) -> String {
        match self.timestamp {
            Some(timestamp) => format!("{timestamp}<br>\n{}", self.google_maps_anchor()),
            None => self.google_maps_anchor(),
        }
    }
}

fn format_dms(decimal: f64, direction: char) -> String {
    let degrees = decimal.trunc();
    let minutes = ((decimal - degrees) * 60.0).trunc();
    let seconds = (decimal - degrees - minutes / 60.0) * 3600.0;
    format!(
        "{}\u{00B0} {}' {:.4}'' {}",
        degrees.abs() as i64,
        minutes.abs() as i64,
        seconds.abs(),
        direction
    )
}

/// Great circle distance between two trackpoints in kilometers
pub fn haversine_distance(a: &Trackpoint, b: &Trackpoint) -> f64 {
    a.latlng().distance_km(&b.latlng())
}

/// Ordered trackpoints, as recorded
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoPath {
    pub name: Option<String>,
    pub points: Vec<Trackpoint>,
}

impl GeoPath {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), points: Vec::new() }
    }

    pub fn from_points<I, P>(points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LatLng>,
    {
        let mut path = Self::default();
        for point in points {
            let p = point.into();
            path.add_point(p.lat, p.lng, None, None);
        }
        path
    }

    /// Every trackpoint of every track segment in a GPX document
    pub fn from_gpx(gpx_text: &str) -> Result<Self> {
        let gpx = gpx::read(gpx_text.as_bytes())?;
        let mut path = Self::default();
        path.name = gpx.tracks.iter().find_map(|track| track.name.clone());
        for segment in gpx.tracks.iter().flat_map(|track| &track.segments) {
            for waypoint in &segment.points {
                let point = waypoint.point();
                let timestamp = waypoint
                    .time
                    .as_ref()
                    .and_then(|time| time.format().ok())
                    .and_then(|text| DateTime::parse_from_rfc3339(&text).ok())
                    .map(|time| time.naive_utc());
                path.add_point(point.y(), point.x(), waypoint.elevation, timestamp);
            }
        }
        debug!(points = path.len(), "parsed gpx");
        Ok(path)
    }

    /// Load a `.gpx` track or the telemetry of a `.srt` drone video
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "gpx" => Self::from_gpx(&std::fs::read_to_string(path)?),
            "srt" => Ok(SrtTrack::from_file(path)?.to_geo_path()),
            _ => Err(TrackError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn add_point(&mut self, lat: f64, lon: f64, elevation: Option<f64>, timestamp: Option<NaiveDateTime>) {
        self.points.push(Trackpoint { lat, lon, elevation, timestamp });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinates in order, ready for drawing
    pub fn latlngs(&self) -> Vec<LatLng> {
        self.points.iter().map(Trackpoint::latlng).collect()
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(&self.latlngs())
    }

    pub fn get(&self, index: usize) -> Result<&Trackpoint> {
        self.points.get(index).ok_or(TrackError::InvalidIndex { index, len: self.points.len() })
    }

    /// Length in kilometers of the stretch between two indices, in either order
    pub fn distance(&self, index1: usize, index2: usize) -> Result<f64> {
        self.get(index1)?;
        self.get(index2)?;
        let (from, to) = (index1.min(index2), index1.max(index2));
        Ok(self.points[from..=to]
            .windows(2)
            .map(|leg| haversine_distance(&leg[0], &leg[1]))
            .sum())
    }

    pub fn total_distance(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.distance(0, self.points.len() - 1).unwrap_or(0.0)
    }

    /// Video frame showing trackpoint `index`, from its time offset to the
    /// first point. Points recorded before the first one give negative
    /// frames; fractions are truncated toward zero.
    pub fn video_frame_index(&self, index: usize, fps: u32) -> Result<i64> {
        let target = self.get(index)?.timestamp.ok_or(TrackError::MissingTimestamp { index })?;
        let start = self.get(0)?.timestamp.ok_or(TrackError::MissingTimestamp { index: 0 })?;
        let millis = (target - start).num_milliseconds();
        Ok(millis * i64::from(fps) / 1000)
    }
}
