//! Drone flight telemetry stored as SubRip (`.srt`) subtitles.
//!
//! Two cue layouts are understood. DJI writes one `<font>` block per frame:
//!
//! ```text
//! <font size="28">SrtCnt : 1, DiffTime : 33ms
//! 2023-08-15 09:18:24.589
//! [iso : 200] [shutter : 1/180.0] [fnum : 170] [ev : 1.3] [ct : 5490]
//! [latitude: 48.486375] [longitude: 8.375567] [rel_alt: 0.000 abs_alt: 530.095] </font>
//! ```
//!
//! Older firmware writes positions as `lon,lat` pairs:
//!
//! ```text
//! HOME(149.0251,-20.2532) 2017.08.05 14:11:51
//! GPS(149.0251,-20.2533,16) BAROMETER:1.9
//! ISO:100 Shutter:60 EV: Fnum:2.2
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::{Result, TrackError};
use crate::track::GeoPath;

/// One subtitle block
#[derive(Clone, Debug, PartialEq)]
pub struct SrtCue {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
    /// 1-based line of the cue's index line
    pub line: usize,
}

/// Position and time decoded from a cue; the raw metadata is kept in `fields`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetryRecord {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub elevation: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
    pub fields: BTreeMap<String, String>,
}

/// Parsed subtitle file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SrtTrack {
    pub cues: Vec<SrtCue>,
}

impl SrtTrack {
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self { cues: parse_srt(text)? })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Trackpoints for every cue with a position. Cues that fail to decode
    /// are skipped.
    pub fn to_geo_path(&self) -> GeoPath {
        let mut path = GeoPath::default();
        for cue in &self.cues {
            match cue.decode() {
                Ok(record) => {
                    if let (Some(lat), Some(lon)) = (record.lat, record.lon) {
                        // 0.0 is what the recorders write before a GPS fix
                        if lat != 0.0 && lon != 0.0 {
                            path.add_point(lat, lon, record.elevation, record.timestamp);
                        }
                    }
                }
                Err(e) => warn!(cue = cue.index, error = %e, "skipping telemetry cue"),
            }
        }
        debug!(cues = self.cues.len(), points = path.len(), "telemetry converted");
        path
    }
}

/// Split SubRip text into cues
pub fn parse_srt(text: &str) -> Result<Vec<SrtCue>> {
    let mut cues = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim_end_matches('\r')));

    loop {
        let Some((line, index_line)) = lines.by_ref().find(|(_, l)| !l.trim().is_empty()) else {
            break;
        };
        let index_line = index_line.trim().trim_start_matches('\u{feff}');
        let index = index_line.parse::<usize>().map_err(|_| TrackError::Srt {
            line,
            reason: format!("expected cue number, found {index_line:?}"),
        })?;

        let (timing_line, timing) = lines.next().ok_or_else(|| TrackError::Srt {
            line,
            reason: "cue ends before its timing line".to_string(),
        })?;
        let (start, end) = parse_timing(timing).ok_or_else(|| TrackError::Srt {
            line: timing_line,
            reason: format!("bad timing {timing:?}"),
        })?;

        let body: Vec<&str> = lines.by_ref().map(|(_, l)| l).take_while(|l| !l.trim().is_empty()).collect();
        cues.push(SrtCue { index, start, end, text: body.join("\n"), line });
    }
    Ok(cues)
}

fn parse_timing(s: &str) -> Option<(Duration, Duration)> {
    let (start, end) = s.split_once("-->")?;
    Some((parse_timecode(start.trim())?, parse_timecode(end.trim())?))
}

/// `HH:MM:SS,mmm`
fn parse_timecode(s: &str) -> Option<Duration> {
    let (clock, millis) = s.split_once([',', '.'])?;
    let mut parts = clock.split(':').map(|p| p.parse::<u64>().ok());
    let (h, m, sec) = (parts.next()??, parts.next()??, parts.next()??);
    if parts.next().is_some() {
        return None;
    }
    let millis = millis.parse::<u64>().ok()?;
    Some(Duration::from_millis(((h * 60 + m) * 60 + sec) * 1000 + millis))
}

impl SrtCue {
    pub fn is_dji(&self) -> bool {
        self.text.contains("<font")
    }

    pub fn decode(&self) -> Result<TelemetryRecord> {
        let fields = if self.is_dji() { dji_fields(&self.text) } else { legacy_fields(&self.text) };
        let number = |keys: &[&str]| -> Result<Option<f64>> {
            let Some(value) = keys.iter().find_map(|k| fields.get(*k)) else {
                return Ok(None);
            };
            value.trim().parse::<f64>().map(Some).map_err(|_| TrackError::Srt {
                line: self.line,
                reason: format!("{} is not a number: {value:?}", keys[0]),
            })
        };

        let lat = number(&["latitude", "gps_latitude"])?;
        let lon = number(&["longitude", "gps_longitude"])?;
        let elevation = number(&["abs_alt", "barometer"])?;
        let timestamp = if self.is_dji() {
            find_datetime(&self.text, 23, "%Y-%m-%d %H:%M:%S%.3f")
        } else {
            find_datetime(&self.text, 19, "%Y.%m.%d %H:%M:%S")
        };
        Ok(TelemetryRecord { lat, lon, elevation, timestamp, fields })
    }
}

/// First substring of `len` bytes that parses with `format`
fn find_datetime(s: &str, len: usize, format: &str) -> Option<NaiveDateTime> {
    (0..s.len().saturating_sub(len - 1))
        .filter_map(|i| s.get(i..i + len))
        .filter(|w| w.starts_with(|c: char| c.is_ascii_digit()))
        .find_map(|w| NaiveDateTime::parse_from_str(w, format).ok())
}

/// `[key : value]` brackets; `[rel_alt: x abs_alt: y]` holds two values
fn dji_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else { break };
        let inner = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        if inner.contains("rel_alt") && inner.contains("abs_alt") {
            for key in ["rel_alt", "abs_alt"] {
                if let Some(value) = number_after(inner, key) {
                    fields.insert(key.to_string(), value.to_string());
                }
            }
            continue;
        }
        if let Some((key, value)) = inner.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    fields
}

/// Number following `key:` inside `s`
fn number_after<'a>(s: &'a str, key: &str) -> Option<&'a str> {
    let start = s.find(key)? + key.len();
    let tail = s[start..].trim_start().strip_prefix(':')?.trim_start();
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(tail.len());
    Some(&tail[..end]).filter(|v| !v.is_empty())
}

/// `HOME(lon,lat)`, `GPS(lon,lat,n)` and `KEY:number` pairs
fn legacy_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for (name, prefix) in [("HOME(", "home"), ("GPS(", "gps")] {
        let Some(args) = text.find(name).and_then(|i| {
            let tail = &text[i + name.len()..];
            tail.find(')').map(|end| &tail[..end])
        }) else {
            continue;
        };
        let values: Vec<&str> = args.split(',').map(str::trim).collect();
        if values.len() >= 2 {
            fields.insert(format!("{prefix}_longitude"), values[0].to_string());
            fields.insert(format!("{prefix}_latitude"), values[1].to_string());
        }
        if let Some(third) = values.get(2) {
            fields.insert(format!("{prefix}_3"), third.to_string());
        }
    }

    for (colon, _) in text.match_indices(':') {
        let before = &text[..colon];
        let key_start = before
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
            .map_or(0, |i| i + 1);
        let key = &before[key_start..];
        // skips clock times such as 14:11:51
        if key.is_empty() || key.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let after = text[colon + 1..].trim_start();
        let end = after.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(after.len());
        if end > 0 {
            fields.insert(key.to_lowercase(), after[..end].to_string());
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DJI: &str = "1
00:00:00,000 --> 00:00:00,033
<font size=\"28\">SrtCnt : 1, DiffTime : 33ms
2023-08-15 09:18:24.589
[iso : 200] [shutter : 1/180.0] [fnum : 170] [ev : 1.3] [ct : 5490]
[color_md : default] [focal_len : 240] [dzoom_ratio: 10000, delta:0],
[latitude: 48.486375] [longitude: 8.375567] [rel_alt: 0.000 abs_alt: 530.095] </font>

2
00:00:00,033 --> 00:00:00,066
<font size=\"28\">SrtCnt : 2, DiffTime : 33ms
2023-08-15 09:18:24.622
[latitude: 48.486380] [longitude: 8.375570] [rel_alt: 0.100 abs_alt: 530.195] </font>
";

    const LEGACY: &str = "1\r
00:00:01,000 --> 00:00:02,000\r
HOME(149.0251,-20.2532) 2017.08.05 14:11:51\r
GPS(149.0251,-20.2533,16) BAROMETER:1.9\r
ISO:100 Shutter:60 EV: Fnum:2.2\r
";

    #[test]
    fn parses_cue_blocks() {
        let cues = parse_srt(DJI).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].index, 2);
        assert_eq!(cues[1].start, Duration::from_millis(33));
        assert_eq!(cues[1].end, Duration::from_millis(66));
        assert_eq!(cues[1].line, 9);
        assert!(cues[0].text.ends_with("</font>"));
    }

    #[test]
    fn decodes_dji_cue() {
        let cues = parse_srt(DJI).unwrap();
        let record = cues[0].decode().unwrap();
        assert_relative_eq!(record.lat.unwrap(), 48.486375);
        assert_relative_eq!(record.lon.unwrap(), 8.375567);
        assert_relative_eq!(record.elevation.unwrap(), 530.095);
        assert_eq!(record.timestamp.unwrap().to_string(), "2023-08-15 09:18:24.589");
        assert_eq!(record.fields["dzoom_ratio"], "10000, delta:0");
        assert_eq!(record.fields["rel_alt"], "0.000");
    }

    #[test]
    fn decodes_legacy_cue() {
        let cues = parse_srt(LEGACY).unwrap();
        let record = cues[0].decode().unwrap();
        assert_relative_eq!(record.lat.unwrap(), -20.2533);
        assert_relative_eq!(record.lon.unwrap(), 149.0251);
        assert_relative_eq!(record.elevation.unwrap(), 1.9);
        assert_eq!(record.timestamp.unwrap().to_string(), "2017-08-05 14:11:51");
        assert_eq!(record.fields["home_latitude"], "-20.2532");
        assert_eq!(record.fields["iso"], "100");
        assert_eq!(record.fields["fnum"], "2.2");
        assert!(!record.fields.contains_key("ev"));
    }

    #[test]
    fn builds_geo_path() {
        let path = SrtTrack::from_text(DJI).unwrap().to_geo_path();
        assert_eq!(path.len(), 2);
        assert_relative_eq!(path.points[1].lat, 48.486380);
        assert!(path.points[0].timestamp.is_some());
    }

    #[test]
    fn cues_without_fix_are_dropped() {
        let text = "1\n00:00:00,000 --> 00:00:01,000\nGPS(0.0,0.0,0) BAROMETER:0.0\n";
        assert!(SrtTrack::from_text(text).unwrap().to_geo_path().is_empty());
    }

    #[test]
    fn bad_number_skips_cue() {
        let text = "1\n00:00:00,000 --> 00:00:01,000\n<font>[latitude: north] [longitude: 8.0]</font>\n";
        let track = SrtTrack::from_text(text).unwrap();
        assert!(matches!(track.cues[0].decode(), Err(TrackError::Srt { line: 1, .. })));
        assert!(track.to_geo_path().is_empty());
    }

    #[test]
    fn rejects_malformed_timing() {
        let err = parse_srt("1\n00:00 -> 00:01\ntext\n").unwrap_err();
        assert!(matches!(err, TrackError::Srt { line: 2, .. }));
    }

    #[test]
    fn rejects_missing_index() {
        assert!(matches!(parse_srt("hello\n").unwrap_err(), TrackError::Srt { line: 1, .. }));
    }
}
