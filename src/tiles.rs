use makepad_widgets::*;
use makepad_widgets::image_cache::ImageBuffer;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::disk_cache::DiskCache;

/// Parent levels searched for a stand-in while a tile loads
const MAX_FALLBACK_LEVELS: u8 = 4;

/// Requests between two disk cache size checks
const EVICT_EVERY: u64 = 100;

/// Slippy map tile coordinates
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    /// Fill a URL template. `{s}` rotates through the source's subdomains
    /// by `x + y` so neighbouring tiles spread across hosts.
    pub fn tile_url(&self, source: &TileSource) -> String {
        let mut url = source.url_template.clone();
        if !source.subdomains.is_empty() {
            let index = (self.x as usize + self.y as usize) % source.subdomains.len();
            url = url.replace("{s}", &source.subdomains[index]);
        }
        url.replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }

    /// Ancestor `levels` zoom steps up, with the UV offset and scale of
    /// this tile inside it
    pub fn ancestor(&self, levels: u8) -> Option<(TileCoord, [f32; 2], f32)> {
        if levels == 0 || levels > self.z {
            return None;
        }
        let span = 1u32 << levels;
        let parent = TileCoord { x: self.x / span, y: self.y / span, z: self.z - levels };
        let scale = 1.0 / span as f32;
        let offset = [(self.x % span) as f32 * scale, (self.y % span) as f32 * scale];
        Some((parent, offset, scale))
    }
}

/// Where tiles come from and how they are credited
#[derive(Clone, Debug, PartialEq)]
pub struct TileSource {
    pub url_template: String,
    /// HTML attribution markup
    pub attribution: String,
    pub subdomains: Vec<String>,
    pub user_agent: String,
}

impl Default for TileSource {
    fn default() -> Self {
        Self::openstreetmap()
    }
}

impl TileSource {
    pub fn openstreetmap() -> Self {
        Self {
            url_template: "http://{s}.tile.osm.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"https://openstreetmap.org/copyright\">OpenStreetMap contributors</a>".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            user_agent: concat!("MakepadTrackMap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Attribution as display text: tags dropped, common entities decoded
    pub fn attribution_text(&self) -> String {
        let mut text = String::with_capacity(self.attribution.len());
        let mut in_tag = false;
        for c in self.attribution.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => text.push(c),
                _ => {}
            }
        }
        text.replace("&copy;", "\u{00A9}")
            .replace("&nbsp;", "\u{00A0}")
            .replace("&amp;", "&")
    }
}

/// State of a tile being loaded
#[derive(Clone)]
pub enum TileState {
    Loading,
    Loaded(Texture),
    Error(String),
}

/// Loads tiles over HTTP and keeps them in memory, backed by a disk cache
pub struct TileCache {
    tiles: HashMap<TileCoord, TileState>,
    pending_requests: HashMap<LiveId, TileCoord>,
    request_counter: u64,
    source: TileSource,
    disk: Option<DiskCache>,
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(TileSource::openstreetmap())
    }
}

impl TileCache {
    pub fn new(source: TileSource) -> Self {
        Self {
            tiles: HashMap::new(),
            pending_requests: HashMap::new(),
            request_counter: 0,
            source,
            disk: DiskCache::platform_default(),
        }
    }

    pub fn with_disk_cache(mut self, disk: Option<DiskCache>) -> Self {
        self.disk = disk;
        self
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    /// Switch tile source. Tiles of the old source are dropped from memory.
    pub fn set_source(&mut self, source: TileSource) {
        if source != self.source {
            self.tiles.clear();
            self.pending_requests.clear();
            self.source = source;
        }
    }

    /// Request a tile if not already cached or loading
    pub fn request_tile(&mut self, cx: &mut Cx, coord: TileCoord) {
        if self.tiles.contains_key(&coord) {
            return;
        }

        if let Some(data) = self.disk.as_ref().and_then(|disk| disk.load(&coord)) {
            match ImageBuffer::from_png(&data) {
                Ok(buffer) => {
                    let texture: Texture = buffer.into_new_texture(cx);
                    self.tiles.insert(coord, TileState::Loaded(texture));
                    return;
                }
                Err(e) => {
                    debug!(?coord, error = ?e, "corrupt cached tile, refetching");
                }
            }
        }

        self.request_counter += 1;
        let request_id = LiveId::from_num(0, self.request_counter);

        let url = coord.tile_url(&self.source);
        let mut request = HttpRequest::new(url, HttpMethod::GET);
        request.set_header("User-Agent".to_string(), self.source.user_agent.clone());
        cx.http_request(request_id, request);

        self.tiles.insert(coord, TileState::Loading);
        self.pending_requests.insert(request_id, coord);
    }

    pub fn get_tile(&self, coord: &TileCoord) -> Option<&Texture> {
        match self.tiles.get(coord) {
            Some(TileState::Loaded(texture)) => Some(texture),
            _ => None,
        }
    }

    /// Closest loaded ancestor of `coord`, with the UV window to sample
    pub fn fallback_tile(&self, coord: &TileCoord) -> Option<(&Texture, [f32; 2], f32)> {
        (1..=MAX_FALLBACK_LEVELS).find_map(|levels| {
            let (parent, offset, scale) = coord.ancestor(levels)?;
            self.get_tile(&parent).map(|texture| (texture, offset, scale))
        })
    }

    /// Handle HTTP response for tile loading, true when a tile became ready
    pub fn handle_response(&mut self, cx: &mut Cx, request_id: LiveId, response: &HttpResponse) -> bool {
        let Some(coord) = self.pending_requests.remove(&request_id) else {
            return false;
        };
        let state = if response.status_code != 200 {
            TileState::Error(format!("HTTP {}", response.status_code))
        } else if let Some(body) = &response.body {
            // decode before caching so the disk only holds valid PNGs
            match ImageBuffer::from_png(body) {
                Ok(buffer) => {
                    if let Some(disk) = &self.disk {
                        if let Err(e) = disk.save(&coord, body) {
                            debug!(?coord, error = %e, "tile not written to disk cache");
                        }
                        if self.request_counter.is_multiple_of(EVICT_EVERY) {
                            disk.evict_if_needed();
                        }
                    }
                    TileState::Loaded(buffer.into_new_texture(cx))
                }
                Err(e) => TileState::Error(format!("PNG decode error: {:?}", e)),
            }
        } else {
            TileState::Error("Empty response body".to_string())
        };

        let loaded = matches!(state, TileState::Loaded(_));
        if let TileState::Error(reason) = &state {
            warn!(?coord, %reason, "tile failed");
        }
        self.tiles.insert(coord, state);
        loaded
    }

    pub fn handle_error(&mut self, request_id: LiveId, error: &HttpError) {
        if let Some(coord) = self.pending_requests.remove(&request_id) {
            warn!(?coord, ?error, "tile request failed");
            self.tiles.insert(coord, TileState::Error(format!("{:?}", error)));
        }
    }

    /// Drop every tile from memory and disk
    pub fn clear(&mut self) {
        self.tiles.clear();
        self.pending_requests.clear();
        if let Some(disk) = &self.disk {
            disk.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_uses_subdomain_rotation() {
        let source = TileSource::openstreetmap();
        let coord = TileCoord { x: 4, y: 3, z: 9 };
        assert_eq!(coord.tile_url(&source), "http://b.tile.osm.org/9/4/3.png");
        let coord = TileCoord { x: 0, y: 0, z: 0 };
        assert_eq!(coord.tile_url(&source), "http://a.tile.osm.org/0/0/0.png");
    }

    #[test]
    fn url_without_subdomains() {
        let source = TileSource {
            url_template: "https://tiles.example/{z}/{x}/{y}.png".to_string(),
            subdomains: Vec::new(),
            ..TileSource::openstreetmap()
        };
        assert_eq!(TileCoord { x: 1, y: 2, z: 3 }.tile_url(&source), "https://tiles.example/3/1/2.png");
    }

    #[test]
    fn attribution_as_text() {
        assert_eq!(
            TileSource::openstreetmap().attribution_text(),
            "\u{00A9} OpenStreetMap contributors"
        );
    }

    #[test]
    fn clear_empties_disk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(dir.path(), crate::disk_cache::DEFAULT_MAX_BYTES);
        let coord = TileCoord { x: 2, y: 1, z: 3 };
        disk.save(&coord, b"tile").unwrap();

        let mut cache = TileCache::default().with_disk_cache(Some(disk.clone()));
        cache.clear();
        assert!(disk.load(&coord).is_none());
        assert!(cache.get_tile(&coord).is_none());
    }

    #[test]
    fn cache_without_disk_clears_memory_only() {
        let mut cache = TileCache::new(TileSource::openstreetmap()).with_disk_cache(None);
        cache.clear();
        assert_eq!(cache.source(), &TileSource::openstreetmap());
    }

    #[test]
    fn ancestor_uv_window() {
        let coord = TileCoord { x: 5, y: 6, z: 4 };
        let (parent, offset, scale) = coord.ancestor(2).unwrap();
        assert_eq!(parent, TileCoord { x: 1, y: 1, z: 2 });
        assert_eq!(scale, 0.25);
        assert_eq!(offset, [0.25, 0.5]);
        assert!(coord.ancestor(5).is_none());
        assert!(coord.ancestor(0).is_none());
    }
}
