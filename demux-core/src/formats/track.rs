//! The two-level track/stream model: a [`Track`] groups the elementary [`Stream`]s that share a
//! common PTS clock and byte range; a [`TrackTable`] is the ordered, switchable list of tracks a
//! container may expose (QuickTime reference movies, chained Ogg, CUE-described audio).

use crate::metadata::MetadataMap;

use super::stream::Stream;

/// One selectable unit of a container: a group of streams sharing a monotonic PTS clock.
pub struct Track {
    pub id: u32,
    pub data_start: u64,
    pub data_end: Option<u64>,
    pub metadata: MetadataMap,
    streams: Vec<Stream>,
}

impl Track {
    pub fn new(id: u32) -> Self {
        Track { id, data_start: 0, data_end: None, metadata: MetadataMap::new(), streams: Vec::new() }
    }

    pub fn add_stream(&mut self, stream: Stream) {
        self.streams.push(stream);
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut [Stream] {
        &mut self.streams
    }

    pub fn stream_by_id(&self, stream_id: u32) -> Option<&Stream> {
        self.streams.iter().find(|s| s.stream_id == stream_id)
    }

    pub fn stream_by_id_mut(&mut self, stream_id: u32) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.stream_id == stream_id)
    }

    /// A track is EOF once every non-muted stream has observed `EOF_D`.
    pub fn is_eof(&self) -> bool {
        self.streams
            .iter()
            .filter(|s| s.action != super::stream::StreamAction::Mute)
            .all(|s| s.is_eof())
    }
}

/// An ordered list of [`Track`]s, one of which is current at a time.
#[derive(Default)]
pub struct TrackTable {
    tracks: Vec<Track>,
    cur: usize,
}

impl TrackTable {
    pub fn new() -> Self {
        TrackTable { tracks: Vec::new(), cur: 0 }
    }

    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.cur)
    }

    pub fn current_mut(&mut self) -> Option<&mut Track> {
        self.tracks.get_mut(self.cur)
    }

    pub fn by_id(&self, id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn all(&self) -> &[Track] {
        &self.tracks
    }

    pub fn all_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Switch the current track. Switching resets per-stream buffers on both the old and new
    /// track.
    pub fn select(&mut self, id: u32) -> bool {
        if let Some(idx) = self.tracks.iter().position(|t| t.id == id) {
            if let Some(old) = self.tracks.get_mut(self.cur) {
                for s in old.streams_mut() {
                    s.clear();
                }
            }
            self.cur = idx;
            if let Some(new) = self.tracks.get_mut(self.cur) {
                for s in new.streams_mut() {
                    s.clear();
                }
            }
            true
        }
        else {
            false
        }
    }
}
