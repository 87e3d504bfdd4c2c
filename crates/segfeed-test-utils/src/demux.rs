//! A scripted container format and its demuxer.
//!
//! Layout: a header of `header_len` bytes followed by fixed-size units. Unit
//! `i` belongs to track `tracks[i % n]` and is segment `i / n` of that track.
//! Each unit starts with its index as a big-endian `u64`.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use segfeed::{DemuxEvent, Demuxer, InitSegment, MovieInfo, Segment, TrackId, TrackInfo};

#[derive(Debug, Clone)]
pub struct ContainerLayout {
    pub tracks: Vec<TrackInfo>,
    pub header_len: u64,
    pub segment_len: u64,
    pub segments_per_track: u32,
    /// Seconds covered by one segment.
    pub segment_duration: f64,
    pub timescale: u32,
}

impl Default for ContainerLayout {
    fn default() -> Self {
        Self {
            tracks: vec![TrackInfo::new(1, "avc1.64001f")],
            header_len: 64,
            segment_len: 256,
            segments_per_track: 8,
            segment_duration: 2.0,
            timescale: 1_000,
        }
    }
}

impl ContainerLayout {
    #[must_use]
    pub fn with_tracks(mut self, tracks: Vec<TrackInfo>) -> Self {
        self.tracks = tracks;
        self
    }

    #[must_use]
    pub fn with_segments(mut self, per_track: u32) -> Self {
        self.segments_per_track = per_track;
        self
    }

    #[must_use]
    pub fn with_segment_len(mut self, len: u64) -> Self {
        self.segment_len = len.max(8);
        self
    }

    pub fn units(&self) -> u64 {
        self.tracks.len() as u64 * u64::from(self.segments_per_track)
    }

    pub fn total_len(&self) -> u64 {
        self.header_len + self.units() * self.segment_len
    }

    /// Byte offset of unit `index`.
    pub fn unit_offset(&self, index: u64) -> u64 {
        self.header_len + index * self.segment_len
    }

    pub fn duration_secs(&self) -> f64 {
        f64::from(self.segments_per_track) * self.segment_duration
    }

    pub fn movie_info(&self) -> MovieInfo {
        MovieInfo {
            duration: (self.duration_secs() * f64::from(self.timescale)) as u64,
            timescale: self.timescale,
            fragment_duration: None,
            tracks: self.tracks.clone(),
        }
    }

    /// The serialized container.
    pub fn bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.total_len() as usize);
        out.resize(self.header_len as usize, 0xAB);
        for index in 0..self.units() {
            let mut unit = vec![0u8; self.segment_len as usize];
            unit[..8].copy_from_slice(&index.to_be_bytes());
            out.extend_from_slice(&unit);
        }
        out.freeze()
    }
}

/// Unit index encoded at the start of a media segment payload.
pub fn unit_index(payload: &[u8]) -> Option<u64> {
    let head: [u8; 8] = payload.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(head))
}

/// One recorded `feed` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub offset: u64,
    pub len: usize,
    pub is_final: bool,
}

/// What the engine did to the demuxer.
#[derive(Debug, Clone, Default)]
pub struct DemuxProbe {
    pub feeds: Vec<Feed>,
    pub configured: Vec<(TrackId, u32)>,
    pub issued: BTreeMap<TrackId, u32>,
    pub released: BTreeMap<TrackId, u32>,
    pub seeks: Vec<(f64, u64)>,
    pub discarded: bool,
}

/// Shared view of a [`ScriptedDemuxer`]'s [`DemuxProbe`].
#[derive(Clone, Default)]
pub struct ProbeHandle(Arc<Mutex<DemuxProbe>>);

impl ProbeHandle {
    pub fn snapshot(&self) -> DemuxProbe {
        self.0.lock().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&mut DemuxProbe) -> R) -> R {
        f(&mut self.0.lock())
    }
}

impl DemuxProbe {
    /// Samples handed out but not yet released.
    pub fn outstanding(&self) -> u32 {
        let issued: u32 = self.issued.values().sum();
        let released: u32 = self.released.values().sum();
        issued.saturating_sub(released)
    }
}

pub struct ScriptedDemuxer {
    layout: ContainerLayout,
    /// Absolute offset of `pending[0]`.
    cursor: u64,
    pending: BytesMut,
    header_parsed: bool,
    configured: BTreeSet<TrackId>,
    samples_per_segment: u32,
    events: VecDeque<DemuxEvent>,
    probe: ProbeHandle,
}

impl ScriptedDemuxer {
    pub fn new(layout: ContainerLayout) -> (Self, ProbeHandle) {
        let probe = ProbeHandle::default();
        let demuxer = Self {
            layout,
            cursor: 0,
            pending: BytesMut::new(),
            header_parsed: false,
            configured: BTreeSet::new(),
            samples_per_segment: 1,
            events: VecDeque::new(),
            probe: probe.clone(),
        };
        (demuxer, probe)
    }

    fn wanted(&self) -> Option<u64> {
        let next = self.cursor + self.pending.len() as u64;
        (next < self.layout.total_len()).then_some(next)
    }

    fn parse_step(&mut self) -> bool {
        let layout = &self.layout;
        if self.cursor < layout.header_len {
            if self.cursor != 0 || (self.pending.len() as u64) < layout.header_len {
                return false;
            }
            let _ = self.pending.split_to(layout.header_len as usize);
            self.cursor = layout.header_len;
            if !self.header_parsed {
                self.header_parsed = true;
                self.events.push_back(DemuxEvent::Ready(layout.movie_info()));
            }
            return true;
        }
        if !self.header_parsed || (self.pending.len() as u64) < layout.segment_len {
            return false;
        }
        let index = (self.cursor - layout.header_len) / layout.segment_len;
        let payload = self.pending.split_to(layout.segment_len as usize).freeze();
        self.cursor += layout.segment_len;

        let tracks = layout.tracks.len() as u64;
        let track = layout.tracks[(index % tracks) as usize].id;
        let number = index / tracks;
        if self.configured.contains(&track) {
            let samples = self.samples_per_segment;
            self.probe
                .with(|probe| *probe.issued.entry(track).or_default() += samples);
            self.events.push_back(DemuxEvent::Segment(Segment {
                track,
                payload,
                sample_count: self.samples_per_segment,
                is_last: number + 1 == u64::from(layout.segments_per_track),
            }));
        }
        true
    }
}

impl Demuxer for ScriptedDemuxer {
    fn feed(&mut self, data: Bytes, offset: u64, is_final: bool) -> Option<u64> {
        let len = data.len();
        self.probe.with(|probe| {
            probe.feeds.push(Feed {
                offset,
                len,
                is_final,
            });
        });
        if offset != self.cursor + self.pending.len() as u64 {
            self.pending.clear();
            self.cursor = offset;
        }
        self.pending.extend_from_slice(&data);
        if is_final { None } else { self.wanted() }
    }

    fn poll_event(&mut self) -> Option<DemuxEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if !self.parse_step() {
                return None;
            }
        }
    }

    fn configure_track(&mut self, track: TrackId, samples_per_segment: u32) {
        self.configured.insert(track);
        self.samples_per_segment = samples_per_segment;
        self.probe
            .with(|probe| probe.configured.push((track, samples_per_segment)));
    }

    fn initialization_segments(&mut self) -> Vec<InitSegment> {
        self.configured
            .iter()
            .map(|&track| InitSegment {
                track,
                payload: Bytes::from(format!("init-{track}")),
            })
            .collect()
    }

    fn release_samples(&mut self, track: TrackId, count: u32) {
        self.probe
            .with(|probe| *probe.released.entry(track).or_default() += count);
    }

    fn resolve_seek_offset(&mut self, time: f64) -> u64 {
        let layout = &self.layout;
        let last = u64::from(layout.segments_per_track.saturating_sub(1));
        let segment = ((time.max(0.0) / layout.segment_duration) as u64).min(last);
        let offset = layout.unit_offset(segment * layout.tracks.len() as u64);
        self.pending.clear();
        self.cursor = offset;
        self.probe.with(|probe| probe.seeks.push((time, offset)));
        offset
    }

    fn discard(&mut self) {
        self.pending.clear();
        self.events.clear();
        self.probe.with(|probe| probe.discarded = true);
    }
}
