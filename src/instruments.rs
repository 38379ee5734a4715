use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use thiserror::Error;

/// MIDI channel conventionally reserved for percussion (0-based).
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Synthetic program id for percussion that isn't a GM percussive program.
pub const STANDALONE_PERCUSSION: u8 = 128;

/// Programs on the percussion channel that are kept as announced.
pub const RHYTHM_KIT_PROGRAMS: RangeInclusive<u8> = 112..=119;

/// Files with more distinct channel/program assignments than this are
/// not profiled at all.
pub const MAX_ASSIGNMENTS: usize = 20;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    #[error("too many instrument assignments ({0}), instrumentation unreliable")]
    TooManyAssignments(usize),
}

/// What a single track event means to the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ProgramChange { channel: u8, program: u8 },
    NoteOn { channel: u8, pitch: u8 },
    NoteOff { channel: u8, pitch: u8 },
    /// Anything else. Only its delta matters.
    Other,
}

/// A track event with its delta time in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta: u32,
    pub kind: EventKind,
}

impl TrackEvent {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }
}

/// Scanning state for one file's profiling pass.
///
/// Built up track by track with [`ChannelState::scan_track`] and consumed by
/// [`ChannelState::rank_programs`]. Nothing here outlives a single file.
#[derive(Debug, Default, Clone)]
pub struct ChannelState {
    /// Channel → program, in first-assignment order.
    assignments: Vec<(u8, u8)>,
    /// Every (channel, program) pair ever assigned, including overwritten ones.
    seen: HashSet<(u8, u8)>,
    /// (channel, pitch) → tick of the last on/off toggle. Reset per track.
    toggles: HashMap<(u8, u8), u64>,
    /// Channel → accumulated active ticks, in first-note order.
    durations: Vec<(u8, u64)>,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan one track's events in order, returning the updated state.
    pub fn scan_track(mut self, events: &[TrackEvent]) -> Self {
        self.toggles.clear();
        let mut now: u64 = 0;

        for event in events {
            now += u64::from(event.delta);
            match event.kind {
                EventKind::ProgramChange { channel, program } => self.assign(channel, program),
                EventKind::NoteOn { channel, pitch } | EventKind::NoteOff { channel, pitch } => {
                    self.toggle(channel, pitch, now)
                }
                EventKind::Other => {}
            }
        }

        self
    }

    fn assign(&mut self, channel: u8, program: u8) {
        let program = if channel == PERCUSSION_CHANNEL && !RHYTHM_KIT_PROGRAMS.contains(&program) {
            STANDALONE_PERCUSSION
        } else {
            program
        };

        self.seen.insert((channel, program));
        match self.assignments.iter_mut().find(|(c, _)| *c == channel) {
            // Channel reuse within one file is taken at face value
            Some(slot) => slot.1 = program,
            None => self.assignments.push((channel, program)),
        }
    }

    fn toggle(&mut self, channel: u8, pitch: u8, now: u64) {
        let last = self.toggles.insert((channel, pitch), now).unwrap_or(0);
        let elapsed = now.saturating_sub(last);

        match self.durations.iter_mut().find(|(c, _)| *c == channel) {
            Some(slot) => slot.1 += elapsed,
            None => self.durations.push((channel, elapsed)),
        }
    }

    /// Program currently assigned to a channel.
    pub fn program(&self, channel: u8) -> Option<u8> {
        self.assignments
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, p)| *p)
    }

    /// Accumulated active ticks for a channel.
    pub fn duration(&self, channel: u8) -> u64 {
        self.durations
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, d)| *d)
            .unwrap_or(0)
    }

    /// Number of distinct (channel, program) pairs seen so far.
    pub fn assignment_count(&self) -> usize {
        self.seen.len()
    }

    /// Channels by accumulated duration, longest first. Ties keep first-note order.
    pub fn ranked_channels(&self) -> Vec<(u8, u64)> {
        let mut ranked = self.durations.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// Resolve the ranked channels to program ids.
    ///
    /// Unannounced percussion (notes on channel 9 without a program change)
    /// is reported as [`STANDALONE_PERCUSSION`]. If a ranked channel has no
    /// program at all, the list built so far is returned.
    pub fn rank_programs(self) -> Result<Vec<u8>, ProfileError> {
        let count = self.assignment_count();
        if count > MAX_ASSIGNMENTS {
            return Err(ProfileError::TooManyAssignments(count));
        }
        if self.assignments.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = self.ranked_channels();
        let mut assignments = self.assignments;
        let announced_drums = assignments.iter().any(|(c, _)| *c == PERCUSSION_CHANNEL);
        if !announced_drums && ranked.iter().any(|(c, _)| *c == PERCUSSION_CHANNEL) {
            assignments.push((PERCUSSION_CHANNEL, STANDALONE_PERCUSSION));
        }

        let mut programs = Vec::with_capacity(ranked.len());
        for (channel, _) in ranked {
            match assignments.iter().find(|(c, _)| *c == channel) {
                Some((_, program)) => programs.push(*program),
                None => {
                    log::warn!(
                        "Channel {} has notes but no program, keeping {} ranked instruments",
                        channel,
                        programs.len()
                    );
                    break;
                }
            }
        }

        Ok(programs)
    }
}

/// Profile a file's tracks into a duration-ranked list of program ids.
pub fn profile_tracks(tracks: &[Vec<TrackEvent>]) -> Result<Vec<u8>, ProfileError> {
    tracks
        .iter()
        .fold(ChannelState::new(), |state, track| state.scan_track(track))
        .rank_programs()
}
