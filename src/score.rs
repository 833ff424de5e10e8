//! Symbolic score: timed note events grouped into instrument tracks, and
//! their serialization as a Standard MIDI File.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::{Error, Result};
use crate::mapping::MIDI_MAX;

/// MIDI ticks per quarter note.
pub const TICKS_PER_BEAT: u16 = 500;

/// Default tempo: 120 BPM. Together with [`TICKS_PER_BEAT`] one tick lasts
/// exactly one millisecond.
pub const DEFAULT_TEMPO_US_PER_BEAT: u32 = 500_000;

const MAX_CHANNEL: u8 = 15;
const MAX_DELTA: u64 = (1 << 28) - 1;

/// One sounding note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub start_ms: u64,
    pub duration_ms: u64,
    /// Pitch-wheel value sent right after the note-on, in `-8192..=8191`.
    pub pitch_bend: Option<i16>,
}

impl NoteEvent {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }
}

/// A single instrument voice on its own MIDI channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub channel: u8,
    pub program: u8,
    notes: Vec<NoteEvent>,
    /// Mid-track instrument switches as `(time_ms, program)`.
    program_changes: Vec<(u64, u8)>,
}

fn check_data_byte(what: &str, value: u8) -> Result<()> {
    if value > MIDI_MAX {
        return Err(Error::invalid(format!("{what} {value} is outside 0..=127")));
    }
    Ok(())
}

impl Track {
    pub fn new(name: impl Into<String>, channel: u8, program: u8) -> Result<Self> {
        if channel > MAX_CHANNEL {
            return Err(Error::invalid(format!("channel {channel} is outside 0..=15")));
        }
        check_data_byte("program", program)?;
        Ok(Track {
            name: name.into(),
            channel,
            program,
            notes: Vec::new(),
            program_changes: Vec::new(),
        })
    }

    /// Append a note. Start times must be non-decreasing within a track.
    pub fn push(&mut self, note: NoteEvent) -> Result<()> {
        if note.channel != self.channel {
            return Err(Error::invalid(format!(
                "note on channel {} pushed to track '{}' on channel {}",
                note.channel, self.name, self.channel
            )));
        }
        check_data_byte("pitch", note.pitch)?;
        check_data_byte("velocity", note.velocity)?;
        if let Some(last) = self.notes.last() {
            if note.start_ms < last.start_ms {
                return Err(Error::invalid(format!(
                    "track '{}': note at {} ms after note at {} ms",
                    self.name, note.start_ms, last.start_ms
                )));
            }
        }
        self.notes.push(note);
        Ok(())
    }

    /// Switch instrument at `at_ms`; takes effect before notes starting then.
    pub fn change_program(&mut self, at_ms: u64, program: u8) -> Result<()> {
        check_data_byte("program", program)?;
        self.program_changes.push((at_ms, program));
        Ok(())
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn program_changes(&self) -> &[(u64, u8)] {
        &self.program_changes
    }

    /// Time the last note stops sounding.
    pub fn end_ms(&self) -> u64 {
        self.notes.iter().map(NoteEvent::end_ms).max().unwrap_or(0)
    }
}

/// A complete multi-track score.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub tempo_us_per_beat: u32,
    pub tracks: Vec<Track>,
}

impl Default for Score {
    fn default() -> Self {
        Score {
            tempo_us_per_beat: DEFAULT_TEMPO_US_PER_BEAT,
            tracks: Vec::new(),
        }
    }
}

// Event ordering at equal timestamps.
const ORDER_OFF: u8 = 0;
const ORDER_PROGRAM: u8 = 1;
const ORDER_ON: u8 = 2;
const ORDER_BEND: u8 = 3;

impl Score {
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        self.tracks.iter().map(Track::end_ms).max().unwrap_or(0)
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    fn ms_to_ticks(&self, ms: u64) -> u64 {
        ms * TICKS_PER_BEAT as u64 * 1000 / self.tempo_us_per_beat.max(1) as u64
    }

    fn track_events<'a>(&self, index: usize, track: &'a Track) -> Result<Vec<TrackEvent<'a>>> {
        let channel = u4::new(track.channel);
        let midi = |message| TrackEventKind::Midi { channel, message };

        let mut timed: Vec<(u64, u8, TrackEventKind<'a>)> = Vec::new();
        timed.push((
            0,
            ORDER_PROGRAM,
            midi(MidiMessage::ProgramChange { program: u7::new(track.program) }),
        ));
        for &(at, program) in &track.program_changes {
            timed.push((
                self.ms_to_ticks(at),
                ORDER_PROGRAM,
                midi(MidiMessage::ProgramChange { program: u7::new(program) }),
            ));
        }
        for note in &track.notes {
            let key = u7::new(note.pitch);
            let on = self.ms_to_ticks(note.start_ms);
            timed.push((on, ORDER_ON, midi(MidiMessage::NoteOn { key, vel: u7::new(note.velocity) })));
            if let Some(bend) = note.pitch_bend {
                timed.push((
                    on,
                    ORDER_BEND,
                    midi(MidiMessage::PitchBend { bend: PitchBend::from_int(bend) }),
                ));
            }
            timed.push((
                self.ms_to_ticks(note.end_ms()),
                ORDER_OFF,
                midi(MidiMessage::NoteOff { key, vel: u7::new(0) }),
            ));
        }
        timed.sort_by_key(|(tick, order, _)| (*tick, *order));

        let mut events = vec![TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
        }];
        if index == 0 {
            events.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(self.tempo_us_per_beat))),
            });
        }
        let mut now = 0u64;
        for (tick, _, kind) in timed {
            let delta = tick - now;
            if delta > MAX_DELTA {
                return Err(Error::invalid(format!(
                    "track '{}': gap of {delta} ticks does not fit a MIDI delta",
                    track.name
                )));
            }
            events.push(TrackEvent {
                delta: u28::new(delta as u32),
                kind,
            });
            now = tick;
        }
        events.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        Ok(events)
    }

    /// Encode as a format-1 Standard MIDI File.
    pub fn to_midi_bytes(&self) -> Result<Vec<u8>> {
        if self.tempo_us_per_beat == 0 || self.tempo_us_per_beat > 0xFF_FFFF {
            return Err(Error::invalid(format!(
                "tempo {} µs/beat does not fit a MIDI tempo event",
                self.tempo_us_per_beat
            )));
        }
        let tracks = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| self.track_events(i, t))
            .collect::<Result<Vec<_>>>()?;
        let smf = Smf {
            header: Header::new(Format::Parallel, Timing::Metrical(u15::new(TICKS_PER_BEAT))),
            tracks,
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)?;
        Ok(bytes)
    }

    /// Write the score as a MIDI file at `path`.
    pub fn write_midi(&self, path: &Path) -> Result<()> {
        let bytes = self.to_midi_bytes()?;
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&bytes)?;
        out.flush()?;
        debug!(
            "wrote {} notes on {} tracks to {}",
            self.note_count(),
            self.tracks.len(),
            path.display()
        );
        Ok(())
    }
}
