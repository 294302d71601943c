//! Standard MIDI File encoding and decoding of note events.

use std::collections::HashMap;
use std::path::Path;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Ticks per quarter note in written files.
pub const TICKS_PER_BEAT: u16 = 480;

/// Tempo of written files in microseconds per quarter note (120 BPM).
pub const TEMPO_US_PER_BEAT: u32 = 500_000;

/// General MIDI program used for transcribed notes (electric piano).
pub const DEFAULT_PROGRAM: u8 = 4;

/// A single transcribed note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub start_sec: f64,
    pub end_sec: f64,
    /// MIDI key number.
    pub pitch: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn new(start_sec: f64, end_sec: f64, pitch: u8, velocity: u8) -> Self {
        Self {
            start_sec,
            end_sec,
            pitch,
            velocity,
        }
    }

    pub fn duration_sec(&self) -> f64 {
        (self.end_sec - self.start_sec).max(0.0)
    }
}

fn seconds_to_ticks(sec: f64) -> u64 {
    let ticks_per_sec = TICKS_PER_BEAT as f64 * 1_000_000.0 / TEMPO_US_PER_BEAT as f64;
    (sec.max(0.0) * ticks_per_sec).round() as u64
}

/// Encodes notes as a single-track SMF. An empty slice still yields a
/// valid file containing only the tempo and end-of-track events.
pub fn encode_notes(notes: &[NoteEvent]) -> Result<Vec<u8>> {
    // (tick, is_on, key, velocity); offs sort before ons at the same tick
    let mut timeline: Vec<(u64, bool, u8, u8)> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        if !(note.start_sec.is_finite() && note.end_sec.is_finite()) || note.pitch > 127 {
            return Err(DaemonError::transcription_failed(format!(
                "invalid note event {:?}",
                note
            )));
        }
        let on = seconds_to_ticks(note.start_sec);
        let off = seconds_to_ticks(note.end_sec).max(on + 1);
        timeline.push((on, true, note.pitch, note.velocity.clamp(1, 127)));
        timeline.push((off, false, note.pitch, 0));
    }
    timeline.sort_by_key(|&(tick, is_on, key, _)| (tick, is_on, key));

    let channel = u4::new(0);
    let mut track = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(TEMPO_US_PER_BEAT))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(DEFAULT_PROGRAM),
                },
            },
        },
    ];

    let mut last_tick = 0u64;
    for (tick, is_on, key, vel) in timeline {
        let delta = u32::try_from(tick - last_tick).map_err(|_| {
            DaemonError::transcription_failed("note events span too long a time")
        })?;
        last_tick = tick;
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi { channel, message },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_BEAT)),
    ));
    smf.tracks.push(track);

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|e| DaemonError::transcription_failed(format!("cannot encode MIDI: {}", e)))?;
    Ok(bytes)
}

/// Writes notes to a `.mid` file.
pub fn write_midi(notes: &[NoteEvent], path: &Path) -> Result<()> {
    let bytes = encode_notes(notes)?;
    std::fs::write(path, bytes).map_err(|e| {
        DaemonError::transcription_failed(format!("cannot write {}: {}", path.display(), e))
    })
}

/// Decodes every note in an SMF, honouring tempo changes.
pub fn decode_notes(bytes: &[u8]) -> Result<Vec<NoteEvent>> {
    let smf = Smf::parse(bytes)
        .map_err(|e| DaemonError::transcription_failed(format!("MIDI parse error: {}", e)))?;

    let clock = TickClock::new(&smf);
    let mut notes = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        // (channel, key) -> stack of (start tick, velocity)
        let mut open: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in track {
            tick += u64::from(event.delta.as_int());
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry((channel, key.as_int()))
                        .or_default()
                        .push((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let started = open.get_mut(&(channel, key.as_int())).and_then(|s| {
                        if s.is_empty() {
                            None
                        } else {
                            Some(s.remove(0))
                        }
                    });
                    if let Some((start, velocity)) = started {
                        notes.push(NoteEvent::new(
                            clock.seconds(start),
                            clock.seconds(tick),
                            key.as_int(),
                            velocity,
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    notes.sort_by(|a, b| {
        a.start_sec
            .total_cmp(&b.start_sec)
            .then(a.pitch.cmp(&b.pitch))
    });
    Ok(notes)
}

/// Reads every note from a `.mid` file.
pub fn read_midi(path: &Path) -> Result<Vec<NoteEvent>> {
    let bytes = std::fs::read(path).map_err(|e| {
        DaemonError::transcription_failed(format!("cannot read {}: {}", path.display(), e))
    })?;
    decode_notes(&bytes)
}

/// Converts absolute ticks to seconds.
enum TickClock {
    /// Tempo segments as (start tick, start seconds, seconds per tick).
    Metrical(Vec<(u64, f64, f64)>),
    /// Fixed ticks per second.
    Timecode(f64),
}

impl TickClock {
    fn new(smf: &Smf<'_>) -> Self {
        let ppq = match smf.header.timing {
            Timing::Metrical(ppq) => f64::from(ppq.as_int().max(1)),
            Timing::Timecode(fps, subframes) => {
                return TickClock::Timecode(f64::from(fps.as_f32()) * f64::from(subframes.max(1)));
            }
        };

        let mut changes: Vec<(u64, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    changes.push((tick, tempo.as_int()));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        let seconds_per_tick = |us: u32| f64::from(us) / 1_000_000.0 / ppq;
        let mut segments = vec![(0u64, 0.0f64, seconds_per_tick(TEMPO_US_PER_BEAT))];
        for (tick, tempo) in changes {
            let Some(&(start, start_sec, rate)) = segments.last() else {
                continue;
            };
            let at = start_sec + (tick - start) as f64 * rate;
            if tick == start {
                segments.pop();
            }
            segments.push((tick, at, seconds_per_tick(tempo)));
        }
        TickClock::Metrical(segments)
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            TickClock::Timecode(ticks_per_sec) => tick as f64 / ticks_per_sec,
            TickClock::Metrical(segments) => {
                let segment = segments
                    .iter()
                    .rev()
                    .find(|(start, _, _)| *start <= tick)
                    .or_else(|| segments.first());
                match segment {
                    Some(&(start, start_sec, rate)) => start_sec + (tick - start) as f64 * rate,
                    None => 0.0,
                }
            }
        }
    }
}
