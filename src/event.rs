use serde::{Deserialize, Serialize};

/// Index of an event inside its timeline's event arena.
///
/// Long note starts and ends reference each other through these indices
/// instead of holding direct references to one another.
pub type EventIndex = usize;

/// BGA layer targeted by a [`EventKind::Bga`] change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BgaLayer {
    Base,
    Layer,
    Poor,
}

/// A single gameplay event on the shared timeline.
///
/// `pulse` is the chart-native integer position; `timestamp` is derived once
/// during timeline generation and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Pulse position (monotonic, never a time value).
    pub pulse: i64,
    /// Seconds from chart start, assigned by the timeline builder.
    pub timestamp: f64,
    pub kind: EventKind,
}

/// Closed set of event kinds, matched exhaustively by every consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A playable key note with its attached sound.
    Note { lane: usize, wav: u16 },
    /// Start of a sustained note. `pair` indexes the matching end event.
    LongNoteStart { lane: usize, wav: u16, pair: EventIndex },
    /// End of a sustained note. `pair` indexes the matching start event.
    LongNoteEnd { lane: usize, wav: u16, pair: EventIndex },
    /// Instant health penalty when the lane is held.
    Landmine { lane: usize, damage: f64 },
    /// Invisible note that retriggers the lane's assigned key sound.
    KeySoundChange { lane: usize, wav: u16 },
    /// Ambient / BGM sound with no lane.
    Sound { wav: u16 },
    /// Tempo change. Negative values mark authored reverse scroll; duration
    /// math always uses the absolute value.
    Bpm { bpm: f64 },
    /// Freeze playback time for `pulses` worth of pulse-time with no pulse
    /// advancement.
    Stop { pulses: i64 },
    /// Measure length multiplier taking effect at this pulse.
    Meter { factor: f64 },
    /// Bar boundary, no payload beyond the measure number.
    MeasureMarker { measure: u32 },
    /// Background animation layer change.
    Bga { id: u16, layer: BgaLayer },
}

impl Event {
    pub fn new(pulse: i64, kind: EventKind) -> Self {
        Self {
            pulse,
            timestamp: 0.0,
            kind,
        }
    }
}

impl EventKind {
    /// Tie-break rank for events sharing a pulse.
    ///
    /// A stop and a tempo change on the same pulse must run the stop at the
    /// old tempo, so stops sort after notes and tempo changes sort after
    /// stops.
    pub fn sort_rank(&self) -> u8 {
        match self {
            EventKind::Stop { .. } => 1,
            EventKind::Bpm { .. } => 2,
            _ => 0,
        }
    }

    /// Whether this kind participates in pulse↔time conversion.
    pub fn is_time_affecting(&self) -> bool {
        matches!(
            self,
            EventKind::Bpm { .. } | EventKind::Stop { .. } | EventKind::Meter { .. }
        )
    }

    /// Lane of the event, for kinds that have one.
    pub fn lane(&self) -> Option<usize> {
        match self {
            EventKind::Note { lane, .. }
            | EventKind::LongNoteStart { lane, .. }
            | EventKind::LongNoteEnd { lane, .. }
            | EventKind::Landmine { lane, .. }
            | EventKind::KeySoundChange { lane, .. } => Some(*lane),
            _ => None,
        }
    }
}
