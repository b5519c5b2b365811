use log::warn;

use crate::event::{Event, EventKind};

/// The ordered, immutable-after-build list of gameplay events plus the
/// subset used for pulse↔time conversion.
///
/// Both lists are pulse-monotonic; `time_events` indexes the Bpm/Stop/Meter
/// events and is a strict subsequence of `events`.
#[derive(Debug, Clone)]
pub struct EventTimeline {
    resolution: u64,
    initial_bpm: f64,
    events: Vec<Event>,
    time_events: Vec<usize>,
}

impl EventTimeline {
    /// Sort events, link long-note pairs, assign timestamps and extract the
    /// time-affecting subsequence.
    pub fn build(resolution: u64, initial_bpm: f64, mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| {
            a.pulse
                .cmp(&b.pulse)
                .then_with(|| a.kind.sort_rank().cmp(&b.kind.sort_rank()))
        });

        link_long_note_pairs(&mut events);
        assign_timestamps(resolution, initial_bpm, &mut events);

        let time_events = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind.is_time_affecting())
            .map(|(i, _)| i)
            .collect();

        Self {
            resolution,
            initial_bpm,
            events,
            time_events,
        }
    }

    pub fn resolution(&self) -> u64 {
        self.resolution
    }

    pub fn initial_bpm(&self) -> f64 {
        self.initial_bpm
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Indices into `events()` of the Bpm/Stop/Meter events.
    pub fn time_events(&self) -> &[usize] {
        &self.time_events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the last event, in seconds.
    pub fn length_seconds(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.timestamp)
    }

    /// Count of judgeable notes (regular notes and long note starts).
    pub fn total_notes(&self) -> usize {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EventKind::Note { .. } | EventKind::LongNoteStart { .. }
                )
            })
            .count()
    }
}

/// Seconds spanned by `pulses` pulses at `bpm`.
///
/// One resolution's worth of pulses lasts `60 / |bpm|` seconds; tempo is
/// always taken by absolute value so reverse-scroll markers do not produce
/// negative durations.
pub fn pulses_to_seconds(pulses: i64, resolution: u64, bpm: f64) -> f64 {
    let bpm = bpm.abs();
    if bpm <= f64::EPSILON {
        return 0.0;
    }
    pulses as f64 / resolution as f64 * 60.0 / bpm
}

/// Link long-note starts and ends through arena indices.
///
/// The compiler emits starts and ends in strict per-lane alternation, so a
/// one-slot stack per lane suffices. A leftover start (possible only when a
/// caller hands in hand-built events) is demoted to a regular note.
fn link_long_note_pairs(events: &mut [Event]) {
    let mut open: Vec<(usize, usize)> = Vec::new(); // (lane, start index)

    for i in 0..events.len() {
        match events[i].kind {
            EventKind::LongNoteStart { lane, .. } => open.push((lane, i)),
            EventKind::LongNoteEnd { lane, wav, .. } => {
                let found = open.iter().rposition(|&(l, _)| l == lane);
                match found {
                    Some(pos) => {
                        let (_, start) = open.remove(pos);
                        if let EventKind::LongNoteStart { pair, .. } = &mut events[start].kind {
                            *pair = i;
                        }
                        if let EventKind::LongNoteEnd { pair, .. } = &mut events[i].kind {
                            *pair = start;
                        }
                    }
                    None => {
                        warn!("long note end without a start on lane {lane}, demoting");
                        events[i].kind = EventKind::Note { lane, wav };
                    }
                }
            }
            _ => {}
        }
    }

    for (lane, start) in open {
        if let EventKind::LongNoteStart { wav, .. } = events[start].kind {
            warn!("unterminated long note on lane {lane}, demoting to a note");
            events[start].kind = EventKind::Note { lane, wav };
        }
    }
}

/// Single pass assigning every event's timestamp by walking the active tempo
/// and accumulating stop dead time, O(n) for the whole timeline.
fn assign_timestamps(resolution: u64, initial_bpm: f64, events: &mut [Event]) {
    let mut bpm = initial_bpm;
    let mut time = 0.0;
    let mut last_pulse = 0i64;

    for event in events.iter_mut() {
        time += pulses_to_seconds(event.pulse - last_pulse, resolution, bpm);
        last_pulse = event.pulse;
        event.timestamp = time;

        match event.kind {
            EventKind::Stop { pulses } => {
                time += pulses_to_seconds(pulses, resolution, bpm);
            }
            EventKind::Bpm { bpm: new_bpm } => {
                if new_bpm.abs() > f64::EPSILON {
                    bpm = new_bpm;
                } else {
                    warn!("ignoring zero bpm change at pulse {}", event.pulse);
                }
            }
            _ => {}
        }
    }
}
