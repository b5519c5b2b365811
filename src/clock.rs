use crate::timeline::{pulses_to_seconds, EventTimeline};
use crate::event::EventKind;

/// One pulse position where the time mapping changes slope.
///
/// `start` is the instant the pulse is reached, `after` the instant playback
/// resumes once every stop at that pulse has elapsed, `bpm` the signed tempo
/// in effect from `after` onward.
#[derive(Debug, Clone, Copy)]
struct TimeSegment {
    pulse: i64,
    start: f64,
    after: f64,
    bpm: f64,
}

/// Pulse↔seconds conversion over a compiled timeline.
///
/// Built once per timeline from the time-affecting event subsequence; every
/// query is a binary search over the precomputed segments. Sequential callers
/// should prefer a [`ClockCursor`].
#[derive(Debug, Clone)]
pub struct TimelineClock {
    resolution: u64,
    segments: Vec<TimeSegment>,
}

impl TimelineClock {
    pub fn new(timeline: &EventTimeline) -> Self {
        let resolution = timeline.resolution();
        let mut segments = vec![TimeSegment {
            pulse: 0,
            start: 0.0,
            after: 0.0,
            bpm: timeline.initial_bpm(),
        }];

        for &index in timeline.time_events() {
            let event = &timeline.events()[index];
            let current_bpm = segments.last().map_or(0.0, |s| s.bpm);

            match event.kind {
                EventKind::Bpm { bpm } => {
                    if bpm.abs() <= f64::EPSILON {
                        continue;
                    }
                    match segments.last_mut().filter(|s| s.pulse == event.pulse) {
                        Some(seg) => seg.bpm = bpm,
                        None => segments.push(TimeSegment {
                            pulse: event.pulse,
                            start: event.timestamp,
                            after: event.timestamp,
                            bpm,
                        }),
                    }
                }
                EventKind::Stop { pulses } => {
                    let dead = pulses_to_seconds(pulses, resolution, current_bpm);
                    match segments.last_mut().filter(|s| s.pulse == event.pulse) {
                        Some(seg) => seg.after += dead,
                        None => segments.push(TimeSegment {
                            pulse: event.pulse,
                            start: event.timestamp,
                            after: event.timestamp + dead,
                            bpm: current_bpm,
                        }),
                    }
                }
                // Meter changes reshape pulse layout at compile time; the
                // pulse→time slope is unaffected.
                _ => {}
            }
        }

        Self {
            resolution,
            segments,
        }
    }

    pub fn resolution(&self) -> u64 {
        self.resolution
    }

    /// Elapsed seconds at `pulse`.
    ///
    /// A query exactly on a stop's pulse yields the instant the pulse is
    /// reached; the stop's dead time is charged only to later pulses.
    pub fn pulse_to_time(&self, pulse: i64) -> f64 {
        if pulse <= 0 {
            return 0.0;
        }
        let index = self.segment_at_pulse(pulse);
        let seg = &self.segments[index];
        if seg.pulse == pulse {
            seg.start
        } else {
            seg.after + pulses_to_seconds(pulse - seg.pulse, self.resolution, seg.bpm)
        }
    }

    /// Pulse position at elapsed seconds `time`.
    ///
    /// A query landing inside a stop returns the pulse at the start of the
    /// stop; pulses never advance during dead time.
    pub fn time_to_pulse(&self, time: f64) -> i64 {
        if time <= 0.0 {
            return 0;
        }
        let index = self.segment_at_time(time);
        let seg = &self.segments[index];
        if time < seg.after {
            return seg.pulse;
        }
        let bpm = seg.bpm.abs();
        if bpm <= f64::EPSILON {
            return seg.pulse;
        }
        seg.pulse + ((time - seg.after) * bpm / 60.0 * self.resolution as f64) as i64
    }

    /// Signed tempo in effect at `pulse`. Negative values are the authored
    /// reverse-scroll markers; duration math always uses the absolute value.
    pub fn bpm_at(&self, pulse: i64) -> f64 {
        self.segments[self.segment_at_pulse(pulse)].bpm
    }

    /// Index of the last segment with `segment.pulse <= pulse`.
    fn segment_at_pulse(&self, pulse: i64) -> usize {
        self.segments
            .partition_point(|s| s.pulse <= pulse)
            .saturating_sub(1)
    }

    /// Index of the last segment with `segment.start <= time`.
    fn segment_at_time(&self, time: f64) -> usize {
        self.segments
            .partition_point(|s| s.start <= time)
            .saturating_sub(1)
    }
}

/// Forward-walking cache over a [`TimelineClock`].
///
/// Valid for monotonically non-decreasing queries; a backward seek must call
/// [`ClockCursor::reset`]. Amortizes the per-tick query to O(1).
#[derive(Debug, Clone, Default)]
pub struct ClockCursor {
    index: usize,
}

impl ClockCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Same contract as [`TimelineClock::time_to_pulse`], resuming the
    /// segment walk from the previous query.
    pub fn time_to_pulse(&mut self, clock: &TimelineClock, time: f64) -> i64 {
        if time <= 0.0 {
            return 0;
        }
        while self.index + 1 < clock.segments.len()
            && clock.segments[self.index + 1].start <= time
        {
            self.index += 1;
        }
        let seg = &clock.segments[self.index];
        if time < seg.after {
            return seg.pulse;
        }
        let bpm = seg.bpm.abs();
        if bpm <= f64::EPSILON {
            return seg.pulse;
        }
        seg.pulse + ((time - seg.after) * bpm / 60.0 * clock.resolution as f64) as i64
    }
}
