use crate::clock::{ClockCursor, TimelineClock};
use crate::event::{BgaLayer, Event, EventIndex, EventKind};
use crate::timeline::EventTimeline;

/// Capability set for timeline consumers, one method per event kind.
///
/// Every method defaults to a no-op so a consumer implements only the
/// capabilities it cares about.
pub trait EventConsumer {
    fn on_note(&mut self, _event: &Event, _lane: usize, _wav: u16) {}
    fn on_long_note_start(&mut self, _event: &Event, _lane: usize, _wav: u16, _pair: EventIndex) {}
    fn on_long_note_end(&mut self, _event: &Event, _lane: usize, _wav: u16, _pair: EventIndex) {}
    fn on_landmine(&mut self, _event: &Event, _lane: usize, _damage: f64) {}
    fn on_key_sound_change(&mut self, _event: &Event, _lane: usize, _wav: u16) {}
    fn on_sound(&mut self, _event: &Event, _wav: u16) {}
    fn on_bpm(&mut self, _event: &Event, _bpm: f64) {}
    fn on_stop(&mut self, _event: &Event, _pulses: i64) {}
    fn on_meter(&mut self, _event: &Event, _factor: f64) {}
    fn on_measure(&mut self, _event: &Event, _measure: u32) {}
    fn on_bga(&mut self, _event: &Event, _id: u16, _layer: BgaLayer) {}
}

#[derive(Debug, Clone, Copy, Default)]
struct ConsumerCursor {
    next: usize,
    stopped: bool,
}

/// Cooperative, single-threaded, pull-based event scheduler.
///
/// One authoritative time is advanced per caller tick; the current pulse is
/// derived through the clock and every registered consumer is then advanced
/// to it in registration order, receiving each due event exactly once.
/// Consumers are matched to their cursors by slice position, so callers must
/// pass them in a stable order.
#[derive(Debug, Clone, Default)]
pub struct PlayerScheduler {
    time: f64,
    pulse: i64,
    clock_cursor: ClockCursor,
    cursors: Vec<ConsumerCursor>,
    stop_requested: bool,
    stopped: bool,
}

impl PlayerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pulse(&self) -> i64 {
        self.pulse
    }

    /// Request a stop; observed at the next tick boundary, never mid-dispatch.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop one consumer immediately and terminally. Its slot keeps existing
    /// so the remaining consumers stay aligned; restarting requires a seek.
    pub fn stop_consumer(&mut self, slot: usize) {
        if let Some(cursor) = self.cursors.get_mut(slot) {
            cursor.stopped = true;
        }
    }

    /// Advance the shared clock by `delta` seconds and dispatch every event
    /// that became due, in timeline order, to each consumer in slice order.
    pub fn update(
        &mut self,
        timeline: &EventTimeline,
        clock: &TimelineClock,
        delta: f64,
        consumers: &mut [&mut dyn EventConsumer],
    ) {
        if self.stopped {
            return;
        }
        if self.stop_requested {
            self.stopped = true;
            return;
        }
        self.sync_cursors(consumers.len());

        self.time += delta.max(0.0);
        self.advance_pulse(clock);
        self.dispatch_due(timeline, consumers);
    }

    /// Non-realtime stepping: jump the clock to the earliest undispatched
    /// event's timestamp and dispatch there. Returns `false` once every
    /// consumer has seen the whole timeline. Deterministic and frame-rate
    /// free, for headless rendering.
    pub fn step_to_next_event(
        &mut self,
        timeline: &EventTimeline,
        clock: &TimelineClock,
        consumers: &mut [&mut dyn EventConsumer],
    ) -> bool {
        if self.stopped {
            return false;
        }
        if self.stop_requested {
            self.stopped = true;
            return false;
        }
        self.sync_cursors(consumers.len());

        let events = timeline.events();
        let next = self
            .cursors
            .iter()
            .filter(|c| !c.stopped)
            .filter_map(|c| events.get(c.next))
            .map(|e| (e.timestamp, e.pulse))
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let Some((next_time, next_pulse)) = next else {
            return false;
        };

        self.time = self.time.max(next_time);
        self.advance_pulse(clock);
        // The clock may round just short of the target pulse; the event we
        // jumped to is due by construction.
        self.pulse = self.pulse.max(next_pulse);
        self.dispatch_due(timeline, consumers);
        true
    }

    /// Random access. Forward seeks reuse the cursors; a backward seek
    /// restarts every cursor from the beginning. Events strictly before the
    /// target pulse are skipped, never dispatched; events at the target
    /// pulse are due on the next tick.
    pub fn seek(&mut self, timeline: &EventTimeline, clock: &TimelineClock, time: f64) {
        if time < self.time {
            self.clock_cursor.reset();
            for cursor in &mut self.cursors {
                cursor.next = 0;
            }
            self.pulse = 0;
        }
        self.time = time.max(0.0);
        self.advance_pulse(clock);

        let events = timeline.events();
        for cursor in &mut self.cursors {
            while cursor.next < events.len() && events[cursor.next].pulse < self.pulse {
                cursor.next += 1;
            }
        }
    }

    fn sync_cursors(&mut self, consumers: usize) {
        while self.cursors.len() < consumers {
            self.cursors.push(ConsumerCursor::default());
        }
    }

    /// Derive the current pulse from the current time. While the active
    /// tempo is a reverse-scroll marker the pulse freezes rather than
    /// regressing; it resumes once the mapping lands past the reversed
    /// stretch.
    fn advance_pulse(&mut self, clock: &TimelineClock) {
        let target = self.clock_cursor.time_to_pulse(clock, self.time);
        if clock.bpm_at(target) >= 0.0 {
            self.pulse = self.pulse.max(target);
        }
    }

    fn dispatch_due(&mut self, timeline: &EventTimeline, consumers: &mut [&mut dyn EventConsumer]) {
        let events = timeline.events();
        for (slot, consumer) in consumers.iter_mut().enumerate() {
            let cursor = &mut self.cursors[slot];
            if cursor.stopped {
                continue;
            }
            while cursor.next < events.len() && events[cursor.next].pulse <= self.pulse {
                dispatch(&events[cursor.next], *consumer);
                cursor.next += 1;
            }
        }
    }
}

fn dispatch(event: &Event, consumer: &mut dyn EventConsumer) {
    match event.kind {
        EventKind::Note { lane, wav } => consumer.on_note(event, lane, wav),
        EventKind::LongNoteStart { lane, wav, pair } => {
            consumer.on_long_note_start(event, lane, wav, pair)
        }
        EventKind::LongNoteEnd { lane, wav, pair } => {
            consumer.on_long_note_end(event, lane, wav, pair)
        }
        EventKind::Landmine { lane, damage } => consumer.on_landmine(event, lane, damage),
        EventKind::KeySoundChange { lane, wav } => consumer.on_key_sound_change(event, lane, wav),
        EventKind::Sound { wav } => consumer.on_sound(event, wav),
        EventKind::Bpm { bpm } => consumer.on_bpm(event, bpm),
        EventKind::Stop { pulses } => consumer.on_stop(event, pulses),
        EventKind::Meter { factor } => consumer.on_meter(event, factor),
        EventKind::MeasureMarker { measure } => consumer.on_measure(event, measure),
        EventKind::Bga { id, layer } => consumer.on_bga(event, id, layer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(i64, &'static str)>,
    }

    impl EventConsumer for Recorder {
        fn on_note(&mut self, event: &Event, _lane: usize, _wav: u16) {
            self.seen.push((event.pulse, "note"));
        }
        fn on_bpm(&mut self, event: &Event, _bpm: f64) {
            self.seen.push((event.pulse, "bpm"));
        }
        fn on_stop(&mut self, event: &Event, _pulses: i64) {
            self.seen.push((event.pulse, "stop"));
        }
        fn on_sound(&mut self, event: &Event, _wav: u16) {
            self.seen.push((event.pulse, "sound"));
        }
    }

    fn note(pulse: i64, lane: usize) -> Event {
        Event::new(pulse, EventKind::Note { lane, wav: 1 })
    }

    fn setup(events: Vec<Event>) -> (EventTimeline, TimelineClock) {
        let timeline = EventTimeline::build(4, 120.0, events);
        let clock = TimelineClock::new(&timeline);
        (timeline, clock)
    }

    #[test]
    fn dispatches_due_events_once_in_order() {
        let (timeline, clock) = setup(vec![note(0, 0), note(2, 1), note(4, 0)]);
        let mut scheduler = PlayerScheduler::new();
        let mut recorder = Recorder::default();

        // One pulse lasts 0.125 s; advance past pulse 2.
        scheduler.update(&timeline, &clock, 0.3, &mut [&mut recorder]);
        assert_eq!(recorder.seen, vec![(0, "note"), (2, "note")]);

        // No re-dispatch on a no-op tick.
        scheduler.update(&timeline, &clock, 0.0, &mut [&mut recorder]);
        assert_eq!(recorder.seen.len(), 2);

        scheduler.update(&timeline, &clock, 0.3, &mut [&mut recorder]);
        assert_eq!(recorder.seen.last(), Some(&(4, "note")));
        assert_eq!(recorder.seen.len(), 3);
    }

    #[test]
    fn consumers_advance_in_registration_order() {
        let (timeline, clock) = setup(vec![note(0, 0), note(2, 1)]);
        let mut scheduler = PlayerScheduler::new();
        let mut first = Recorder::default();
        let mut second = Recorder::default();

        scheduler.update(&timeline, &clock, 0.3, &mut [&mut first, &mut second]);
        assert_eq!(first.seen, second.seen);
        assert_eq!(first.seen.len(), 2);
    }

    #[test]
    fn stop_flag_observed_at_tick_boundary() {
        let (timeline, clock) = setup(vec![note(0, 0), note(2, 1)]);
        let mut scheduler = PlayerScheduler::new();
        let mut recorder = Recorder::default();

        scheduler.update(&timeline, &clock, 0.1, &mut [&mut recorder]);
        let before = recorder.seen.len();
        scheduler.request_stop();
        scheduler.update(&timeline, &clock, 10.0, &mut [&mut recorder]);
        assert!(scheduler.is_stopped());
        assert_eq!(recorder.seen.len(), before);
    }

    #[test]
    fn stopped_consumer_receives_nothing_more() {
        let (timeline, clock) = setup(vec![note(0, 0), note(2, 1), note(4, 0)]);
        let mut scheduler = PlayerScheduler::new();
        let mut kept = Recorder::default();
        let mut dropped = Recorder::default();

        scheduler.update(&timeline, &clock, 0.1, &mut [&mut kept, &mut dropped]);
        scheduler.stop_consumer(1);
        scheduler.update(&timeline, &clock, 1.0, &mut [&mut kept, &mut dropped]);
        assert_eq!(kept.seen.len(), 3);
        assert_eq!(dropped.seen.len(), 1);
    }

    #[test]
    fn step_mode_is_deterministic_and_complete() {
        let events = vec![
            note(0, 0),
            Event::new(2, EventKind::Bpm { bpm: 240.0 }),
            Event::new(4, EventKind::Stop { pulses: 2 }),
            note(4, 1),
            note(8, 0),
        ];
        let (timeline, clock) = setup(events);
        let mut scheduler = PlayerScheduler::new();
        let mut recorder = Recorder::default();

        while scheduler.step_to_next_event(&timeline, &clock, &mut [&mut recorder]) {}
        let pulses: Vec<i64> = recorder.seen.iter().map(|(p, _)| *p).collect();
        assert_eq!(pulses, vec![0, 2, 4, 4, 8]);
        // Note sorts before the stop at the shared pulse.
        assert_eq!(recorder.seen[2].1, "note");
        assert_eq!(recorder.seen[3].1, "stop");
    }

    #[test]
    fn forward_seek_skips_without_dispatch() {
        let (timeline, clock) = setup(vec![note(0, 0), note(1, 1), note(4, 0)]);
        let mut scheduler = PlayerScheduler::new();
        let mut recorder = Recorder::default();

        scheduler.update(&timeline, &clock, 0.0, &mut [&mut recorder]);
        assert_eq!(recorder.seen, vec![(0, "note")]);

        // Seek past the pulse-1 note; it is skipped, not dispatched.
        scheduler.seek(&timeline, &clock, 0.35);
        scheduler.update(&timeline, &clock, 0.0, &mut [&mut recorder]);
        assert_eq!(recorder.seen, vec![(0, "note")]);

        scheduler.update(&timeline, &clock, 0.3, &mut [&mut recorder]);
        assert_eq!(recorder.seen, vec![(0, "note"), (4, "note")]);
    }

    #[test]
    fn backward_seek_restarts_cursors() {
        let (timeline, clock) = setup(vec![note(0, 0), note(2, 1)]);
        let mut scheduler = PlayerScheduler::new();
        let mut recorder = Recorder::default();

        scheduler.update(&timeline, &clock, 1.0, &mut [&mut recorder]);
        assert_eq!(recorder.seen.len(), 2);

        scheduler.seek(&timeline, &clock, 0.0);
        assert_eq!(scheduler.pulse(), 0);
        scheduler.update(&timeline, &clock, 1.0, &mut [&mut recorder]);
        // Everything replays after the restart.
        assert_eq!(recorder.seen.len(), 4);
    }

    #[test]
    fn negative_tempo_freezes_pulse() {
        let events = vec![
            Event::new(0, EventKind::Bpm { bpm: -120.0 }),
            note(2, 0),
        ];
        let (timeline, clock) = setup(events);
        let mut scheduler = PlayerScheduler::new();
        let mut recorder = Recorder::default();

        scheduler.update(&timeline, &clock, 0.3, &mut [&mut recorder]);
        // Pulse stays put while the tempo is reversed; only pulse-0 events
        // fire.
        assert_eq!(scheduler.pulse(), 0);
        assert_eq!(recorder.seen, vec![(0, "bpm")]);
    }
}
