use std::collections::{HashMap, HashSet};

use crate::chart::compiler::Chart;
use crate::config::PlayConfig;
use crate::event::{Event, EventIndex};
use crate::play::gauge::Gauge;
use crate::play::scheduler::EventConsumer;
use crate::play::score::{self, Grade};
use crate::play::windows::{JudgeRank, TimingWindows, Verdict};
use crate::timeline::EventTimeline;

/// Which input edge a pending note is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JudgeType {
    Press,
    Release,
}

/// Ephemeral record for a note awaiting input, created when the scheduler
/// dispatches it and destroyed once judged.
#[derive(Debug, Clone)]
struct NoteScore {
    lane: usize,
    pulse: i64,
    expected: f64,
    judge_type: JudgeType,
    /// For a hold start, the timeline index of its paired end.
    pair: Option<EventIndex>,
}

impl NoteScore {
    fn key(&self) -> (i64, usize, JudgeType) {
        (self.pulse, self.lane, self.judge_type)
    }
}

/// Session results: combo, per-band counts, gauge health and timing-offset
/// statistics. Mutated only by the judgement algorithm.
#[derive(Debug)]
pub struct JudgeState {
    pub combo: u32,
    pub max_combo: u32,
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub bad: u32,
    pub poor: u32,
    pub gauge: Gauge,
    pub early_hits: u32,
    pub late_hits: u32,
    offset_sum: f64,
    judged_hits: u32,
}

impl JudgeState {
    fn new(gauge: Gauge) -> Self {
        Self {
            combo: 0,
            max_combo: 0,
            perfect: 0,
            great: 0,
            good: 0,
            bad: 0,
            poor: 0,
            gauge,
            early_hits: 0,
            late_hits: 0,
            offset_sum: 0.0,
            judged_hits: 0,
        }
    }

    pub fn ex_score(&self) -> u32 {
        score::ex_score(self.perfect, self.great)
    }

    pub fn grade(&self, total_notes: usize) -> Grade {
        score::grade(self.ex_score(), total_notes)
    }

    /// Mean signed hit offset in seconds over every judged (non-miss) hit.
    pub fn mean_offset(&self) -> f64 {
        if self.judged_hits == 0 {
            0.0
        } else {
            self.offset_sum / self.judged_hits as f64
        }
    }
}

/// Matches press/release input against pending scheduled notes and keeps the
/// session's combo, counts and gauge.
///
/// Register the engine as a scheduler consumer so notes become pending as
/// they are dispatched, then feed it input edges and per-tick `update` calls.
/// Input with nothing to match is a silent no-op; timing noise is expected.
#[derive(Debug)]
pub struct JudgementEngine {
    windows: TimingWindows,
    state: JudgeState,
    pending: Vec<NoteScore>,
    /// Keys of notes already judged, so a late dispatch or duplicate input
    /// cannot judge one twice.
    resolved: HashSet<(i64, usize, JudgeType)>,
    /// Lane → timeline index of the active hold's end event.
    active_holds: HashMap<usize, EventIndex>,
    held: HashSet<usize>,
}

impl JudgementEngine {
    pub fn new(windows: TimingWindows, gauge: Gauge) -> Self {
        Self {
            windows,
            state: JudgeState::new(gauge),
            pending: Vec::new(),
            resolved: HashSet::new(),
            active_holds: HashMap::new(),
            held: HashSet::new(),
        }
    }

    /// Engine for one session over a compiled chart: windows scaled by the
    /// chart's `#RANK` (unless the configuration overrides it), the gauge
    /// calibrated by the chart's `#TOTAL` over its note count.
    pub fn for_chart(config: &PlayConfig, chart: &Chart) -> Self {
        let rank = config
            .judge_rank
            .unwrap_or_else(|| JudgeRank::from_rank(chart.meta.judge_rank));
        let windows = TimingWindows::new(config.windows, rank);
        let gauge = Gauge::new(config.gauge, chart.meta.total, chart.timeline.total_notes());
        Self::new(windows, gauge)
    }

    pub fn state(&self) -> &JudgeState {
        &self.state
    }

    pub fn pending_notes(&self) -> usize {
        self.pending.len()
    }

    /// A key went down on `lane` at session time `time`.
    pub fn key_down(&mut self, lane: usize, time: f64) {
        self.held.insert(lane);
        let Some(note) = self.take_best_pending(lane, JudgeType::Press, time) else {
            return;
        };
        let diff = time - note.expected;
        let Some(verdict) = self.windows.classify(diff) else {
            self.pending.push(note);
            return;
        };
        if verdict == Verdict::MissEarly {
            // An excessive early hit is a poor but does not consume the
            // note; the player can still hit it properly.
            self.pending.push(note);
            self.apply(verdict, diff);
            return;
        }
        self.resolved.insert(note.key());
        if let Some(end_index) = note.pair {
            self.active_holds.insert(lane, end_index);
        }
        self.apply(verdict, diff);
    }

    /// A key went up on `lane` at session time `time`. Releasing a hold
    /// early judges its paired end as a miss right away, through the same
    /// path a press would take.
    pub fn key_up(&mut self, timeline: &EventTimeline, lane: usize, time: f64) {
        self.held.remove(&lane);
        let Some(end_index) = self.active_holds.remove(&lane) else {
            return;
        };
        let Some(end) = timeline.events().get(end_index) else {
            return;
        };
        let key = (end.pulse, lane, JudgeType::Release);
        if self.resolved.contains(&key) {
            return;
        }
        let diff = time - end.timestamp;
        let verdict = match self.windows.classify(diff) {
            Some(v) if !v.is_miss() => v,
            _ if diff < 0.0 => Verdict::MissEarly,
            _ => Verdict::MissLate,
        };
        self.resolved.insert(key);
        self.pending
            .retain(|n| !(n.lane == lane && n.judge_type == JudgeType::Release && n.pulse == end.pulse));
        self.apply(verdict, diff);
    }

    /// Advance the session time: every pending note whose miss-late window
    /// has elapsed is judged a poor.
    pub fn update(&mut self, time: f64) {
        let miss_after = self.windows.miss_late();
        let mut missed = Vec::new();
        self.pending.retain(|note| {
            if time > note.expected + miss_after {
                missed.push(note.key());
                false
            } else {
                true
            }
        });
        for key in missed {
            self.resolved.insert(key);
            self.apply(Verdict::MissLate, 0.0);
        }
    }

    fn push_pending(
        &mut self,
        event: &Event,
        lane: usize,
        judge_type: JudgeType,
        pair: Option<EventIndex>,
    ) {
        let note = NoteScore {
            lane,
            pulse: event.pulse,
            expected: event.timestamp,
            judge_type,
            pair,
        };
        if self.resolved.contains(&note.key()) {
            return;
        }
        self.pending.push(note);
    }

    /// Best pending candidate on `lane` for `judge_type`: minimum absolute
    /// offset, ties broken by earliest pulse. Candidates outside the
    /// outermost window are never matched.
    fn take_best_pending(
        &mut self,
        lane: usize,
        judge_type: JudgeType,
        time: f64,
    ) -> Option<NoteScore> {
        let outermost = self.windows.outermost();
        let mut best: Option<usize> = None;
        for (i, note) in self.pending.iter().enumerate() {
            if note.lane != lane || note.judge_type != judge_type {
                continue;
            }
            let diff = (time - note.expected).abs();
            if diff > outermost {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let other = &self.pending[b];
                    let other_diff = (time - other.expected).abs();
                    if diff < other_diff || (diff == other_diff && note.pulse < other.pulse) {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best.map(|i| self.pending.remove(i))
    }

    fn apply(&mut self, verdict: Verdict, diff: f64) {
        if verdict.keeps_combo() {
            self.state.combo += 1;
            self.state.max_combo = self.state.max_combo.max(self.state.combo);
        } else {
            self.state.combo = 0;
        }
        match verdict {
            Verdict::Perfect => self.state.perfect += 1,
            Verdict::Great => self.state.great += 1,
            Verdict::Good => self.state.good += 1,
            Verdict::Bad => self.state.bad += 1,
            Verdict::MissLate | Verdict::MissEarly => self.state.poor += 1,
        }
        if !verdict.is_miss() {
            self.state.offset_sum += diff;
            self.state.judged_hits += 1;
            if diff < 0.0 {
                self.state.early_hits += 1;
            } else if diff > 0.0 {
                self.state.late_hits += 1;
            }
        }
        self.state.gauge.update(verdict);
    }
}

impl EventConsumer for JudgementEngine {
    fn on_note(&mut self, event: &Event, lane: usize, _wav: u16) {
        self.push_pending(event, lane, JudgeType::Press, None);
    }

    fn on_long_note_start(&mut self, event: &Event, lane: usize, _wav: u16, pair: EventIndex) {
        self.push_pending(event, lane, JudgeType::Press, Some(pair));
    }

    fn on_long_note_end(&mut self, event: &Event, lane: usize, _wav: u16, _pair: EventIndex) {
        self.push_pending(event, lane, JudgeType::Release, None);
    }

    fn on_landmine(&mut self, _event: &Event, lane: usize, damage: f64) {
        if self.held.contains(&lane) {
            self.state.gauge.apply_damage(damage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::play::gauge::GaugePreset;
    use crate::play::windows::{JudgeRank, WindowPreset};

    fn engine() -> JudgementEngine {
        JudgementEngine::new(
            TimingWindows::new(WindowPreset::SevenKey, JudgeRank::Easy),
            Gauge::new(GaugePreset::Normal, 300.0, 100),
        )
    }

    fn note(pulse: i64) -> Event {
        Event::new(pulse, EventKind::Note { lane: 0, wav: 1 })
    }

    // One pulse at 120 bpm, resolution 4, lasts 0.125 s.
    fn timeline(events: Vec<Event>) -> EventTimeline {
        EventTimeline::build(4, 120.0, events)
    }

    fn dispatch_all(engine: &mut JudgementEngine, timeline: &EventTimeline) {
        for event in timeline.events() {
            match event.kind {
                EventKind::Note { lane, wav } => engine.on_note(event, lane, wav),
                EventKind::LongNoteStart { lane, wav, pair } => {
                    engine.on_long_note_start(event, lane, wav, pair)
                }
                EventKind::LongNoteEnd { lane, wav, pair } => {
                    engine.on_long_note_end(event, lane, wav, pair)
                }
                _ => {}
            }
        }
    }

    #[test]
    fn hit_in_third_band_is_good() {
        let timeline = timeline(vec![note(8)]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        let gauge_before = engine.state().gauge.health();
        engine.key_down(0, 1.05); // expected 1.0, diff 0.05
        let state = engine.state();
        assert_eq!(state.good, 1);
        assert_eq!(state.combo, 1);
        assert!(state.gauge.health() > gauge_before);
    }

    #[test]
    fn orphan_press_is_a_no_op() {
        let timeline = timeline(vec![note(0)]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        // Expected at 0.0; a press two seconds out matches nothing.
        engine.key_down(0, 2.0);
        let state = engine.state();
        assert_eq!(state.perfect + state.great + state.good + state.bad + state.poor, 0);
        assert_eq!(engine.pending_notes(), 1);
    }

    #[test]
    fn nearest_note_wins_ties_to_earliest() {
        // Notes at 0.25 and 0.75; a press at 0.74 must take the second.
        let timeline = timeline(vec![note(2), note(6)]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        engine.key_down(0, 0.74);
        assert_eq!(engine.state().perfect, 1);
        assert_eq!(engine.pending_notes(), 1);

        // The survivor is the pulse-2 note; judge it late as a bad.
        engine.key_down(0, 0.42);
        assert_eq!(engine.state().bad, 1);
        assert_eq!(engine.pending_notes(), 0);
    }

    #[test]
    fn pending_notes_auto_miss_past_the_window() {
        let timeline = timeline(vec![note(0), note(2)]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        engine.key_down(0, 0.0);
        assert_eq!(engine.state().combo, 1);

        engine.update(1.0);
        let state = engine.state();
        assert_eq!(state.poor, 1);
        assert_eq!(state.combo, 0);
        assert_eq!(engine.pending_notes(), 0);

        // Already judged; another pass changes nothing.
        engine.update(2.0);
        assert_eq!(engine.state().poor, 1);
    }

    #[test]
    fn early_hold_release_misses_the_end_immediately() {
        let timeline = timeline(vec![
            Event::new(
                0,
                EventKind::LongNoteStart {
                    lane: 0,
                    wav: 1,
                    pair: usize::MAX,
                },
            ),
            Event::new(
                8,
                EventKind::LongNoteEnd {
                    lane: 0,
                    wav: 1,
                    pair: usize::MAX,
                },
            ),
        ]);
        let mut engine = engine();

        // Dispatch only the start, as the scheduler would at pulse 0.
        let start = timeline.events()[0].clone();
        let EventKind::LongNoteStart { lane, wav, pair } = start.kind else {
            panic!("expected a hold start");
        };
        engine.on_long_note_start(&start, lane, wav, pair);

        engine.key_down(0, 0.0);
        assert_eq!(engine.state().perfect, 1);

        // Let go long before the end at 1.0.
        engine.key_up(&timeline, 0, 0.3);
        let state = engine.state();
        assert_eq!(state.poor, 1);
        assert_eq!(state.combo, 0);

        // When the end finally dispatches it is already judged.
        let end = timeline.events()[1].clone();
        let EventKind::LongNoteEnd { lane, wav, pair } = end.kind else {
            panic!("expected a hold end");
        };
        engine.on_long_note_end(&end, lane, wav, pair);
        assert_eq!(engine.pending_notes(), 0);
        engine.update(10.0);
        assert_eq!(engine.state().poor, 1);
    }

    #[test]
    fn held_to_the_end_judges_the_release() {
        let timeline = timeline(vec![
            Event::new(
                0,
                EventKind::LongNoteStart {
                    lane: 0,
                    wav: 1,
                    pair: usize::MAX,
                },
            ),
            Event::new(
                8,
                EventKind::LongNoteEnd {
                    lane: 0,
                    wav: 1,
                    pair: usize::MAX,
                },
            ),
        ]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        engine.key_down(0, 0.01);
        engine.key_up(&timeline, 0, 1.02); // end expected at 1.0
        let state = engine.state();
        assert_eq!(state.perfect, 1);
        assert_eq!(state.great, 1);
        assert_eq!(state.combo, 2);
    }

    #[test]
    fn landmine_only_hurts_a_held_lane() {
        let mut engine = engine();
        let mine = Event::new(
            4,
            EventKind::Landmine {
                lane: 1,
                damage: 10.0,
            },
        );

        let before = engine.state().gauge.health();
        engine.on_landmine(&mine, 1, 10.0);
        assert!((engine.state().gauge.health() - before).abs() < 1e-12);

        engine.key_down(1, 0.5); // nothing pending, but the lane is now held
        engine.on_landmine(&mine, 1, 10.0);
        assert!((before - engine.state().gauge.health() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn excessive_early_press_keeps_the_note_alive() {
        let timeline = timeline(vec![note(8)]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        engine.key_down(0, 0.5); // diff -0.5, inside the outer band only
        let state = engine.state();
        assert_eq!(state.poor, 1);
        assert_eq!(engine.pending_notes(), 1);

        engine.key_down(0, 1.0);
        assert_eq!(engine.state().perfect, 1);
    }

    #[test]
    fn session_engine_calibrates_from_chart() {
        use crate::chart::ChartCompiler;
        use crate::config::CompileConfig;

        let chart = ChartCompiler::new(CompileConfig::default())
            .compile("#BPM 120\n#TOTAL 200\n#00011:01010101\n", false)
            .unwrap();
        let config = PlayConfig {
            windows: WindowPreset::for_mode(chart.mode),
            ..PlayConfig::default()
        };
        let mut engine = JudgementEngine::for_chart(&config, &chart);

        let first = chart
            .timeline
            .events()
            .iter()
            .find(|e| matches!(e.kind, EventKind::Note { .. }))
            .cloned()
            .expect("chart has notes");
        let EventKind::Note { lane, wav } = first.kind else {
            unreachable!();
        };
        engine.on_note(&first, lane, wav);
        engine.key_down(lane, first.timestamp);
        assert_eq!(engine.state().perfect, 1);
        // #TOTAL 200 over 4 notes: one perfect recovers half the gauge.
        assert!((engine.state().gauge.health() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn chart_rank_scales_the_session_windows() {
        use crate::chart::ChartCompiler;
        use crate::config::CompileConfig;

        // A hit 15 ms late lands in a different band per rank: with the
        // seven-key base windows, rank 0 (x0.25) makes it a good, the
        // default rank 2 (x0.75) a great, and an Easy override a perfect.
        let hit = |source: &str, override_rank: Option<JudgeRank>| {
            let chart = ChartCompiler::new(CompileConfig::default())
                .compile(source, false)
                .unwrap();
            let config = PlayConfig {
                judge_rank: override_rank,
                ..PlayConfig::default()
            };
            let mut engine = JudgementEngine::for_chart(&config, &chart);
            let first = chart
                .timeline
                .events()
                .iter()
                .find(|e| matches!(e.kind, EventKind::Note { .. }))
                .cloned()
                .expect("chart has notes");
            let EventKind::Note { lane, wav } = first.kind else {
                unreachable!();
            };
            engine.on_note(&first, lane, wav);
            engine.key_down(lane, first.timestamp + 0.015);
            (
                engine.state().good,
                engine.state().great,
                engine.state().perfect,
            )
        };

        let strict = "#BPM 120\n#RANK 0\n#00011:01010101\n";
        assert_eq!(hit(strict, None), (1, 0, 0));

        let unranked = "#BPM 120\n#00011:01010101\n";
        assert_eq!(hit(unranked, None), (0, 1, 0));

        assert_eq!(hit(strict, Some(JudgeRank::Easy)), (0, 0, 1));
    }

    #[test]
    fn timing_statistics_track_signed_offsets() {
        let timeline = timeline(vec![note(0), note(2), note(4)]);
        let mut engine = engine();
        dispatch_all(&mut engine, &timeline);

        engine.key_down(0, 0.01);
        engine.key_down(0, 0.24);
        engine.key_down(0, 0.53);
        let state = engine.state();
        assert_eq!(state.early_hits, 1);
        assert_eq!(state.late_hits, 2);
        assert!((state.mean_offset() - 0.01 / 3.0).abs() < 1e-9);
    }
}
