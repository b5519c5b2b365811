use beatcore::chart::ChartCompiler;
use beatcore::event::{Event, EventKind};
use beatcore::play::{
    Gauge, GaugePreset, JudgeRank, JudgementEngine, PlayerScheduler, TimingWindows, Verdict,
    WindowPreset,
};
use beatcore::{Chart, CompileConfig, EventTimeline, TimelineClock};
use proptest::prelude::*;

fn compile(source: &str) -> Chart {
    ChartCompiler::new(CompileConfig::default())
        .compile(source, false)
        .expect("chart should compile")
}

#[test]
fn event_list_is_pulse_sorted_with_ranked_ties() {
    let chart = compile(
        "#BPM 120\n\
         #STOP01 96\n\
         #BPM02 240\n\
         #00111:01\n\
         #00109:01\n\
         #00108:02\n",
    );
    let events = chart.timeline.events();

    for pair in events.windows(2) {
        assert!(pair[0].pulse <= pair[1].pulse, "events must be pulse-sorted");
        if pair[0].pulse == pair[1].pulse {
            assert!(
                pair[0].kind.sort_rank() <= pair[1].kind.sort_rank(),
                "at a shared pulse a stop sorts after notes and before a bpm change"
            );
        }
    }

    // The note, stop and tempo change all land on the measure-1 boundary.
    let ranked: Vec<u8> = events
        .iter()
        .filter(|e| e.pulse == 1 && e.kind.sort_rank() > 0)
        .map(|e| e.kind.sort_rank())
        .collect();
    assert_eq!(ranked, vec![1, 2]);
}

#[test]
fn single_note_scenario() {
    // One measure, four slots, a single note in the second slot.
    let chart = compile("#BPM 120\n#00011:0100\n");
    assert_eq!(chart.timeline.resolution(), 4);
    assert_eq!(chart.timeline.total_notes(), 1);

    let note = chart
        .timeline
        .events()
        .iter()
        .find(|e| matches!(e.kind, EventKind::Note { .. }))
        .expect("one note event");
    assert_eq!(note.pulse, 1);
    assert!((note.timestamp - 60.0 / 120.0 / 4.0).abs() < 1e-9);
}

#[test]
fn mixed_length_channels_normalize_to_lcm() {
    let chart = compile(
        "#BPM 120\n\
         #00011:0100\n\
         #00012:0102010201020102\n",
    );
    assert_eq!(chart.timeline.resolution(), 8);

    // The 4-slot channel's note lands on an even pulse after normalization.
    let pulses: Vec<i64> = chart
        .timeline
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Note { .. }))
        .map(|e| e.pulse)
        .collect();
    assert!(pulses.contains(&2));
    assert!(pulses.iter().all(|p| (0..8).contains(p)));
}

#[test]
fn long_notes_never_end_before_they_start() {
    let chart = compile(
        "#LNTYPE 1\n\
         #BPM 120\n\
         #00151:01000100\n\
         #00251:01\n",
    );
    let events = chart.timeline.events();

    let mut spans = 0;
    for event in events {
        if let EventKind::LongNoteStart { pair, .. } = event.kind {
            let end = &events[pair];
            assert!(matches!(end.kind, EventKind::LongNoteEnd { .. }));
            assert!(end.pulse - event.pulse >= 0);
            spans += 1;
        }
    }
    assert_eq!(spans, 1);

    // The unterminated marker in measure 2 came out as a plain note.
    assert!(events
        .iter()
        .any(|e| e.pulse == 8 && matches!(e.kind, EventKind::Note { .. })));
}

#[test]
fn stop_adds_dead_time_without_pulse_advance() {
    let chart = compile(
        "#BPM 120\n\
         #STOP01 192\n\
         #00109:01\n",
    );
    let clock = TimelineClock::new(&chart.timeline);

    // 192 ticks is one full measure: at resolution 1 and 120 bpm that is
    // one pulse of dead time, 0.5 s.
    assert!((clock.pulse_to_time(1) - 0.5).abs() < 1e-9);
    assert!((clock.pulse_to_time(2) - 1.5).abs() < 1e-9);
    assert_eq!(clock.time_to_pulse(0.75), 1);
    assert_eq!(clock.time_to_pulse(0.999), 1);
    assert_eq!(clock.time_to_pulse(1.5), 2);
}

#[test]
fn unplayed_chart_misses_every_note() {
    let chart = compile("#BPM 120\n#00111:01010101\n");
    let clock = TimelineClock::new(&chart.timeline);
    let mut scheduler = PlayerScheduler::new();
    let mut engine = JudgementEngine::new(
        TimingWindows::new(WindowPreset::SevenKey, JudgeRank::Normal),
        Gauge::new(
            GaugePreset::Normal,
            chart.meta.total,
            chart.timeline.total_notes(),
        ),
    );

    let end = chart.timeline.length_seconds() + 2.0;
    while scheduler.time() < end {
        scheduler.update(&chart.timeline, &clock, 0.05, &mut [&mut engine]);
        engine.update(scheduler.time());
    }

    assert_eq!(engine.state().poor as usize, chart.timeline.total_notes());
    assert_eq!(engine.state().combo, 0);
    assert_eq!(engine.pending_notes(), 0);
}

proptest! {
    #[test]
    fn clock_round_trip_is_idempotent(
        t in 0.0f64..30.0,
        bpm in 60.0f64..240.0,
        stop in 0i64..16,
    ) {
        let timeline = EventTimeline::build(
            4,
            120.0,
            vec![
                Event::new(4, EventKind::Bpm { bpm }),
                Event::new(8, EventKind::Stop { pulses: stop }),
                Event::new(12, EventKind::Bpm { bpm: 180.0 }),
            ],
        );
        let clock = TimelineClock::new(&timeline);

        let t1 = clock.pulse_to_time(clock.time_to_pulse(t));
        let t2 = clock.pulse_to_time(clock.time_to_pulse(t1));

        // Mapping a time through the clock never moves it forward, and a
        // second pass stays within one pulse quantum at the slowest tempo.
        prop_assert!(t1 <= t + 1e-9);
        let quantum = 60.0 / 60.0 / 4.0;
        prop_assert!((t2 - t1).abs() <= quantum + 1e-9);
    }

    #[test]
    fn gauge_health_stays_clamped(
        hits in prop::collection::vec(0usize..6, 0..200),
        preset_index in 0usize..4,
    ) {
        let verdicts = [
            Verdict::Perfect,
            Verdict::Great,
            Verdict::Good,
            Verdict::Bad,
            Verdict::MissLate,
            Verdict::MissEarly,
        ];
        let presets = [
            GaugePreset::Easy,
            GaugePreset::Normal,
            GaugePreset::Hard,
            GaugePreset::Hazard,
        ];
        let mut gauge = Gauge::new(presets[preset_index], 250.0, 50);
        for hit in hits {
            gauge.update(verdicts[hit]);
            prop_assert!(gauge.health() >= gauge.min_health() - 1e-12);
            prop_assert!(gauge.health() <= 1.0 + 1e-12);
        }
    }
}
