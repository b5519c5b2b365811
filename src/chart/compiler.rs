use std::collections::{BTreeMap, HashMap, HashSet};

use log::warn;

use crate::chart::channel::{self, EMPTY, REPEAT_PREVIOUS};
use crate::chart::error::ChartError;
use crate::chart::lane::{PlayMode, PlayerSide};
use crate::config::CompileConfig;
use crate::event::{BgaLayer, Event, EventKind};
use crate::timeline::EventTimeline;

/// Stop definitions are authored in ticks, 192 per default-length measure.
const STOP_TICKS_PER_MEASURE: f64 = 192.0;

/// Header metadata carried alongside the compiled timeline.
#[derive(Debug, Clone)]
pub struct ChartMeta {
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub sub_artist: String,
    pub genre: String,
    pub player: i32,
    pub judge_rank: i32,
    pub total: f64,
    pub play_level: i32,
    pub difficulty: i32,
}

impl Default for ChartMeta {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            artist: String::new(),
            sub_artist: String::new(),
            genre: String::new(),
            player: 1,
            judge_rank: 2,
            total: 300.0,
            play_level: 0,
            difficulty: 0,
        }
    }
}

/// A fully compiled chart: metadata, resolved play mode, resource tables and
/// the event timeline. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Chart {
    pub meta: ChartMeta,
    pub mode: PlayMode,
    pub wav_defs: HashMap<u16, String>,
    pub bmp_defs: HashMap<u16, String>,
    pub timeline: EventTimeline,
}

/// Long-note encoding selected by `#LNTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LnMode {
    /// Non-zero starts, the same lane's next non-zero ends.
    PairedMarker,
    /// A contiguous non-zero run is one sustained note.
    SectionFill,
}

#[derive(Debug, Clone, Copy)]
enum ChannelClass {
    Bgm,
    Meter,
    InlineBpm,
    IndexedBpm,
    Stop,
    Bga(BgaLayer),
    Visible { side: PlayerSide, slot: usize },
    Invisible { side: PlayerSide, slot: usize },
    Long { side: PlayerSide, slot: usize },
    Mine { side: PlayerSide, slot: usize },
}

/// Raw channel data collected for one measure before normalization.
#[derive(Debug, Default)]
struct RawMeasure {
    meter: Option<f64>,
    /// Each BGM declaration is its own background lane, never merged.
    bgm: Vec<Vec<i32>>,
    /// Other channels: all declarations, merged once the LN mode is known.
    channels: BTreeMap<u16, Vec<Vec<i32>>>,
}

/// An in-progress section-fill long note, keyed by channel id.
#[derive(Debug)]
struct SectionRun {
    lane: usize,
    start_index: usize,
    start_pulse: i64,
    start_wav: u16,
    last_pulse: i64,
    last_wav: u16,
}

/// Line-notation chart compiler.
///
/// Best-effort by policy: malformed tokens, unknown channels and broken long
/// notes are logged and substituted, never fatal. Only a chart yielding no
/// events at all is an error.
pub struct ChartCompiler {
    config: CompileConfig,
}

impl ChartCompiler {
    pub fn new(config: CompileConfig) -> Self {
        Self { config }
    }

    /// Compile decoded chart text. `popn_hint` marks a source whose container
    /// format implies the 9-key layout.
    pub fn compile(&self, source: &str, popn_hint: bool) -> Result<Chart, ChartError> {
        let mut meta = ChartMeta::default();
        let mut initial_bpm: Option<f64> = None;
        let mut ln_mode = LnMode::PairedMarker;
        let mut ln_obj: Option<u16> = None;
        let mut bpm_defs: HashMap<u16, f64> = HashMap::new();
        let mut stop_defs: HashMap<u16, i64> = HashMap::new();
        let mut wav_defs: HashMap<u16, String> = HashMap::new();
        let mut bmp_defs: HashMap<u16, String> = HashMap::new();
        let mut measures: BTreeMap<u32, RawMeasure> = BTreeMap::new();
        let mut max_measure: u32 = 0;

        // Channel usage statistics for mode detection.
        let mut max_key_slot: usize = 0;
        let mut has_2p = false;

        for line in source.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix('#') else {
                continue;
            };
            let upper = rest.to_ascii_uppercase();

            if let Some((measure, ch, data)) = parse_channel_statement(&upper) {
                if measure > max_measure {
                    max_measure = measure;
                }
                let Some(class) = classify(ch) else {
                    warn!("unsupported channel {ch:02X} in measure {measure}, skipping");
                    continue;
                };
                let raw = measures.entry(measure).or_default();
                match class {
                    ChannelClass::Meter => {
                        if let Some(factor) = parse_num::<f64>(data, "measure meter") {
                            raw.meter = Some(factor);
                        }
                    }
                    ChannelClass::Bgm => raw.bgm.push(parse_slots(data, false)),
                    _ => {
                        let hex = matches!(class, ChannelClass::InlineBpm);
                        raw.channels
                            .entry(ch)
                            .or_default()
                            .push(parse_slots(data, hex));
                    }
                }
                match class {
                    ChannelClass::Visible { side, slot }
                    | ChannelClass::Invisible { side, slot }
                    | ChannelClass::Long { side, slot }
                    | ChannelClass::Mine { side, slot } => match side {
                        PlayerSide::Player1 => max_key_slot = max_key_slot.max(slot + 1),
                        PlayerSide::Player2 => has_2p = true,
                    },
                    _ => {}
                }
                continue;
            }

            if let Some(value) = upper.strip_prefix("PLAYER ") {
                meta.player = parse_num(value, "PLAYER").unwrap_or(1);
            } else if upper.starts_with("GENRE ") {
                meta.genre = rest[6..].trim().to_string();
            } else if upper.starts_with("TITLE ") {
                meta.title = rest[6..].trim().to_string();
            } else if upper.starts_with("SUBTITLE ") {
                meta.subtitle = rest[9..].trim().to_string();
            } else if upper.starts_with("ARTIST ") {
                meta.artist = rest[7..].trim().to_string();
            } else if upper.starts_with("SUBARTIST ") {
                meta.sub_artist = rest[10..].trim().to_string();
            } else if let Some(value) = upper.strip_prefix("BPM ") {
                match parse_num::<f64>(value, "BPM") {
                    Some(bpm) if bpm.abs() > f64::EPSILON => initial_bpm = Some(bpm),
                    Some(_) => warn!("ignoring zero initial bpm"),
                    None => {}
                }
            } else if upper.starts_with("BPM") && upper.len() >= 6 && upper.as_bytes()[5] == b' ' {
                if let (Some(id), Some(bpm)) = (
                    parse_base36_id(&upper[3..5]),
                    parse_num::<f64>(&upper[5..], "BPMxx"),
                ) {
                    bpm_defs.insert(id, bpm);
                }
            } else if upper.starts_with("STOP") && upper.len() >= 7 && upper.as_bytes()[6] == b' ' {
                if let (Some(id), Some(ticks)) = (
                    parse_base36_id(&upper[4..6]),
                    parse_num::<i64>(&upper[6..], "STOPxx"),
                ) {
                    stop_defs.insert(id, ticks);
                }
            } else if let Some(value) = upper.strip_prefix("RANK ") {
                meta.judge_rank = parse_num(value, "RANK").unwrap_or(2);
            } else if let Some(value) = upper.strip_prefix("TOTAL ") {
                meta.total = parse_num(value, "TOTAL").unwrap_or(300.0);
            } else if let Some(value) = upper.strip_prefix("PLAYLEVEL ") {
                meta.play_level = parse_num(value, "PLAYLEVEL").unwrap_or(0);
            } else if let Some(value) = upper.strip_prefix("DIFFICULTY ") {
                meta.difficulty = parse_num(value, "DIFFICULTY").unwrap_or(0);
            } else if let Some(value) = upper.strip_prefix("LNTYPE ") {
                ln_mode = match parse_num::<i32>(value, "LNTYPE") {
                    Some(2) => LnMode::SectionFill,
                    _ => LnMode::PairedMarker,
                };
            } else if let Some(value) = upper.strip_prefix("LNOBJ ") {
                ln_obj = parse_base36_id(value.trim());
            } else if upper.starts_with("WAV") && upper.len() >= 6 {
                if let (Some(id), Some(name)) = (
                    upper.get(3..5).and_then(parse_base36_id),
                    rest.get(5..).map(str::trim),
                ) {
                    if !name.is_empty() {
                        wav_defs.insert(id, name.to_string());
                    }
                }
            } else if upper.starts_with("BMP") && upper.len() >= 6 && upper.as_bytes()[3] != b' ' {
                if let (Some(id), Some(name)) = (
                    upper.get(3..5).and_then(parse_base36_id),
                    rest.get(5..).map(str::trim),
                ) {
                    if !name.is_empty() {
                        bmp_defs.insert(id, name.to_string());
                    }
                }
            }
        }

        let initial_bpm = initial_bpm.unwrap_or(self.config.default_bpm);

        // Global resolution: LCM of every channel length in the chart.
        let mut resolution: u64 = 1;
        for raw in measures.values() {
            for lane in &raw.bgm {
                resolution =
                    channel::lcm_bounded(resolution, lane.len() as u64, self.config.max_resolution);
            }
            for declarations in raw.channels.values() {
                for declaration in declarations {
                    resolution = channel::lcm_bounded(
                        resolution,
                        declaration.len() as u64,
                        self.config.max_resolution,
                    );
                }
            }
        }

        let mode = self
            .config
            .forced_mode
            .unwrap_or_else(|| PlayMode::detect(meta.player, max_key_slot, has_2p, popn_hint));

        let events = self.extract_events(
            &measures,
            max_measure,
            resolution,
            mode,
            ln_mode,
            ln_obj,
            &bpm_defs,
            &stop_defs,
        );

        if !events.iter().any(|e| {
            !matches!(
                e.kind,
                EventKind::MeasureMarker { .. } | EventKind::Meter { .. }
            )
        }) {
            return Err(ChartError::EmptyChart(
                "no object on any channel".to_string(),
            ));
        }

        Ok(Chart {
            meta,
            mode,
            wav_defs,
            bmp_defs,
            timeline: EventTimeline::build(resolution, initial_bpm, events),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_events(
        &self,
        measures: &BTreeMap<u32, RawMeasure>,
        max_measure: u32,
        resolution: u64,
        mode: PlayMode,
        ln_mode: LnMode,
        ln_obj: Option<u16>,
        bpm_defs: &HashMap<u16, f64>,
        stop_defs: &HashMap<u16, i64>,
    ) -> Vec<Event> {
        let mut events: Vec<Event> = Vec::new();
        let mut measure_start: i64 = 0;
        let mut prev_meter = 1.0;

        // Per-lane index of the last visible note, for #LNOBJ conversion.
        let mut last_visible: HashMap<usize, usize> = HashMap::new();
        // Lanes with an open paired-marker long note.
        let mut paired_open: HashSet<usize> = HashSet::new();
        // In-progress section-fill runs by channel id.
        let mut section_runs: HashMap<u16, SectionRun> = HashMap::new();
        // Paired-marker positions; a visible note at the same spot is a
        // duplicate and gets dropped.
        let mut long_positions: HashSet<(i64, usize)> = HashSet::new();

        for measure in 0..=max_measure {
            let raw = measures.get(&measure);
            let meter = match raw.and_then(|r| r.meter) {
                Some(factor) if factor > 0.0 => factor,
                Some(factor) => {
                    warn!("non-positive meter {factor} in measure {measure}, using 1.0");
                    1.0
                }
                None => 1.0,
            };
            let measure_len = ((resolution as f64 * meter).round() as i64).max(1);

            events.push(Event::new(
                measure_start,
                EventKind::MeasureMarker { measure },
            ));
            if (meter - prev_meter).abs() > f64::EPSILON {
                events.push(Event::new(measure_start, EventKind::Meter { factor: meter }));
            }
            prev_meter = meter;

            let mut present_long: HashSet<u16> = HashSet::new();

            if let Some(raw) = raw {
                for lane_data in &raw.bgm {
                    if lane_data.is_empty() {
                        continue;
                    }
                    for (slot, &value) in lane_data.iter().enumerate() {
                        if value <= EMPTY {
                            continue;
                        }
                        let pulse =
                            measure_start + slot as i64 * measure_len / lane_data.len() as i64;
                        events.push(Event::new(pulse, EventKind::Sound { wav: value as u16 }));
                    }
                }

                for (&ch, declarations) in &raw.channels {
                    let Some(class) = classify(ch) else { continue };
                    let workaround = ln_mode == LnMode::SectionFill
                        && matches!(class, ChannelClass::Long { .. });
                    if matches!(class, ChannelClass::Long { .. }) {
                        present_long.insert(ch);
                    }

                    let mut data = declarations[0].clone();
                    for declaration in &declarations[1..] {
                        data = channel::merge(
                            &data,
                            declaration,
                            self.config.max_resolution,
                            workaround,
                        );
                    }
                    if data.is_empty() {
                        continue;
                    }

                    for (slot, &value) in data.iter().enumerate() {
                        let pulse = measure_start + slot as i64 * measure_len / data.len() as i64;
                        match class {
                            ChannelClass::InlineBpm => {
                                if value > EMPTY {
                                    events.push(Event::new(
                                        pulse,
                                        EventKind::Bpm { bpm: value as f64 },
                                    ));
                                }
                            }
                            ChannelClass::IndexedBpm => {
                                if value <= EMPTY {
                                    continue;
                                }
                                match bpm_defs.get(&(value as u16)) {
                                    Some(&bpm) => {
                                        events.push(Event::new(pulse, EventKind::Bpm { bpm }))
                                    }
                                    None => warn!("undefined bpm index {value:02}, skipping"),
                                }
                            }
                            ChannelClass::Stop => {
                                if value <= EMPTY {
                                    continue;
                                }
                                match stop_defs.get(&(value as u16)) {
                                    Some(&ticks) => {
                                        let pulses = (ticks as f64 * resolution as f64
                                            / STOP_TICKS_PER_MEASURE)
                                            .round() as i64;
                                        events.push(Event::new(pulse, EventKind::Stop { pulses }));
                                    }
                                    None => warn!("undefined stop index {value:02}, skipping"),
                                }
                            }
                            ChannelClass::Bga(layer) => {
                                if value > EMPTY {
                                    events.push(Event::new(
                                        pulse,
                                        EventKind::Bga {
                                            id: value as u16,
                                            layer,
                                        },
                                    ));
                                }
                            }
                            ChannelClass::Visible { side, slot: key } => {
                                if value <= EMPTY {
                                    continue;
                                }
                                let Some(lane) = mode.slot_to_lane(key, side) else {
                                    continue;
                                };
                                let wav = value as u16;
                                if ln_obj == Some(wav) {
                                    match last_visible.remove(&lane) {
                                        Some(index) => {
                                            if let EventKind::Note { wav: start_wav, .. } =
                                                events[index].kind
                                            {
                                                events[index].kind = EventKind::LongNoteStart {
                                                    lane,
                                                    wav: start_wav,
                                                    pair: usize::MAX,
                                                };
                                                events.push(Event::new(
                                                    pulse,
                                                    EventKind::LongNoteEnd {
                                                        lane,
                                                        wav,
                                                        pair: usize::MAX,
                                                    },
                                                ));
                                            }
                                        }
                                        None => warn!(
                                            "LNOBJ terminator without a preceding note on lane {lane}, skipping"
                                        ),
                                    }
                                } else {
                                    last_visible.insert(lane, events.len());
                                    events.push(Event::new(pulse, EventKind::Note { lane, wav }));
                                }
                            }
                            ChannelClass::Invisible { side, slot: key } => {
                                if value <= EMPTY {
                                    continue;
                                }
                                let Some(lane) = mode.slot_to_lane(key, side) else {
                                    continue;
                                };
                                events.push(Event::new(
                                    pulse,
                                    EventKind::KeySoundChange {
                                        lane,
                                        wav: value as u16,
                                    },
                                ));
                            }
                            ChannelClass::Mine { side, slot: key } => {
                                if value <= EMPTY {
                                    continue;
                                }
                                let Some(lane) = mode.slot_to_lane(key, side) else {
                                    continue;
                                };
                                events.push(Event::new(
                                    pulse,
                                    EventKind::Landmine {
                                        lane,
                                        damage: value as f64,
                                    },
                                ));
                            }
                            ChannelClass::Long { side, slot: key } => {
                                let Some(lane) = mode.slot_to_lane(key, side) else {
                                    continue;
                                };
                                match ln_mode {
                                    LnMode::PairedMarker => {
                                        if value <= EMPTY {
                                            continue;
                                        }
                                        let wav = value as u16;
                                        long_positions.insert((pulse, lane));
                                        let kind = if paired_open.remove(&lane) {
                                            EventKind::LongNoteEnd {
                                                lane,
                                                wav,
                                                pair: usize::MAX,
                                            }
                                        } else {
                                            paired_open.insert(lane);
                                            EventKind::LongNoteStart {
                                                lane,
                                                wav,
                                                pair: usize::MAX,
                                            }
                                        };
                                        events.push(Event::new(pulse, kind));
                                    }
                                    LnMode::SectionFill => {
                                        if value == REPEAT_PREVIOUS {
                                            continue;
                                        }
                                        if value == EMPTY {
                                            if let Some(run) = section_runs.remove(&ch) {
                                                close_section_run(&mut events, run);
                                            }
                                            continue;
                                        }
                                        let wav = value as u16;
                                        match section_runs.get_mut(&ch) {
                                            Some(run) => {
                                                // Interior repeat: extend, emit nothing.
                                                run.last_pulse = pulse;
                                                run.last_wav = wav;
                                            }
                                            None => {
                                                section_runs.insert(
                                                    ch,
                                                    SectionRun {
                                                        lane,
                                                        start_index: events.len(),
                                                        start_pulse: pulse,
                                                        start_wav: wav,
                                                        last_pulse: pulse,
                                                        last_wav: wav,
                                                    },
                                                );
                                                events.push(Event::new(
                                                    pulse,
                                                    EventKind::LongNoteStart {
                                                        lane,
                                                        wav,
                                                        pair: usize::MAX,
                                                    },
                                                ));
                                            }
                                        }
                                    }
                                }
                            }
                            ChannelClass::Bgm | ChannelClass::Meter => {}
                        }
                    }
                }
            }

            // A measure without data for a run's channel is all-empty there,
            // which breaks the run at its recorded end.
            let stale: Vec<u16> = section_runs
                .keys()
                .filter(|ch| !present_long.contains(ch))
                .copied()
                .collect();
            for ch in stale {
                if let Some(run) = section_runs.remove(&ch) {
                    close_section_run(&mut events, run);
                }
            }

            measure_start += measure_len;
        }

        for (_, run) in section_runs.drain() {
            close_section_run(&mut events, run);
        }

        // Long-channel markers overlapping a visible note are duplicates; the
        // regular copy loses.
        events.retain(|e| match e.kind {
            EventKind::Note { lane, .. } => !long_positions.contains(&(e.pulse, lane)),
            _ => true,
        });

        events
    }
}

/// End a section-fill run at its last explicitly filled slot. A run that
/// never extended past its first slot has no length and degenerates.
fn close_section_run(events: &mut Vec<Event>, run: SectionRun) {
    if run.last_pulse == run.start_pulse {
        warn!(
            "held note on lane {} has no length, demoting to a note",
            run.lane
        );
        events[run.start_index].kind = EventKind::Note {
            lane: run.lane,
            wav: run.start_wav,
        };
    } else {
        events.push(Event::new(
            run.last_pulse,
            EventKind::LongNoteEnd {
                lane: run.lane,
                wav: run.last_wav,
                pair: usize::MAX,
            },
        ));
    }
}

fn classify(ch: u16) -> Option<ChannelClass> {
    use ChannelClass::*;
    use PlayerSide::*;
    Some(match ch {
        0x01 => Bgm,
        0x02 => Meter,
        0x03 => InlineBpm,
        0x04 => Bga(BgaLayer::Base),
        0x06 => Bga(BgaLayer::Poor),
        0x07 => Bga(BgaLayer::Layer),
        0x08 => IndexedBpm,
        0x09 => Stop,
        0x11..=0x19 => Visible {
            side: Player1,
            slot: (ch - 0x11) as usize,
        },
        0x21..=0x29 => Visible {
            side: Player2,
            slot: (ch - 0x21) as usize,
        },
        0x31..=0x39 => Invisible {
            side: Player1,
            slot: (ch - 0x31) as usize,
        },
        0x41..=0x49 => Invisible {
            side: Player2,
            slot: (ch - 0x41) as usize,
        },
        0x51..=0x59 => Long {
            side: Player1,
            slot: (ch - 0x51) as usize,
        },
        0x61..=0x69 => Long {
            side: Player2,
            slot: (ch - 0x61) as usize,
        },
        0xD1..=0xD9 => Mine {
            side: Player1,
            slot: (ch - 0xD1) as usize,
        },
        0xE1..=0xE9 => Mine {
            side: Player2,
            slot: (ch - 0xE1) as usize,
        },
        _ => return None,
    })
}

/// Parse `MMMCC:data` (already uppercased, `#` stripped). Checked slicing:
/// decoded legacy encodings can put multibyte text anywhere on a line.
fn parse_channel_statement(upper: &str) -> Option<(u32, u16, &str)> {
    if upper.len() < 7 || upper.as_bytes()[5] != b':' {
        return None;
    }
    let measure: u32 = upper.get(..3)?.parse().ok()?;
    let channel = u16::from_str_radix(upper.get(3..5)?, 16).ok()?;
    Some((measure, channel, upper.get(6..)?))
}

/// Parse object data into per-slot values. Pairs are base-36, or base-16 for
/// the inline-BPM channel. A malformed pair reads as empty with a warning.
fn parse_slots(data: &str, hex: bool) -> Vec<i32> {
    let data = data.trim();
    let count = data.len() / 2;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let Some(pair) = data.get(i * 2..i * 2 + 2) else {
            warn!("non-ascii object data in {data:?}, treating as empty");
            out.push(EMPTY);
            continue;
        };
        let radix = if hex { 16 } else { 36 };
        match i32::from_str_radix(pair, radix) {
            Ok(value) => out.push(value),
            Err(_) => {
                warn!("malformed object token {pair:?}, treating as empty");
                out.push(EMPTY);
            }
        }
    }
    out
}

/// Two-character base-36 index (`#WAVxx` and friends).
fn parse_base36_id(s: &str) -> Option<u16> {
    let prefix = s.get(..2)?;
    match u16::from_str_radix(prefix, 36) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("malformed base-36 index {s:?}");
            None
        }
    }
}

fn parse_num<T: std::str::FromStr>(value: &str, context: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("malformed numeric token {:?} in {context}, skipping", value.trim());
            None
        }
    }
}
