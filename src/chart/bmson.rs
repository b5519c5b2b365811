//! Structured (tree-of-records) chart notation.
//!
//! A JSON document carrying explicit pulse positions, compiled into the same
//! timeline shape as the line notation. Document pulses are authored at
//! `info.resolution` per quarter note, so the global resolution (pulses per
//! default measure) is four times that.

use std::collections::HashMap;

use log::warn;
use serde::Deserialize;

use crate::chart::compiler::{Chart, ChartMeta};
use crate::chart::error::ChartError;
use crate::chart::lane::PlayMode;
use crate::config::CompileConfig;
use crate::event::{BgaLayer, Event, EventKind};
use crate::timeline::EventTimeline;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    info: Info,
    #[serde(default)]
    lines: Vec<BarLine>,
    #[serde(default)]
    bpm_events: Vec<BpmRecord>,
    #[serde(default)]
    stop_events: Vec<StopRecord>,
    #[serde(default)]
    sound_channels: Vec<SoundChannel>,
    #[serde(default)]
    mine_channels: Vec<DamageChannel>,
    #[serde(default)]
    key_channels: Vec<DamageChannel>,
    #[serde(default)]
    bga: Option<BgaBlock>,
}

#[derive(Debug, Deserialize)]
struct Info {
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    chart_name: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    subartists: Vec<String>,
    #[serde(default)]
    genre: String,
    #[serde(default = "default_mode_hint")]
    mode_hint: String,
    #[serde(default = "default_judge_rank")]
    judge_rank: i32,
    #[serde(default = "default_total")]
    total: f64,
    #[serde(default)]
    init_bpm: f64,
    #[serde(default)]
    level: i32,
    #[serde(default = "default_resolution")]
    resolution: i64,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            chart_name: String::new(),
            artist: String::new(),
            subartists: Vec::new(),
            genre: String::new(),
            mode_hint: default_mode_hint(),
            judge_rank: default_judge_rank(),
            total: default_total(),
            init_bpm: 0.0,
            level: 0,
            resolution: default_resolution(),
        }
    }
}

fn default_mode_hint() -> String {
    "beat-7k".to_string()
}

fn default_judge_rank() -> i32 {
    2
}

fn default_total() -> f64 {
    100.0
}

fn default_resolution() -> i64 {
    240
}

#[derive(Debug, Deserialize)]
struct BarLine {
    #[serde(default)]
    y: i64,
}

#[derive(Debug, Deserialize)]
struct BpmRecord {
    #[serde(default)]
    y: i64,
    #[serde(default)]
    bpm: f64,
}

#[derive(Debug, Deserialize)]
struct StopRecord {
    #[serde(default)]
    y: i64,
    #[serde(default)]
    duration: i64,
}

#[derive(Debug, Deserialize)]
struct SoundChannel {
    #[serde(default)]
    name: String,
    #[serde(default)]
    notes: Vec<SoundNote>,
}

#[derive(Debug, Deserialize)]
struct SoundNote {
    /// 0 = background, 1+ = playable lane.
    #[serde(default)]
    x: i64,
    #[serde(default)]
    y: i64,
    /// Length in document pulses; positive means a long note.
    #[serde(default)]
    l: i64,
    /// Continuation of the previous slice of the same sound.
    #[serde(default)]
    c: bool,
}

#[derive(Debug, Deserialize)]
struct DamageChannel {
    #[serde(default)]
    notes: Vec<DamageNote>,
}

#[derive(Debug, Deserialize)]
struct DamageNote {
    #[serde(default)]
    x: i64,
    #[serde(default)]
    y: i64,
    #[serde(default)]
    damage: f64,
}

#[derive(Debug, Deserialize)]
struct BgaBlock {
    #[serde(default)]
    bga_events: Vec<BgaRecord>,
    #[serde(default)]
    layer_events: Vec<BgaRecord>,
    #[serde(default)]
    poor_events: Vec<BgaRecord>,
}

#[derive(Debug, Deserialize)]
struct BgaRecord {
    #[serde(default)]
    y: i64,
    #[serde(default)]
    id: i64,
}

/// Compile a structured chart document.
pub fn compile(raw: &[u8], config: &CompileConfig) -> Result<Chart, ChartError> {
    let document: Document = serde_json::from_slice(raw)?;
    let info = document.info;

    let mode = config.forced_mode.unwrap_or_else(|| {
        PlayMode::from_mode_hint(&info.mode_hint).unwrap_or_else(|| {
            warn!("unknown mode hint {:?}, assuming beat-7k", info.mode_hint);
            PlayMode::Beat7K
        })
    });

    // Document pulses are per quarter note; one default measure is four.
    let resolution = (info.resolution.max(1) as u64) * 4;

    let initial_bpm = if info.init_bpm > 0.0 {
        info.init_bpm
    } else {
        warn!("missing initial bpm, using {}", config.default_bpm);
        config.default_bpm
    };

    let mut subtitle = info.subtitle.clone();
    if !info.chart_name.is_empty() {
        if !subtitle.is_empty() {
            subtitle.push(' ');
        }
        subtitle.push('[');
        subtitle.push_str(&info.chart_name);
        subtitle.push(']');
    }

    let meta = ChartMeta {
        title: info.title,
        subtitle,
        artist: info.artist,
        sub_artist: info.subartists.join(","),
        genre: info.genre,
        player: 1,
        judge_rank: info.judge_rank,
        total: info.total,
        play_level: info.level,
        difficulty: 0,
    };

    let mut events: Vec<Event> = Vec::new();
    let mut wav_defs: HashMap<u16, String> = HashMap::new();

    for (measure, line) in document.lines.iter().enumerate() {
        events.push(Event::new(
            line.y,
            EventKind::MeasureMarker {
                measure: measure as u32,
            },
        ));
    }

    for record in &document.bpm_events {
        if record.bpm.abs() <= f64::EPSILON {
            warn!("ignoring zero bpm record at pulse {}", record.y);
            continue;
        }
        events.push(Event::new(record.y, EventKind::Bpm { bpm: record.bpm }));
    }

    for record in &document.stop_events {
        if record.duration < 0 {
            warn!("ignoring negative stop at pulse {}", record.y);
            continue;
        }
        events.push(Event::new(
            record.y,
            EventKind::Stop {
                pulses: record.duration,
            },
        ));
    }

    for (index, sound) in document.sound_channels.iter().enumerate() {
        let wav = (index + 1) as u16;
        wav_defs.insert(wav, sound.name.clone());

        for note in &sound.notes {
            if note.x <= 0 {
                // Background slice; continuations restart the same sound.
                events.push(Event::new(note.y, EventKind::Sound { wav }));
                continue;
            }
            let Some(lane) = document_lane(mode, note.x) else {
                warn!("lane {} out of range for {:?}, skipping", note.x, mode);
                continue;
            };
            if note.l > 0 {
                events.push(Event::new(
                    note.y,
                    EventKind::LongNoteStart {
                        lane,
                        wav,
                        pair: usize::MAX,
                    },
                ));
                events.push(Event::new(
                    note.y + note.l,
                    EventKind::LongNoteEnd {
                        lane,
                        wav,
                        pair: usize::MAX,
                    },
                ));
            } else if note.c {
                events.push(Event::new(note.y, EventKind::KeySoundChange { lane, wav }));
            } else {
                events.push(Event::new(note.y, EventKind::Note { lane, wav }));
            }
        }
    }

    for channel in &document.mine_channels {
        for note in &channel.notes {
            let Some(lane) = document_lane(mode, note.x) else {
                continue;
            };
            events.push(Event::new(
                note.y,
                EventKind::Landmine {
                    lane,
                    damage: note.damage,
                },
            ));
        }
    }

    for channel in &document.key_channels {
        for note in &channel.notes {
            let Some(lane) = document_lane(mode, note.x) else {
                continue;
            };
            // Key channels retune the lane's sound without a judgeable note.
            events.push(Event::new(
                note.y,
                EventKind::KeySoundChange { lane, wav: 0 },
            ));
        }
    }

    if let Some(bga) = &document.bga {
        for (records, layer) in [
            (&bga.bga_events, BgaLayer::Base),
            (&bga.layer_events, BgaLayer::Layer),
            (&bga.poor_events, BgaLayer::Poor),
        ] {
            for record in records.iter() {
                events.push(Event::new(
                    record.y,
                    EventKind::Bga {
                        id: record.id as u16,
                        layer,
                    },
                ));
            }
        }
    }

    if !events.iter().any(|e| {
        !matches!(
            e.kind,
            EventKind::MeasureMarker { .. } | EventKind::Meter { .. }
        )
    }) {
        return Err(ChartError::EmptyChart(
            "structured chart has no objects".to_string(),
        ));
    }

    Ok(Chart {
        meta,
        mode,
        wav_defs,
        bmp_defs: HashMap::new(),
        timeline: EventTimeline::build(resolution, initial_bpm, events),
    })
}

/// Map a document lane number (1-based, scratch in the trailing slots) to an
/// engine lane index.
fn document_lane(mode: PlayMode, x: i64) -> Option<usize> {
    if x <= 0 {
        return None;
    }
    let index = (x - 1) as usize;
    match mode {
        // Five-key documents reserve x 6-7 and park the turntable at x 8.
        PlayMode::Beat5K => [0, 1, 2, 3, 4, -1, -1, 5]
            .get(index)
            .copied()
            .filter(|&l| l >= 0)
            .map(|l| l as usize),
        PlayMode::Beat10K => [0, 1, 2, 3, 4, -1, -1, 5, 6, 7, 8, 9, 10, -1, -1, 11]
            .get(index)
            .copied()
            .filter(|&l| l >= 0)
            .map(|l| l as usize),
        _ => (index < mode.lane_count()).then_some(index),
    }
}
