use serde::{Deserialize, Serialize};

/// Letter grade over the EX score rate, fixed 8-bucket table at ninths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    F,
    E,
    D,
    C,
    B,
    A,
    AA,
    AAA,
}

/// EX score: two points per perfect, one per great.
pub fn ex_score(perfect: u32, great: u32) -> u32 {
    2 * perfect + great
}

/// Grade for an EX score against the chart's maximum of `2 × total_notes`.
pub fn grade(ex: u32, total_notes: usize) -> Grade {
    if total_notes == 0 {
        return Grade::F;
    }
    let rate = ex as f64 / (2.0 * total_notes as f64);
    let ninths = (rate * 9.0).floor() as u32;
    match ninths {
        n if n >= 8 => Grade::AAA,
        7 => Grade::AA,
        6 => Grade::A,
        5 => Grade::B,
        4 => Grade::C,
        3 => Grade::D,
        2 => Grade::E,
        _ => Grade::F,
    }
}
