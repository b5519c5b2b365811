use serde::{Deserialize, Serialize};

/// Player side of a channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerSide {
    Player1,
    Player2,
}

/// Key layout of the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayMode {
    Beat5K,
    Beat7K,
    Beat10K,
    Beat14K,
    PopN9K,
}

impl PlayMode {
    /// Total number of lanes, scratch included.
    pub fn lane_count(self) -> usize {
        match self {
            Self::Beat5K => 6,
            Self::Beat7K => 8,
            Self::Beat10K => 12,
            Self::Beat14K => 16,
            Self::PopN9K => 9,
        }
    }

    /// Lane indices that are scratch lanes.
    pub fn scratch_lanes(self) -> &'static [usize] {
        match self {
            Self::Beat5K => &[5],
            Self::Beat7K => &[7],
            Self::Beat10K => &[5, 11],
            Self::Beat14K => &[7, 15],
            Self::PopN9K => &[],
        }
    }

    pub fn is_scratch(self, lane: usize) -> bool {
        self.scratch_lanes().contains(&lane)
    }

    /// Detect play mode from `#PLAYER`, the highest 1P key slot in use,
    /// whether any 2P channel appeared, and the pop'n source hint.
    pub fn detect(player: i32, max_key_slot: usize, has_2p: bool, is_popn: bool) -> Self {
        if has_2p || player == 3 {
            if max_key_slot > 6 {
                Self::Beat14K
            } else {
                Self::Beat10K
            }
        } else if is_popn {
            Self::PopN9K
        } else if max_key_slot > 6 {
            Self::Beat7K
        } else {
            Self::Beat5K
        }
    }

    /// Parse a structured-notation mode hint such as `beat-7k`.
    pub fn from_mode_hint(hint: &str) -> Option<Self> {
        match hint {
            "beat-5k" => Some(Self::Beat5K),
            "beat-7k" => Some(Self::Beat7K),
            "beat-10k" => Some(Self::Beat10K),
            "beat-14k" => Some(Self::Beat14K),
            "popn-9k" => Some(Self::PopN9K),
            _ => None,
        }
    }

    /// Map a channel slot (0-based offset within a `11`–`19` style group) and
    /// player side to a lane index.
    ///
    /// Pure function of (slot, mode, side): slots 0–4 are keys 1–5, slot 5 is
    /// the turntable, slot 6 is unused, slots 7–8 are keys 6–7. 2P lanes are
    /// the 1P layout offset by half the lane count.
    pub fn slot_to_lane(self, slot: usize, side: PlayerSide) -> Option<usize> {
        let offset = match side {
            PlayerSide::Player1 => 0,
            PlayerSide::Player2 => match self {
                Self::Beat10K | Self::Beat14K => self.lane_count() / 2,
                // Single-side modes have no 2P lanes.
                _ => return None,
            },
        };
        let local = match self {
            Self::Beat5K | Self::Beat10K => match slot {
                0..=4 => slot,
                5 => 5, // scratch
                _ => return None,
            },
            Self::Beat7K | Self::Beat14K => match slot {
                0..=4 => slot,
                5 => 7, // scratch
                7 => 5, // key 6
                8 => 6, // key 7
                _ => return None,
            },
            Self::PopN9K => match slot {
                0..=8 => slot,
                _ => return None,
            },
        };
        Some(offset + local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_key_layout() {
        let mode = PlayMode::Beat7K;
        assert_eq!(mode.slot_to_lane(0, PlayerSide::Player1), Some(0));
        assert_eq!(mode.slot_to_lane(4, PlayerSide::Player1), Some(4));
        assert_eq!(mode.slot_to_lane(5, PlayerSide::Player1), Some(7)); // scratch
        assert_eq!(mode.slot_to_lane(6, PlayerSide::Player1), None); // unused
        assert_eq!(mode.slot_to_lane(7, PlayerSide::Player1), Some(5)); // key 6
        assert_eq!(mode.slot_to_lane(8, PlayerSide::Player1), Some(6)); // key 7
        assert_eq!(mode.slot_to_lane(0, PlayerSide::Player2), None);
    }

    #[test]
    fn fourteen_key_2p_offset() {
        let mode = PlayMode::Beat14K;
        assert_eq!(mode.slot_to_lane(0, PlayerSide::Player2), Some(8));
        assert_eq!(mode.slot_to_lane(5, PlayerSide::Player2), Some(15)); // 2P scratch
        assert_eq!(mode.slot_to_lane(8, PlayerSide::Player2), Some(14));
        assert!(mode.is_scratch(7));
        assert!(mode.is_scratch(15));
    }

    #[test]
    fn ten_key_layout() {
        let mode = PlayMode::Beat10K;
        assert_eq!(mode.slot_to_lane(5, PlayerSide::Player1), Some(5));
        assert_eq!(mode.slot_to_lane(0, PlayerSide::Player2), Some(6));
        assert_eq!(mode.slot_to_lane(5, PlayerSide::Player2), Some(11));
        assert_eq!(mode.slot_to_lane(8, PlayerSide::Player1), None);
    }

    #[test]
    fn popn_has_no_scratch() {
        let mode = PlayMode::PopN9K;
        assert_eq!(mode.slot_to_lane(8, PlayerSide::Player1), Some(8));
        assert!(mode.scratch_lanes().is_empty());
    }

    #[test]
    fn mode_detection() {
        assert_eq!(PlayMode::detect(1, 5, false, false), PlayMode::Beat5K);
        assert_eq!(PlayMode::detect(1, 8, false, false), PlayMode::Beat7K);
        assert_eq!(PlayMode::detect(3, 5, false, false), PlayMode::Beat10K);
        assert_eq!(PlayMode::detect(1, 8, true, false), PlayMode::Beat14K);
        assert_eq!(PlayMode::detect(1, 9, false, true), PlayMode::PopN9K);
    }

    #[test]
    fn mode_hint_parsing() {
        assert_eq!(PlayMode::from_mode_hint("beat-7k"), Some(PlayMode::Beat7K));
        assert_eq!(PlayMode::from_mode_hint("popn-9k"), Some(PlayMode::PopN9K));
        assert_eq!(PlayMode::from_mode_hint("keyboard-24k"), None);
    }
}
