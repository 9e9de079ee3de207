//! Value tables for NEXX fields
//!
//! Some fields are stored on the device as an index into a fixed table of
//! display values (PCM bars, border width); others only need a label for
//! the operator UI.

use super::varid::VarId;

// ========================================
// Index tables
// ========================================

/// Ordered table mapping wire index <-> display value
#[derive(Debug, Clone, Copy)]
pub struct IndexTable {
    values: &'static [i64],
}

impl IndexTable {
    pub const fn new(values: &'static [i64]) -> Self {
        Self { values }
    }

    /// Display value for a wire index. Unknown indices map to the first value.
    pub fn index_to_value(&self, index: i64) -> i64 {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get(i))
            .or_else(|| self.values.first())
            .copied()
            .unwrap_or_default()
    }

    /// Wire index for a display value. Unknown values map to index 0.
    pub fn value_to_index(&self, value: i64) -> i64 {
        self.values
            .iter()
            .position(|v| *v == value)
            .map(|i| i as i64)
            .unwrap_or(0)
    }

    pub fn contains_value(&self, value: i64) -> bool {
        self.values.contains(&value)
    }

    pub fn values(&self) -> &'static [i64] {
        self.values
    }
}

/// PCM audio bars (VarID 2719)
pub const PCM_BARS: IndexTable = IndexTable::new(&[0, 2, 4, 6, 8, 12, 16]);

/// Border pixels (VarID 2726 / 2727)
pub const BORDER_PIXELS: IndexTable = IndexTable::new(&[0, 1, 2, 3, 4]);

// ========================================
// Labels
// ========================================

const UMD_SELECTION_LABELS: &[&str] = &[
    "Off",
    "Static",
    "Dynamic Line 1",
    "NTP Time",
    "NTP Time with Offset",
];

const WINDOW_SIZE_LABELS: &[&str] = &["Full", "Reduced Small", "Reduced Medium", "Reduced Large"];

const TIMECODE_SOURCE_LABELS: &[&str] = &[
    "Local ATC",
    "NTP",
    "NTP with Offset",
    "Global ATC 1",
    "Global ATC 2",
    "Global ATC 3",
    "Global ATC 4",
];

const TIMECODE_FORMAT_LABELS: &[&str] = &["HH:MM:SS:FF.F", "HH:MM:SS"];

const NTP_OFFSET_DIRECTION_LABELS: &[&str] = &["+", "-"];

const MV_ENABLE_LABELS: &[&str] = &["Disabled", "Enabled"];

const OUTPUT_FORMAT_LABELS: &[&str] = &["1080p59", "1080p50", "1080i59", "1080i50"];

const TEXT_FONT_LABELS: &[&str] = &["Sans", "Sans Mono", "D Din"];

const BORDER_PIXEL_LABELS: &[&str] = &["0 px", "1 px", "2 px", "3 px", "4 px"];

fn label_table(varid: VarId) -> Option<&'static [&'static str]> {
    match varid {
        VarId::UmdSelection => Some(UMD_SELECTION_LABELS),
        VarId::WindowSize => Some(WINDOW_SIZE_LABELS),
        VarId::TimecodeSource => Some(TIMECODE_SOURCE_LABELS),
        VarId::TimecodeFormat => Some(TIMECODE_FORMAT_LABELS),
        VarId::NtpOffsetDirection => Some(NTP_OFFSET_DIRECTION_LABELS),
        VarId::MvEnable => Some(MV_ENABLE_LABELS),
        VarId::MvOutputFormat => Some(OUTPUT_FORMAT_LABELS),
        VarId::MvFont => Some(TEXT_FONT_LABELS),
        VarId::MvOuterBorder | VarId::MvInnerBorder => Some(BORDER_PIXEL_LABELS),
        _ => None,
    }
}

/// Display label for an enumerated field value
pub fn label_for(varid: VarId, value: i64) -> Option<&'static str> {
    let table = label_table(varid)?;
    usize::try_from(value).ok().and_then(|i| table.get(i)).copied()
}

/// All `(value, label)` pairs for an enumerated field
pub fn options_for(varid: VarId) -> Vec<(i64, &'static str)> {
    label_table(varid)
        .map(|t| t.iter().enumerate().map(|(i, l)| (i as i64, *l)).collect())
        .unwrap_or_default()
}
