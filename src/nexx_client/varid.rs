//! NEXX variable identifiers
//!
//! Every controllable value on the multiviewer chassis is addressed by a
//! four digit VarID plus 0-3 index segments. The number of segments is fixed
//! per VarID (its addressing arity).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========================================
// System limits
// ========================================

/// Multiviewer units per chassis
pub const MAX_MULTIVIEWERS: u32 = 120;
/// Windows per multiviewer
pub const MAX_WINDOWS_PER_MV: u32 = 16;
/// UMD layers per window
pub const MAX_UMD_LAYERS: u32 = 3;
/// SDI inputs on a fully populated router
pub const MAX_SDI_INPUTS: u32 = 960;
/// Selectable layouts
pub const MAX_LAYOUTS: u32 = 43;
/// Parameters per GET/SET parameters request
pub const MAX_BATCH_PARAMS: usize = 40;

/// Addressing level of a VarID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// `varid`
    System,
    /// `varid.mv`
    Multiviewer,
    /// `varid.mv.window`
    Window,
    /// `varid.mv.window.layer`
    UmdLayer,
}

impl Arity {
    /// Number of index segments
    pub const fn segments(self) -> usize {
        match self {
            Arity::System => 0,
            Arity::Multiviewer => 1,
            Arity::Window => 2,
            Arity::UmdLayer => 3,
        }
    }

    /// Exclusive upper bound of each index segment
    pub const fn bounds(self) -> &'static [u32] {
        match self {
            Arity::System => &[],
            Arity::Multiviewer => &[MAX_MULTIVIEWERS],
            Arity::Window => &[MAX_MULTIVIEWERS, MAX_WINDOWS_PER_MV],
            Arity::UmdLayer => &[MAX_MULTIVIEWERS, MAX_WINDOWS_PER_MV, MAX_UMD_LAYERS],
        }
    }
}

/// Canonical storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
}

macro_rules! varids {
    ($( $(#[$meta:meta])* $name:ident = $code:literal, $arity:ident, $kind:ident; )*) => {
        /// NEXX API VarID
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub enum VarId {
            $( $(#[$meta])* $name, )*
        }

        impl VarId {
            /// All known VarIDs
            pub const ALL: &'static [VarId] = &[ $( VarId::$name, )* ];

            /// Numeric code used on the wire
            pub const fn code(self) -> u16 {
                match self {
                    $( VarId::$name => $code, )*
                }
            }

            /// Lookup by wire code
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(VarId::$name), )*
                    _ => None,
                }
            }

            /// Addressing arity
            pub const fn arity(self) -> Arity {
                match self {
                    $( VarId::$name => Arity::$arity, )*
                }
            }

            /// Canonical storage type
            pub const fn kind(self) -> FieldKind {
                match self {
                    $( VarId::$name => FieldKind::$kind, )*
                }
            }
        }
    };
}

varids! {
    // System info (read-only)
    TotalMvs = 2700, System, Integer;
    LicensedMvs = 2701, System, Integer;
    EnabledMvs = 2702, System, Integer;

    // Multiviewer level [mv]
    MvEnable = 2703, Multiviewer, Integer;
    MvLayout = 2704, Multiviewer, Integer;
    MvFont = 2716, Multiviewer, Integer;
    MvOutputFormat = 2720, Multiviewer, Integer;
    MvOuterBorder = 2726, Multiviewer, Integer;
    MvInnerBorder = 2727, Multiviewer, Integer;
    MvUpdatePreview = 2735, Multiviewer, Integer;

    // Window level [mv].[window]
    VideoAudioSource = 2707, Window, Integer;
    SourceLabel = 2718, Window, Text;
    PcmBars = 2719, Window, Integer;

    // UMD level [mv].[window].[layer]
    UmdSelection = 2708, UmdLayer, Integer;
    UmdText = 2709, UmdLayer, Text;
    UmdBoxColour = 2710, UmdLayer, Integer;
    UmdBoxAlpha = 2711, UmdLayer, Integer;
    UmdBoxX = 2712, UmdLayer, Integer;
    UmdBoxY = 2713, UmdLayer, Integer;
    UmdTextColour = 2714, UmdLayer, Integer;
    UmdTextAlpha = 2715, UmdLayer, Integer;
    UmdTextSize = 2717, UmdLayer, Integer;
    UmdPadding = 2733, UmdLayer, Integer;

    // Global settings
    WindowSize = 2721, System, Integer;
    TimecodeSource = 2722, System, Integer;
    TimecodeFormat = 2734, System, Integer;
    NtpOffsetDirection = 2723, System, Integer;
    NtpOffsetHours = 2724, System, Integer;
    NtpOffsetMinutes = 2725, System, Integer;
    GlobalAtc1Source = 2729, System, Integer;
    GlobalAtc2Source = 2730, System, Integer;
    GlobalAtc3Source = 2731, System, Integer;
    GlobalAtc4Source = 2732, System, Integer;
}

/// The ten per-layer UMD fields, in device order
pub const UMD_FIELDS: [VarId; 10] = [
    VarId::UmdSelection,
    VarId::UmdText,
    VarId::UmdBoxColour,
    VarId::UmdBoxAlpha,
    VarId::UmdBoxX,
    VarId::UmdBoxY,
    VarId::UmdTextColour,
    VarId::UmdTextAlpha,
    VarId::UmdTextSize,
    VarId::UmdPadding,
];

/// Multiviewer settings fields fetched in one batch per unit
pub const MV_SETTINGS_FIELDS: [VarId; 5] = [
    VarId::MvLayout,
    VarId::MvFont,
    VarId::MvOuterBorder,
    VarId::MvInnerBorder,
    VarId::MvOutputFormat,
];

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for VarId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .ok()
            .and_then(VarId::from_code)
            .ok_or_else(|| crate::Error::Validation(format!("Unknown VarID: {}", s)))
    }
}

impl From<VarId> for String {
    fn from(v: VarId) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for VarId {
    type Error = crate::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
