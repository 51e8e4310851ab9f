//! Gas profile table.
//!
//! | Gas     | Full scale | AL1  | AL2  |
//! |---------|-----------:|-----:|-----:|
//! | ORG     | 9999       | 9500 | 9999 |
//! | ARF-T   | 5000       | 2000 | 4000 |
//! | HMDS    | 3000       | 2640 | 3000 |
//! | HC-100  | 5000       | 1500 | 3000 |
//!
//! Thresholds are inclusive lower bounds: a value equal to AL2 is alarming.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Detector gas kind.  Closed set; adding one means extending [`profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GasKind {
    #[default]
    #[serde(rename = "ORG")]
    Org,
    #[serde(rename = "ARF-T")]
    ArfT,
    #[serde(rename = "HMDS")]
    Hmds,
    #[serde(rename = "HC-100")]
    Hc100,
}

impl GasKind {
    pub const ALL: [GasKind; 4] = [Self::Org, Self::ArfT, Self::Hmds, Self::Hc100];

    /// Label as shown on the panel and stored in the config file.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Org => "ORG",
            Self::ArfT => "ARF-T",
            Self::Hmds => "HMDS",
            Self::Hc100 => "HC-100",
        }
    }
}

impl fmt::Display for GasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GasKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.label() == s).ok_or(())
    }
}

/// Full-scale value and alarm thresholds for one gas kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasProfile {
    pub full_scale: u16,
    pub al1: u16,
    pub al2: u16,
}

const ORG: GasProfile = GasProfile { full_scale: 9999, al1: 9500, al2: 9999 };
const ARF_T: GasProfile = GasProfile { full_scale: 5000, al1: 2000, al2: 4000 };
const HMDS: GasProfile = GasProfile { full_scale: 3000, al1: 2640, al2: 3000 };
const HC_100: GasProfile = GasProfile { full_scale: 5000, al1: 1500, al2: 3000 };

/// Look up the static profile for `kind`.
pub const fn profile(kind: GasKind) -> GasProfile {
    match kind {
        GasKind::Org => ORG,
        GasKind::ArfT => ARF_T,
        GasKind::Hmds => HMDS,
        GasKind::Hc100 => HC_100,
    }
}
