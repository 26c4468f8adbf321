//! Names of the phase-space coordinate and momentum arrays.

use std::fmt;
use std::str::FromStr;

use beam_types::error::BeamError;
use serde::{Deserialize, Serialize};

/// Canonical phase-space coordinates of one macro-particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordinate {
    /// Horizontal position [m]
    X,
    /// Horizontal angle [rad]
    Xp,
    /// Vertical position [m]
    Y,
    /// Vertical angle [rad]
    Yp,
    /// Longitudinal position relative to the reference particle [m]
    Z,
    /// Relative momentum deviation
    Dp,
}

impl Coordinate {
    pub const ALL: [Coordinate; 6] = [
        Coordinate::X,
        Coordinate::Xp,
        Coordinate::Y,
        Coordinate::Yp,
        Coordinate::Z,
        Coordinate::Dp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Coordinate::X => "x",
            Coordinate::Xp => "xp",
            Coordinate::Y => "y",
            Coordinate::Yp => "yp",
            Coordinate::Z => "z",
            Coordinate::Dp => "dp",
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Coordinate {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coordinate::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                BeamError::invalid_option("coordinate", s, &["x", "xp", "y", "yp", "z", "dp"])
            })
    }
}
