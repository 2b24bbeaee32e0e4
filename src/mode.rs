//! Exclusions modes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Which exclusions list is current, and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionsMode {
    /// Everything goes through the VPN except the listed hosts
    #[default]
    Regular,
    /// Nothing goes through the VPN except the listed hosts
    Selective,
}

impl ExclusionsMode {
    /// Both modes, regular first.
    pub const ALL: [ExclusionsMode; 2] = [ExclusionsMode::Regular, ExclusionsMode::Selective];

    /// Get the internal name of this mode.
    pub fn name(&self) -> &'static str {
        match self {
            ExclusionsMode::Regular => "regular",
            ExclusionsMode::Selective => "selective",
        }
    }

    /// Get the display name of this mode.
    pub fn display_name(&self) -> &'static str {
        match self {
            ExclusionsMode::Regular => "General",
            ExclusionsMode::Selective => "Selective",
        }
    }

    /// Whether the bypass list is inverted in this mode.
    pub fn is_inverted(&self) -> bool {
        matches!(self, ExclusionsMode::Selective)
    }

    /// Mode selected by an inversion flag.
    pub fn from_inverted(inverted: bool) -> Self {
        if inverted {
            ExclusionsMode::Selective
        } else {
            ExclusionsMode::Regular
        }
    }
}

impl fmt::Display for ExclusionsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ExclusionsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "regular" | "general" => Ok(ExclusionsMode::Regular),
            "selective" | "inverted" => Ok(ExclusionsMode::Selective),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}
