//! Fixed schema of the camera settings the driver knows how to write
//!
//! The camera speaks untyped `name=value` text. Every name the driver touches
//! is declared here with its value kind, its write policy and the page it
//! lives on, so wire values are validated at the register boundary instead of
//! travelling through the driver as strings.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};
use crate::value::SettingValue;

/// Settings exposed by the camera's setup and filter pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SettingKey {
    /// Pixel binning (1x1, 2x2, 3x3)
    Bin,
    /// CCD temperature setpoint in °C
    CcdTemperatureSetpoint,
    /// Thermoelectric cooler on/off
    CoolerState,
    /// Fan mode: 1 = auto, 2 = manual, 3 = disabled
    Fan,
    /// Manual fan speed in percent
    FanSetpoint,
    /// Filter wheel position
    Filter,
}

impl SettingKey {
    /// Every key in the schema
    pub const ALL: [SettingKey; 6] = [
        SettingKey::Bin,
        SettingKey::CcdTemperatureSetpoint,
        SettingKey::CoolerState,
        SettingKey::Fan,
        SettingKey::FanSetpoint,
        SettingKey::Filter,
    ];

    /// Name used by the camera's HTML forms
    pub fn wire_name(&self) -> &'static str {
        match self {
            SettingKey::Bin => "Bin",
            SettingKey::CcdTemperatureSetpoint => "CCDTemperatureSetpoint",
            SettingKey::CoolerState => "CoolerState",
            SettingKey::Fan => "Fan",
            SettingKey::FanSetpoint => "FanSetpoint",
            SettingKey::Filter => "Filter",
        }
    }

    /// Look up a key by its wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_name() == name)
    }

    /// Schema entry for this key
    pub fn spec(&self) -> &'static SettingSpec {
        // ALL and SCHEMA are declared in the same order
        &SCHEMA[*self as usize]
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Value domain of a setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    /// Integer within an inclusive range
    Integer { min: i64, max: i64 },
    /// Floating point within an inclusive range
    Float { min: f64, max: f64 },
    /// One of a fixed set of integer codes
    Enumerated(&'static [i64]),
}

/// How a write to the setting is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Read-back must equal the written value
    Exact,
    /// Read-back mismatch is logged but accepted
    Tolerant,
}

/// Which camera page carries the setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingGroup {
    /// `CameraSetup` form
    Setup,
    /// Filter wheel page
    FilterWheel,
}

/// Schema entry for one setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingSpec {
    pub key: SettingKey,
    pub kind: ValueKind,
    pub policy: WritePolicy,
    pub group: SettingGroup,
}

/// Settings known to the driver.
///
/// Fan mode and fan speed are known to read back unreliably on some units and
/// are the only tolerant entries.
pub static SCHEMA: [SettingSpec; 6] = [
    SettingSpec {
        key: SettingKey::Bin,
        kind: ValueKind::Enumerated(&[1, 2, 3]),
        policy: WritePolicy::Exact,
        group: SettingGroup::Setup,
    },
    SettingSpec {
        key: SettingKey::CcdTemperatureSetpoint,
        kind: ValueKind::Float {
            min: -50.0,
            max: 50.0,
        },
        policy: WritePolicy::Exact,
        group: SettingGroup::Setup,
    },
    SettingSpec {
        key: SettingKey::CoolerState,
        kind: ValueKind::Enumerated(&[0, 1]),
        policy: WritePolicy::Exact,
        group: SettingGroup::Setup,
    },
    SettingSpec {
        key: SettingKey::Fan,
        kind: ValueKind::Enumerated(&[1, 2, 3]),
        policy: WritePolicy::Tolerant,
        group: SettingGroup::Setup,
    },
    SettingSpec {
        key: SettingKey::FanSetpoint,
        kind: ValueKind::Float {
            min: 0.0,
            max: 100.0,
        },
        policy: WritePolicy::Tolerant,
        group: SettingGroup::Setup,
    },
    SettingSpec {
        key: SettingKey::Filter,
        kind: ValueKind::Integer { min: 1, max: 8 },
        policy: WritePolicy::Exact,
        group: SettingGroup::FilterWheel,
    },
];

impl SettingSpec {
    /// Parse a wire value according to this entry's kind
    pub fn parse(&self, raw: &str) -> Result<SettingValue> {
        let raw = raw.trim();
        let value = match self.kind {
            ValueKind::Integer { .. } | ValueKind::Enumerated(_) => raw
                .parse::<i64>()
                .map(SettingValue::Integer)
                .or_else(|_| {
                    // Some firmware renders integers as "2.0"
                    raw.parse::<f64>()
                        .ok()
                        .filter(|v| v.fract() == 0.0)
                        .map(|v| SettingValue::Integer(v as i64))
                        .ok_or(())
                }),
            ValueKind::Float { .. } => raw.parse::<f64>().map(SettingValue::Float).map_err(|_| ()),
        };

        value.map_err(|_| {
            CameraError::InvalidResponse(format!("{} has unparseable value {:?}", self.key, raw))
        })
    }

    /// Check that a value may be written to this setting
    pub fn validate(&self, value: &SettingValue) -> Result<()> {
        let ok = match (self.kind, value) {
            (ValueKind::Integer { min, max }, SettingValue::Integer(v)) => (min..=max).contains(v),
            (ValueKind::Enumerated(allowed), SettingValue::Integer(v)) => allowed.contains(v),
            (ValueKind::Float { min, max }, v) => {
                let v = v.as_f64();
                v.is_finite() && v >= min && v <= max
            }
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(CameraError::InvalidSetting(format!(
                "{} does not accept {}",
                self.key, value
            )))
        }
    }

    pub fn is_tolerant(&self) -> bool {
        self.policy == WritePolicy::Tolerant
    }
}

/// Keys whose write policy is tolerant
pub fn tolerant_keys() -> HashSet<SettingKey> {
    SCHEMA
        .iter()
        .filter(|s| s.is_tolerant())
        .map(|s| s.key)
        .collect()
}
