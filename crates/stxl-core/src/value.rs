//! Typed setting values and their wire rendering

use serde::{Deserialize, Serialize};

use crate::schema::ValueKind;

/// Value of a camera setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(i64),
    Float(f64),
}

impl SettingValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            SettingValue::Integer(v) => v as f64,
            SettingValue::Float(v) => v,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            SettingValue::Integer(v) => Some(v),
            SettingValue::Float(v) if v.fract() == 0.0 => Some(v as i64),
            SettingValue::Float(_) => None,
        }
    }

    /// Compare a written value with a read-back value.
    ///
    /// Integers must be identical; anything involving a float compares the
    /// numeric value, so `15` and `15.0` agree.
    pub fn matches(&self, other: &SettingValue) -> bool {
        match (self, other) {
            (SettingValue::Integer(a), SettingValue::Integer(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }

    /// Convert to the representation a schema entry expects
    pub fn coerce(self, kind: ValueKind) -> SettingValue {
        match (kind, self) {
            (ValueKind::Float { .. }, SettingValue::Integer(v)) => SettingValue::Float(v as f64),
            (ValueKind::Integer { .. } | ValueKind::Enumerated(_), SettingValue::Float(v))
                if v.fract() == 0.0 =>
            {
                SettingValue::Integer(v as i64)
            }
            (_, v) => v,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SettingValue::Integer(v) => write!(f, "{}", v),
            // The camera's own pages always carry a decimal point for floats
            SettingValue::Float(v) if v.fract() == 0.0 => write!(f, "{:.1}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Integer(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Integer(i64::from(v))
    }
}

impl From<u8> for SettingValue {
    fn from(v: u8) -> Self {
        SettingValue::Integer(i64::from(v))
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}
