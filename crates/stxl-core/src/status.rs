//! Camera status fields

use crate::error::{CameraError, Result};
use crate::transport::Reply;

/// Status values the camera reports outside the setup form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    CcdTemperature,
    CoolerPower,
    CcdState,
    FilterState,
}

impl StatusField {
    pub fn wire_name(&self) -> &'static str {
        match self {
            StatusField::CcdTemperature => "CCDTemperature",
            StatusField::CoolerPower => "CoolerPower",
            StatusField::CcdState => "CCDState",
            StatusField::FilterState => "FilterState",
        }
    }
}

/// CCD readout state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcdState {
    /// Exposure finished and image available (0)
    Idle,
    /// Integrating (2)
    Exposing,
    /// Reading out the sensor (3)
    Reading,
    /// Any other code
    Other(u8),
}

impl CcdState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => CcdState::Idle,
            2 => CcdState::Exposing,
            3 => CcdState::Reading,
            other => CcdState::Other(other),
        }
    }
}

/// Filter wheel motion state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterWheelState {
    Idle,
    Moving,
    /// Anything else the firmware reports
    Fault(String),
}

impl FilterWheelState {
    /// The firmware reports the state in the first character
    pub fn parse(raw: &str) -> Self {
        match raw.trim().chars().next() {
            Some('0') => FilterWheelState::Idle,
            Some('1') => FilterWheelState::Moving,
            _ => FilterWheelState::Fault(raw.trim().to_string()),
        }
    }
}

/// Parsed status reply; fields not requested are `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub temperature_c: Option<f64>,
    pub cooler_power_pct: Option<f64>,
    pub ccd_state: Option<CcdState>,
    pub filter_state: Option<FilterWheelState>,
}

impl StatusSnapshot {
    pub fn from_reply(reply: &Reply) -> Result<Self> {
        Ok(Self {
            temperature_c: parse_field(reply, StatusField::CcdTemperature, |s| {
                s.parse::<f64>().ok()
            })?,
            cooler_power_pct: parse_field(reply, StatusField::CoolerPower, |s| {
                s.parse::<f64>().ok()
            })?,
            ccd_state: parse_field(reply, StatusField::CcdState, |s| {
                s.parse::<u8>().ok().map(CcdState::from_code)
            })?,
            filter_state: reply
                .get(StatusField::FilterState.wire_name())
                .map(FilterWheelState::parse),
        })
    }

    pub fn temperature(&self) -> Result<f64> {
        self.temperature_c
            .ok_or_else(|| missing(StatusField::CcdTemperature))
    }

    pub fn cooler_power(&self) -> Result<f64> {
        self.cooler_power_pct
            .ok_or_else(|| missing(StatusField::CoolerPower))
    }

    pub fn ccd(&self) -> Result<CcdState> {
        self.ccd_state.ok_or_else(|| missing(StatusField::CcdState))
    }

    pub fn filter(&self) -> Result<FilterWheelState> {
        self.filter_state
            .clone()
            .ok_or_else(|| missing(StatusField::FilterState))
    }
}

fn missing(field: StatusField) -> CameraError {
    CameraError::InvalidResponse(format!("status reply has no {}", field.wire_name()))
}

fn parse_field<T>(
    reply: &Reply,
    field: StatusField,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    match reply.get(field.wire_name()) {
        None => Ok(None),
        Some(raw) => parse(raw.trim()).map(Some).ok_or_else(|| {
            CameraError::InvalidResponse(format!(
                "{} has unparseable value {:?}",
                field.wire_name(),
                raw
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_full_reply() {
        let reply = Reply::new()
            .with("CCDTemperature", "15.125")
            .with("CoolerPower", "42.0")
            .with("CCDState", "2")
            .with("FilterState", "1 moving");

        let snapshot = StatusSnapshot::from_reply(&reply).unwrap();

        assert_eq!(snapshot.temperature_c, Some(15.125));
        assert_eq!(snapshot.cooler_power_pct, Some(42.0));
        assert_eq!(snapshot.ccd_state, Some(CcdState::Exposing));
        assert_eq!(snapshot.filter_state, Some(FilterWheelState::Moving));
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let reply = Reply::new().with("CCDState", "0");
        let snapshot = StatusSnapshot::from_reply(&reply).unwrap();

        assert_eq!(snapshot.ccd().unwrap(), CcdState::Idle);
        assert!(snapshot.temperature().is_err());
    }

    #[test]
    fn test_garbage_is_invalid_response() {
        let reply = Reply::new().with("CoolerPower", "n/a");
        assert!(matches!(
            StatusSnapshot::from_reply(&reply),
            Err(CameraError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_filter_state_codes() {
        assert_eq!(FilterWheelState::parse("0"), FilterWheelState::Idle);
        assert_eq!(
            FilterWheelState::parse("7"),
            FilterWheelState::Fault("7".to_string())
        );
        assert_eq!(
            FilterWheelState::parse(""),
            FilterWheelState::Fault(String::new())
        );
    }
}
