//! Persisted configuration.
//!
//! `StoredConfig` is the typed form used in-process. `RawConfig` is the
//! on-disk form: lists are comma-joined strings and facilities are stored as
//! bare court numbers, matching what an operator types into the settings.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::facility::FacilityId;
use super::request::ReservationRequest;
use crate::error::ModelError;

pub const DEFAULT_QUOTA: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub target_date: Option<NaiveDate>,
    pub preferred_times: Vec<String>,
    pub preferred_facilities: Vec<FacilityId>,
    /// Daily wall-clock time (HH:MM) for a scheduled run.
    pub execution_time: Option<NaiveTime>,
    /// Instant (epoch ms) of the pending scheduled run, if any.
    pub scheduled_execution_time: Option<i64>,
    pub quota: usize,
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self {
            target_date: None,
            preferred_times: Vec::new(),
            preferred_facilities: Vec::new(),
            execution_time: None,
            scheduled_execution_time: None,
            quota: DEFAULT_QUOTA,
        }
    }
}

impl StoredConfig {
    /// Builds the immutable request for one run.
    pub fn to_request(&self) -> Result<ReservationRequest, ModelError> {
        let date = self.target_date.ok_or(ModelError::MissingTargetDate)?;
        ReservationRequest::new(
            date,
            self.preferred_times.clone(),
            self.preferred_facilities.clone(),
            self.quota,
        )
    }
}

fn default_quota() -> usize {
    DEFAULT_QUOTA
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub target_date: String,
    #[serde(default)]
    pub preferred_times: String,
    #[serde(default)]
    pub preferred_checkboxes: String,
    #[serde(default)]
    pub execution_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_execution_time: Option<i64>,
    #[serde(default = "default_quota")]
    pub max_checkboxes_to_click: usize,
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl From<&StoredConfig> for RawConfig {
    fn from(cfg: &StoredConfig) -> Self {
        Self {
            target_date: cfg
                .target_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            preferred_times: cfg.preferred_times.join(","),
            preferred_checkboxes: cfg
                .preferred_facilities
                .iter()
                .map(|f| f.number().map_or_else(|| f.to_string(), |n| n.to_string()))
                .collect::<Vec<_>>()
                .join(","),
            execution_time: cfg
                .execution_time
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default(),
            scheduled_execution_time: cfg.scheduled_execution_time,
            max_checkboxes_to_click: cfg.quota,
        }
    }
}

impl TryFrom<RawConfig> for StoredConfig {
    type Error = ModelError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let target_date = match raw.target_date.trim() {
            "" => None,
            s => Some(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| ModelError::InvalidDate(s.to_string()))?,
            ),
        };

        let execution_time = match raw.execution_time.trim() {
            "" => None,
            s => Some(parse_hhmm(s)?),
        };

        let preferred_facilities = split_list(&raw.preferred_checkboxes)
            .map(FacilityId::parse_entry)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            target_date,
            preferred_times: split_list(&raw.preferred_times).map(str::to_string).collect(),
            preferred_facilities,
            execution_time,
            scheduled_execution_time: raw.scheduled_execution_time,
            quota: raw.max_checkboxes_to_click,
        })
    }
}

/// Parses an `HH:MM` wall-clock time.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ModelError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| ModelError::InvalidTime(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            target_date: "2025-07-14".into(),
            preferred_times: "18:00, 20:00,,".into(),
            preferred_checkboxes: "5, 6".into(),
            execution_time: "09:00".into(),
            scheduled_execution_time: None,
            max_checkboxes_to_click: 2,
        }
    }

    #[test]
    fn decode_trims_lists_and_prefixes_courts() {
        let cfg = StoredConfig::try_from(raw()).unwrap();

        assert_eq!(cfg.target_date, NaiveDate::from_ymd_opt(2025, 7, 14));
        assert_eq!(cfg.preferred_times, vec!["18:00", "20:00"]);
        assert_eq!(
            cfg.preferred_facilities,
            vec![FacilityId::from_number(5), FacilityId::from_number(6)]
        );
        assert_eq!(cfg.execution_time, NaiveTime::from_hms_opt(9, 0, 0));
    }

    #[test]
    fn encode_writes_bare_court_numbers() {
        let cfg = StoredConfig::try_from(raw()).unwrap();
        let back = RawConfig::from(&cfg);

        assert_eq!(back.preferred_checkboxes, "5,6");
        assert_eq!(back.preferred_times, "18:00,20:00");
        assert_eq!(back.execution_time, "09:00");
    }

    #[test]
    fn blank_fields_decode_to_none() {
        let cfg = StoredConfig::try_from(RawConfig {
            max_checkboxes_to_click: 2,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(cfg.target_date, None);
        assert_eq!(cfg.execution_time, None);
        assert_eq!(cfg.to_request(), Err(ModelError::MissingTargetDate));
    }

    #[test]
    fn bad_values_are_reported() {
        let mut r = raw();
        r.execution_time = "9 o'clock".into();
        assert!(matches!(StoredConfig::try_from(r), Err(ModelError::InvalidTime(_))));

        let mut r = raw();
        r.target_date = "14/07/2025".into();
        assert!(matches!(StoredConfig::try_from(r), Err(ModelError::InvalidDate(_))));
    }

    #[test]
    fn missing_quota_defaults_to_two() {
        let json = r#"{"targetDate":"2025-07-14","preferredTimes":"18:00"}"#;
        let raw: RawConfig = serde_json::from_str(json).unwrap();

        assert_eq!(raw.max_checkboxes_to_click, 2);
        assert_eq!(raw.preferred_checkboxes, "");
    }
}
