use std::collections::HashSet;
use std::num::NonZeroUsize;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::facility::FacilityId;
use crate::error::ModelError;

/// Everything one run needs to know. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedRequest")]
pub struct ReservationRequest {
    target_date: NaiveDate,
    preferred_times: Vec<String>,
    preferred_facilities: Vec<FacilityId>,
    quota: NonZeroUsize,
}

/// Wire shape of a request before validation.
#[derive(Deserialize)]
struct UncheckedRequest {
    target_date: NaiveDate,
    preferred_times: Vec<String>,
    #[serde(default)]
    preferred_facilities: Vec<FacilityId>,
    quota: usize,
}

impl TryFrom<UncheckedRequest> for ReservationRequest {
    type Error = ModelError;

    fn try_from(raw: UncheckedRequest) -> Result<Self, Self::Error> {
        Self::new(raw.target_date, raw.preferred_times, raw.preferred_facilities, raw.quota)
    }
}

impl ReservationRequest {
    /// Validates and normalises a request.
    ///
    /// Times are trimmed and blank entries dropped. Facilities are
    /// de-duplicated keeping the first occurrence, so preference order is
    /// preserved and no checkbox is ever toggled twice.
    pub fn new(
        target_date: NaiveDate,
        preferred_times: Vec<String>,
        preferred_facilities: Vec<FacilityId>,
        quota: usize,
    ) -> Result<Self, ModelError> {
        let preferred_times: Vec<String> = preferred_times
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if preferred_times.is_empty() {
            return Err(ModelError::NoPreferredTimes);
        }

        let quota = NonZeroUsize::new(quota).ok_or(ModelError::ZeroQuota)?;

        let mut seen = HashSet::new();
        let preferred_facilities = preferred_facilities
            .into_iter()
            .filter(|f| seen.insert(f.clone()))
            .collect();

        Ok(Self {
            target_date,
            preferred_times,
            preferred_facilities,
            quota,
        })
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    /// The date as the calendar markup spells it (`YYYY-MM-DD`).
    pub fn date_key(&self) -> String {
        self.target_date.format("%Y-%m-%d").to_string()
    }

    pub fn preferred_times(&self) -> &[String] {
        &self.preferred_times
    }

    pub fn preferred_facilities(&self) -> &[FacilityId] {
        &self.preferred_facilities
    }

    pub fn quota(&self) -> usize {
        self.quota.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 14).unwrap()
    }

    #[test]
    fn normalises_times_and_dedups_facilities() {
        let req = ReservationRequest::new(
            date(),
            vec![" 18:00".into(), "".into(), "20:00 ".into()],
            vec![
                FacilityId::from_number(5),
                FacilityId::from_number(6),
                FacilityId::from_number(5),
            ],
            2,
        )
        .unwrap();

        assert_eq!(req.preferred_times(), ["18:00", "20:00"]);
        assert_eq!(
            req.preferred_facilities(),
            [FacilityId::from_number(5), FacilityId::from_number(6)]
        );
        assert_eq!(req.date_key(), "2025-07-14");
        assert_eq!(req.quota(), 2);
    }

    #[test]
    fn rejects_zero_quota_and_missing_times() {
        assert_eq!(
            ReservationRequest::new(date(), vec!["18:00".into()], vec![], 0),
            Err(ModelError::ZeroQuota)
        );
        assert_eq!(
            ReservationRequest::new(date(), vec![" ".into()], vec![], 2),
            Err(ModelError::NoPreferredTimes)
        );
    }

    #[test]
    fn deserializing_goes_through_validation() {
        let req: ReservationRequest = serde_json::from_str(
            r#"{"target_date":"2025-07-14","preferred_times":["18:00"],
                "preferred_facilities":["facilityNo5","facilityNo5"],"quota":1}"#,
        )
        .unwrap();
        assert_eq!(req.preferred_facilities(), [FacilityId::from_number(5)]);

        let blank = serde_json::from_str::<ReservationRequest>(
            r#"{"target_date":"2025-07-14","preferred_times":[" "],"quota":2}"#,
        );
        assert!(blank.is_err());
    }
}
