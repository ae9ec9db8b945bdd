//! Markup of the booking site.
//!
//! The calendar lists each day as a `td`; a day with openings carries an
//! `a.possible` link whose `onclick` mentions the date, and its open time
//! ranges are `li.possible a` entries. Picking a time pops `#confirmLayer`,
//! confirmed with `.regist`, after which the site navigates to
//! `reservationStep2` where courts are picked from `.yy-checks-list`.

use corelib::models::FacilityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    /// Pages outside this prefix are refused. `None` disables the check.
    pub site_prefix: Option<String>,
    pub time_link: String,
    pub confirm_layer: String,
    pub confirm_button: String,
    /// Substring of the URL of the facility selection step.
    pub transition_marker: String,
    pub enabled_checkbox: String,
    pub next_button: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            site_prefix: Some("https://www.auc.or.kr/".into()),
            time_link: "li.possible a".into(),
            confirm_layer: "#confirmLayer".into(),
            confirm_button: ".regist".into(),
            transition_marker: "reservationStep2".into(),
            enabled_checkbox: ".yy-checks-list input[type='checkbox']:not([disabled])".into(),
            next_button: ".btn4".into(),
        }
    }
}

impl SiteSelectors {
    /// The calendar cell of `date_key` (`YYYY-MM-DD`), if it has openings.
    /// Only innermost cells match, so a layout table wrapping the calendar
    /// never stands in for the day.
    pub fn day_cell(&self, date_key: &str) -> String {
        format!("td:has(a.possible[onclick*=\"'{date_key}'\"]):not(:has(td))")
    }

    pub fn checkbox(&self, id: &FacilityId) -> String {
        format!("input[type='checkbox']#{id}")
    }

    pub fn label_for(&self, id: &FacilityId) -> String {
        format!("label[for=\"{id}\"]")
    }

    pub fn allows(&self, url: &str) -> bool {
        self.site_prefix
            .as_deref()
            .is_none_or(|prefix| url.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_cell_quotes_the_date_and_skips_wrapping_cells() {
        let site = SiteSelectors::default();
        assert_eq!(
            site.day_cell("2025-07-14"),
            "td:has(a.possible[onclick*=\"'2025-07-14'\"]):not(:has(td))"
        );
    }

    #[test]
    fn checkbox_selectors_use_the_dom_id() {
        let site = SiteSelectors::default();
        let id = FacilityId::from_number(3);

        assert_eq!(site.checkbox(&id), "input[type='checkbox']#facilityNo3");
        assert_eq!(site.label_for(&id), "label[for=\"facilityNo3\"]");
    }

    #[test]
    fn site_prefix_guard() {
        let mut site = SiteSelectors::default();
        assert!(site.allows("https://www.auc.or.kr/reservation/calendar"));
        assert!(!site.allows("https://example.com/"));

        site.site_prefix = None;
        assert!(site.allows("https://example.com/"));
    }
}
