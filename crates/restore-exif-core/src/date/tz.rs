use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Decides which UTC offset a filename-derived local time should carry.
pub trait TimezonePolicy: Send + Sync {
    fn offset_for(&self, local: NaiveDateTime) -> Option<String>;
}

/// Central European Time: `+01:00`, and `+02:00` while summer time is in
/// force (last Sunday of March 02:00 until last Sunday of October 03:00).
#[derive(Debug, Clone, Copy, Default)]
pub struct CentralEuropean;

/// Never attach an offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOffset;

impl TimezonePolicy for CentralEuropean {
    fn offset_for(&self, local: NaiveDateTime) -> Option<String> {
        let offset = if in_summer_time(local) { "+02:00" } else { "+01:00" };
        Some(offset.to_string())
    }
}

impl TimezonePolicy for NoOffset {
    fn offset_for(&self, _local: NaiveDateTime) -> Option<String> {
        None
    }
}

/// Policy selector usable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimezoneChoice {
    #[default]
    CentralEuropean,
    None,
}

impl TimezoneChoice {
    pub fn policy(self) -> Box<dyn TimezonePolicy> {
        match self {
            TimezoneChoice::CentralEuropean => Box::new(CentralEuropean),
            TimezoneChoice::None => Box::new(NoOffset),
        }
    }
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next - Duration::days(1);
    let back = last.weekday().num_days_from_sunday() as i64;
    Some(last - Duration::days(back))
}

/// Whether `local` falls inside the EU summer-time window of its year.
pub fn in_summer_time(local: NaiveDateTime) -> bool {
    let year = local.year();
    let start = last_sunday(year, 3).and_then(|d| d.and_hms_opt(2, 0, 0));
    let end = last_sunday(year, 10).and_then(|d| d.and_hms_opt(3, 0, 0));
    match (start, end) {
        (Some(start), Some(end)) => local >= start && local < end,
        _ => false,
    }
}
