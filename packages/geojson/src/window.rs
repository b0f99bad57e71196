//! Time windows over the stored dispatch index.

use chrono::{DateTime, Months, TimeDelta, Utc};
use strum_macros::{AsRefStr, Display, EnumString};
use wake_dispatch_models::ViewOptions;

/// Errors produced while interpreting a requested window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// The unit is not one of the recognized interval tokens.
    #[error("{unit} is not a valid interval")]
    InvalidUnit {
        /// The rejected unit text.
        unit: String,
    },

    /// The amount is not a non-negative integer.
    #[error("{amount} is not a valid amount")]
    InvalidAmount {
        /// The rejected amount text.
        amount: String,
    },

    /// The window starts before the earliest representable time.
    #[error("{amount} {unit} is out of range")]
    OutOfRange {
        /// Requested amount.
        amount: u32,
        /// Requested unit.
        unit: IntervalUnit,
    },
}

/// Calendar and clock units accepted by `latest/{unit}/{amount}`.
///
/// Matching is case-sensitive: `M` is months, `m` is minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum IntervalUnit {
    #[strum(to_string = "years", serialize = "year", serialize = "y")]
    Years,
    #[strum(to_string = "quarters", serialize = "quarter", serialize = "Q")]
    Quarters,
    #[strum(to_string = "months", serialize = "month", serialize = "M")]
    Months,
    #[strum(to_string = "weeks", serialize = "week", serialize = "w")]
    Weeks,
    #[strum(to_string = "days", serialize = "day", serialize = "d")]
    Days,
    #[strum(to_string = "hours", serialize = "hour", serialize = "h")]
    Hours,
    #[strum(to_string = "minutes", serialize = "minute", serialize = "m")]
    Minutes,
    #[strum(to_string = "seconds", serialize = "second", serialize = "s")]
    Seconds,
    #[strum(
        to_string = "milliseconds",
        serialize = "millisecond",
        serialize = "ms"
    )]
    Milliseconds,
}

impl IntervalUnit {
    /// Returns `now` moved back by `amount` of this unit, or `None` on
    /// overflow.
    ///
    /// Calendar units step by whole months, clamping to the end of shorter
    /// months.
    #[must_use]
    pub fn subtract_from(self, now: DateTime<Utc>, amount: u32) -> Option<DateTime<Utc>> {
        let amount_i64 = i64::from(amount);
        let delta = match self {
            Self::Years => return now.checked_sub_months(Months::new(amount.checked_mul(12)?)),
            Self::Quarters => return now.checked_sub_months(Months::new(amount.checked_mul(3)?)),
            Self::Months => return now.checked_sub_months(Months::new(amount)),
            Self::Weeks => TimeDelta::try_weeks(amount_i64)?,
            Self::Days => TimeDelta::try_days(amount_i64)?,
            Self::Hours => TimeDelta::try_hours(amount_i64)?,
            Self::Minutes => TimeDelta::try_minutes(amount_i64)?,
            Self::Seconds => TimeDelta::try_seconds(amount_i64)?,
            Self::Milliseconds => TimeDelta::try_milliseconds(amount_i64)?,
        };
        now.checked_sub_signed(delta)
    }
}

/// Which slice of the index a collection covers. Always newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Every stored dispatch.
    All,
    /// Dispatches from the past day.
    Last24Hours,
    /// Only the most recent dispatch.
    Latest,
    /// Dispatches from the past `amount` `unit`s.
    Last { amount: u32, unit: IntervalUnit },
}

impl TimeWindow {
    /// Builds a [`TimeWindow::Last`] from route segments.
    ///
    /// # Errors
    ///
    /// * [`WindowError::InvalidUnit`] if `unit` is not a recognized token.
    /// * [`WindowError::InvalidAmount`] if `amount` is not a non-negative
    ///   integer.
    pub fn last(unit: &str, amount: &str) -> Result<Self, WindowError> {
        let unit = unit
            .parse::<IntervalUnit>()
            .map_err(|_| WindowError::InvalidUnit {
                unit: unit.to_string(),
            })?;
        let amount = amount
            .trim()
            .parse::<u32>()
            .map_err(|_| WindowError::InvalidAmount {
                amount: amount.to_string(),
            })?;
        Ok(Self::Last { amount, unit })
    }

    /// Store query options for this window as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::OutOfRange`] if the window start cannot be
    /// represented.
    pub fn view_options(&self, now: DateTime<Utc>) -> Result<ViewOptions, WindowError> {
        let since = |amount: u32, unit: IntervalUnit| {
            unit.subtract_from(now, amount)
                .map(|start| start.timestamp_millis())
                .ok_or(WindowError::OutOfRange { amount, unit })
        };

        Ok(match *self {
            Self::All => ViewOptions {
                descending: true,
                ..ViewOptions::default()
            },
            Self::Last24Hours => ViewOptions {
                descending: true,
                endkey: Some(since(1, IntervalUnit::Days)?),
                limit: None,
            },
            Self::Latest => ViewOptions {
                descending: true,
                limit: Some(1),
                endkey: None,
            },
            Self::Last { amount, unit } => ViewOptions {
                descending: true,
                endkey: Some(since(amount, unit)?),
                limit: None,
            },
        })
    }

    /// Collection title, e.g. `"All Wake County dispatches, Past Day"`.
    #[must_use]
    pub fn title(&self, prefix: &str) -> String {
        match self {
            Self::All => prefix.to_string(),
            Self::Last24Hours => format!("{prefix}, Past Day"),
            Self::Latest => format!("{prefix}, Latest"),
            Self::Last { amount, unit } => format!("{prefix}, Past {amount} {unit}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 3, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_unit_aliases_case_sensitively() {
        assert_eq!("hours".parse::<IntervalUnit>().unwrap(), IntervalUnit::Hours);
        assert_eq!("h".parse::<IntervalUnit>().unwrap(), IntervalUnit::Hours);
        assert_eq!("M".parse::<IntervalUnit>().unwrap(), IntervalUnit::Months);
        assert_eq!("m".parse::<IntervalUnit>().unwrap(), IntervalUnit::Minutes);
        assert_eq!("Q".parse::<IntervalUnit>().unwrap(), IntervalUnit::Quarters);
        assert_eq!("ms".parse::<IntervalUnit>().unwrap(), IntervalUnit::Milliseconds);
        assert!("Hours".parse::<IntervalUnit>().is_err());
        assert!("fortnights".parse::<IntervalUnit>().is_err());
    }

    #[test]
    fn displays_plural_unit_name() {
        assert_eq!(IntervalUnit::Days.to_string(), "days");
        assert_eq!(IntervalUnit::Milliseconds.as_ref(), "milliseconds");
    }

    #[test]
    fn rejects_unknown_unit_with_message() {
        let err = TimeWindow::last("fortnights", "2").unwrap_err();
        assert_eq!(err.to_string(), "fortnights is not a valid interval");
    }

    #[test]
    fn rejects_bad_amount() {
        assert!(matches!(
            TimeWindow::last("hours", "-3"),
            Err(WindowError::InvalidAmount { .. })
        ));
        assert!(matches!(
            TimeWindow::last("hours", "lots"),
            Err(WindowError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn calendar_units_clamp_to_month_end() {
        let start = IntervalUnit::Months.subtract_from(now(), 1).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2017, 2, 28, 12, 0, 0).unwrap());

        let start = IntervalUnit::Quarters.subtract_from(now(), 1).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2016, 12, 31, 12, 0, 0).unwrap());

        let start = IntervalUnit::Years.subtract_from(now(), 2).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2015, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn clock_units_subtract_exactly() {
        let start = IntervalUnit::Hours.subtract_from(now(), 6).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2017, 3, 31, 6, 0, 0).unwrap());

        let start = IntervalUnit::Weeks.subtract_from(now(), 1).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2017, 3, 24, 12, 0, 0).unwrap());
    }

    #[test]
    fn huge_amounts_are_out_of_range() {
        let window = TimeWindow::last("years", "4000000000").unwrap();
        assert!(matches!(
            window.view_options(now()),
            Err(WindowError::OutOfRange { .. })
        ));
    }

    #[test]
    fn maps_windows_to_descending_view_options() {
        let all = TimeWindow::All.view_options(now()).unwrap();
        assert_eq!(
            all,
            ViewOptions {
                descending: true,
                limit: None,
                endkey: None
            }
        );

        let latest = TimeWindow::Latest.view_options(now()).unwrap();
        assert_eq!(latest.limit, Some(1));
        assert!(latest.descending);

        let day = TimeWindow::Last24Hours.view_options(now()).unwrap();
        assert_eq!(
            day.endkey,
            Some(Utc.with_ymd_and_hms(2017, 3, 30, 12, 0, 0).unwrap().timestamp_millis())
        );

        let window = TimeWindow::last("h", "2").unwrap();
        assert_eq!(
            window.view_options(now()).unwrap().endkey,
            Some(now().timestamp_millis() - 2 * 3_600_000)
        );
    }

    #[test]
    fn titles_follow_collection_prefix() {
        let prefix = "All Wake County dispatches";
        assert_eq!(TimeWindow::All.title(prefix), prefix);
        assert_eq!(
            TimeWindow::Last24Hours.title(prefix),
            "All Wake County dispatches, Past Day"
        );
        assert_eq!(
            TimeWindow::Latest.title(prefix),
            "All Wake County dispatches, Latest"
        );
        assert_eq!(
            TimeWindow::last("d", "3").unwrap().title(prefix),
            "All Wake County dispatches, Past 3 days"
        );
    }
}
