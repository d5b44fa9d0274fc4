use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Calendar slots the publication timer fires on: a set of weekdays at one
/// local time of day in a named timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    pub days: Vec<Weekday>,
    pub time: NaiveTime,
    pub timezone: Tz,
}

impl Recurrence {
    pub fn new(mut days: Vec<Weekday>, time: NaiveTime, timezone: Tz) -> Result<Self> {
        if days.is_empty() {
            return Err(Error::Config("Recurrence needs at least one weekday".into()));
        }
        days.sort_by_key(|d| d.num_days_from_sunday());
        days.dedup();
        Ok(Self { days, time, timezone })
    }

    /// Parses `"sun,mon,wed,fri"`, `"11:58"` and an IANA zone name.
    pub fn parse(days: &str, time: &str, timezone: &str) -> Result<Self> {
        let days = days
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| Error::Config(format!("Invalid weekday: {}", d)))
            })
            .collect::<Result<Vec<_>>>()?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|e| Error::Config(format!("Invalid time of day {}: {}", time, e)))?;
        let timezone = timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("Invalid timezone {}: {}", timezone, e)))?;
        Self::new(days, time, timezone)
    }

    /// Six-field cron expression (seconds first) in the recurrence's own zone.
    pub fn cron_expression(&self) -> String {
        use chrono::Timelike;
        format!(
            "0 {} {} * * {}",
            self.time.minute(),
            self.time.hour(),
            self.day_names().join(",")
        )
    }

    pub fn day_names(&self) -> Vec<String> {
        self.days.iter().map(|d| d.to_string()).collect()
    }

    pub fn describe(&self) -> String {
        format!(
            "Runs at {} {} on {}",
            self.time.format("%H:%M"),
            self.timezone.name(),
            self.day_names().join(", ")
        )
    }

    /// First slot strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.timezone).date_naive();
        (0..=7)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter(|date| self.days.contains(&chrono::Datelike::weekday(date)))
            .filter_map(|date| local_to_utc(&self.timezone, date, self.time))
            .find(|fire| *fire > now)
    }
}

/// The local calendar day containing `now` in `tz`, as an inclusive UTC range.
pub fn local_day_range(now: DateTime<Utc>, tz: &Tz) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let date = now.with_timezone(tz).date_naive();
    let next = date
        .succ_opt()
        .ok_or_else(|| Error::Internal(format!("No day after {}", date)))?;
    let start = local_to_utc(tz, date, NaiveTime::MIN)
        .ok_or_else(|| Error::Internal(format!("Cannot resolve start of {} in {}", date, tz)))?;
    let next_start = local_to_utc(tz, next, NaiveTime::MIN)
        .ok_or_else(|| Error::Internal(format!("Cannot resolve start of {} in {}", next, tz)))?;
    Ok((start, next_start - Duration::milliseconds(1)))
}

/// Resolves a wall-clock time to UTC. Ambiguous times take the earlier
/// instant; times inside a DST gap move forward by an hour.
pub fn local_to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_local(dt: DateTime<Utc>, tz: &Tz) -> String {
    dt.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
