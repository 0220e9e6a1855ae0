//! Period keys, the canonical time buckets each tier reports on.
//!
//! A key is stored as its tier plus the first calendar day of the bucket
//! (the day itself, the ISO week's Monday, or the first of the month), so
//! every derived date is infallible once a key exists.
//!
//! # Month-straddling weeks
//!
//! Each period has an *anchor* date used to place it inside the next tier's
//! window. A week is anchored on its Thursday, which puts it in exactly one
//! calendar month: the month that holds the majority of its days. This is the
//! same rule ISO 8601 uses to assign weeks to years.

use std::{fmt, str::FromStr};

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, tier::Tier};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct PeriodKey {
  tier:  Tier,
  start: NaiveDate,
}

impl PeriodKey {
  /// The daily period for `date`.
  pub fn day(date: NaiveDate) -> Self { Self { tier: Tier::Daily, start: date } }

  /// The ISO week `week` of ISO year `year`.
  pub fn iso_week(year: i32, week: u32) -> Result<Self> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
      .map(|start| Self { tier: Tier::Weekly, start })
      .ok_or_else(|| Error::InvalidPeriod(format!("{year}-W{week:02}")))
  }

  /// The calendar month `month` of `year`.
  pub fn month(year: i32, month: u32) -> Result<Self> {
    NaiveDate::from_ymd_opt(year, month, 1)
      .map(|start| Self { tier: Tier::Monthly, start })
      .ok_or_else(|| Error::InvalidPeriod(format!("{year:04}-{month:02}")))
  }

  /// The period of `tier` that contains `date`.
  pub fn containing(tier: Tier, date: NaiveDate) -> Self {
    let start = match tier {
      Tier::Daily => date,
      Tier::Weekly => {
        date - Days::new(u64::from(date.weekday().num_days_from_monday()))
      }
      Tier::Monthly => date - Days::new(u64::from(date.day0())),
    };
    Self { tier, start }
  }

  /// Parse `s` and require it to be a period of `tier`.
  pub fn parse_for(tier: Tier, s: &str) -> Result<Self> {
    let key: Self = s.parse()?;
    if key.tier != tier {
      return Err(Error::TierMismatch { expected: tier, found: key.tier });
    }
    Ok(key)
  }

  pub fn tier(&self) -> Tier { self.tier }

  /// First calendar day of the period.
  pub fn start(&self) -> NaiveDate { self.start }

  /// Last calendar day of the period (inclusive).
  pub fn end(&self) -> NaiveDate {
    match self.tier {
      Tier::Daily => self.start,
      Tier::Weekly => self.start + Days::new(6),
      Tier::Monthly => self
        .start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX),
    }
  }

  /// The day that decides which parent period this one rolls up into.
  pub fn anchor(&self) -> NaiveDate {
    match self.tier {
      Tier::Weekly => self.start + Days::new(3),
      Tier::Daily | Tier::Monthly => self.start,
    }
  }

  /// The period one tier up that this period rolls into, if any.
  pub fn parent(&self) -> Option<Self> {
    self
      .tier
      .parent()
      .map(|tier| Self::containing(tier, self.anchor()))
  }

  /// The immediately preceding period of the same tier.
  pub fn previous(&self) -> Self {
    let start = match self.tier {
      Tier::Daily => self.start.pred_opt().unwrap_or(NaiveDate::MIN),
      Tier::Weekly => self.start - Days::new(7),
      Tier::Monthly => self
        .start
        .checked_sub_months(Months::new(1))
        .unwrap_or(NaiveDate::MIN),
    };
    Self { tier: self.tier, start }
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date <= self.end()
  }
}

impl fmt::Display for PeriodKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.tier {
      Tier::Daily => write!(f, "{}", self.start.format("%Y-%m-%d")),
      Tier::Weekly => {
        let iso = self.start.iso_week();
        write!(f, "{:04}-W{:02}", iso.year(), iso.week())
      }
      Tier::Monthly => {
        write!(f, "{:04}-{:02}", self.start.year(), self.start.month())
      }
    }
  }
}

impl FromStr for PeriodKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidPeriod(s.to_owned());

    if let Some((year, week)) = s.split_once("-W") {
      let year = year.parse().map_err(|_| invalid())?;
      let week = week.parse().map_err(|_| invalid())?;
      return Self::iso_week(year, week).map_err(|_| invalid());
    }

    match s.split('-').count() {
      2 => {
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::month(year, month).map_err(|_| invalid())
      }
      3 => NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Self::day)
        .map_err(|_| invalid()),
      _ => Err(invalid()),
    }
  }
}

impl From<PeriodKey> for String {
  fn from(key: PeriodKey) -> Self { key.to_string() }
}

impl TryFrom<String> for PeriodKey {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}
