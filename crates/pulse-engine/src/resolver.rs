//! Maps a target period to the store rows that feed it.

use std::collections::BTreeSet;

use chrono::{
  DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc,
  Weekday,
};
use chrono_tz::Tz;
use pulse_core::{
  PeriodKey, Tier,
  lineage::PendingInput,
  store::{InputWindow, LineageStore},
};

#[derive(Debug, Clone, Copy)]
pub struct IngestionResolver {
  timezone: Tz,
}

impl IngestionResolver {
  pub fn new(timezone: Tz) -> Self { Self { timezone } }

  pub fn timezone(&self) -> Tz { self.timezone }

  /// The calendar date of `at` in the configured zone.
  pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&self.timezone).date_naive()
  }

  /// The first instant of `date` in the configured zone.
  ///
  /// A zone that skips midnight (DST at 00:00) starts the day at the first
  /// valid local time after it.
  pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=2)
      .map(|hours| midnight + TimeDelta::hours(hours))
      .find_map(|local| self.timezone.from_local_datetime(&local).earliest())
      .map(|dt| dt.with_timezone(&Utc))
      .unwrap_or_else(|| midnight.and_utc())
  }

  pub fn window(&self, period: PeriodKey) -> InputWindow {
    match period.tier() {
      Tier::Daily => {
        let day = period.start();
        let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
        InputWindow::Discovery {
          start: self.local_midnight(day),
          end:   self.local_midnight(next),
        }
      }
      Tier::Weekly | Tier::Monthly => InputWindow::Anchor {
        first: period.start(),
        last:  period.end(),
      },
    }
  }

  /// Eligible inputs for `period`, in the store's deterministic order.
  pub async fn resolve<S: LineageStore>(
    &self,
    store: &S,
    period: PeriodKey,
  ) -> Result<Vec<PendingInput>, S::Error> {
    store.list_unprocessed(period.tier(), self.window(period)).await
  }

  /// The period at `tier` that a pending input belongs to.
  pub fn period_of(&self, tier: Tier, input: &PendingInput) -> Option<PeriodKey> {
    let period = match input {
      PendingInput::Raw(raw) => {
        PeriodKey::containing(Tier::Daily, self.local_date(raw.discovered_at))
      }
      PendingInput::Artifact(artifact) => artifact.period.parent()?,
    };
    (period.tier() == tier).then_some(period)
  }

  /// Every period at `tier` that has at least one eligible input.
  pub async fn pending_periods<S: LineageStore>(
    &self,
    store: &S,
    tier: Tier,
  ) -> Result<BTreeSet<PeriodKey>, S::Error> {
    let inputs = store
      .list_unprocessed(tier, InputWindow::unbounded(tier))
      .await?;
    Ok(
      inputs
        .iter()
        .filter_map(|input| self.period_of(tier, input))
        .collect(),
    )
  }

  /// What a scheduled tick at `now` targets: today for the daily tier, the
  /// current ISO week for the weekly tier, and for the monthly tier the
  /// latest month whose weeks have all ended.
  ///
  /// A week belongs to the month holding its Thursday, so a month ending on
  /// Thursday to Saturday still owns a week that runs into the next month.
  /// Closing the month before that week is generated would leave the week
  /// with no monthly parent.
  pub fn default_target(&self, tier: Tier, now: DateTime<Utc>) -> PeriodKey {
    let today = self.local_date(now);
    match tier {
      Tier::Daily | Tier::Weekly => PeriodKey::containing(tier, today),
      Tier::Monthly => {
        let mut month = PeriodKey::containing(Tier::Monthly, today);
        while last_owned_week_end(month) >= today {
          month = month.previous();
        }
        month
      }
    }
  }
}

/// The Sunday closing the last ISO week whose Thursday falls in `month`.
fn last_owned_week_end(month: PeriodKey) -> NaiveDate {
  let last = month.end();
  let back = (last.weekday().num_days_from_monday() + 7
    - Weekday::Thu.num_days_from_monday())
    % 7;
  let thursday = last - Days::new(u64::from(back));
  thursday + Days::new(3)
}

#[cfg(test)]
mod tests {
  use chrono_tz::America::New_York;

  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn daily_window_follows_local_midnight() {
    let resolver = IngestionResolver::new(New_York);
    let InputWindow::Discovery { start, end } =
      resolver.window(PeriodKey::day(date(2025, 11, 28)))
    else {
      panic!("daily window must be a discovery window");
    };
    assert_eq!(start, Utc.with_ymd_and_hms(2025, 11, 28, 5, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2025, 11, 29, 5, 0, 0).unwrap());
  }

  #[test]
  fn daily_window_spans_dst_change() {
    let resolver = IngestionResolver::new(New_York);
    let InputWindow::Discovery { start, end } =
      resolver.window(PeriodKey::day(date(2025, 3, 9)))
    else {
      panic!("daily window must be a discovery window");
    };
    assert_eq!(end - start, TimeDelta::hours(23));
  }

  #[test]
  fn weekly_and_monthly_windows_cover_the_period() {
    let resolver = IngestionResolver::new(New_York);
    assert_eq!(
      resolver.window(PeriodKey::iso_week(2025, 48).unwrap()),
      InputWindow::Anchor {
        first: date(2025, 11, 24),
        last:  date(2025, 11, 30),
      }
    );
    assert_eq!(
      resolver.window(PeriodKey::month(2025, 11).unwrap()),
      InputWindow::Anchor {
        first: date(2025, 11, 1),
        last:  date(2025, 11, 30),
      }
    );
  }

  #[test]
  fn default_targets() {
    let resolver = IngestionResolver::new(New_York);
    // 02:00 UTC on Dec 1 is still Nov 30 in New York.
    let now = Utc.with_ymd_and_hms(2025, 12, 1, 2, 0, 0).unwrap();
    assert_eq!(
      resolver.default_target(Tier::Daily, now),
      PeriodKey::day(date(2025, 11, 30))
    );
    assert_eq!(
      resolver.default_target(Tier::Weekly, now),
      PeriodKey::iso_week(2025, 48).unwrap()
    );
    assert_eq!(
      resolver.default_target(Tier::Monthly, now),
      PeriodKey::month(2025, 10).unwrap()
    );
  }

  #[test]
  fn monthly_target_waits_for_the_last_owned_week() {
    let resolver = IngestionResolver::new(New_York);
    let month = |y, m| PeriodKey::month(y, m).unwrap();
    let target = |y, m, d| {
      let at = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
      resolver.default_target(Tier::Monthly, at)
    };

    // October 2024 ends on a Thursday: 2024-W44 runs to Sunday Nov 3.
    assert_eq!(last_owned_week_end(month(2024, 10)), date(2024, 11, 3));
    assert_eq!(target(2024, 11, 1), month(2024, 9));
    assert_eq!(target(2024, 11, 3), month(2024, 9));
    assert_eq!(target(2024, 11, 4), month(2024, 10));

    // November 2024 ends on a Saturday and owns the week ending Dec 1.
    assert_eq!(target(2024, 12, 1), month(2024, 10));
    assert_eq!(target(2024, 12, 2), month(2024, 11));

    // December 2024 ends on a Tuesday; Dec 30 and 31 belong to 2025-W01.
    assert_eq!(last_owned_week_end(month(2024, 12)), date(2024, 12, 29));
    assert_eq!(target(2024, 12, 30), month(2024, 12));
  }
}
