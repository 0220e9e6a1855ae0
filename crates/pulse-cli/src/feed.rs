//! A source feed backed by a local directory of CSV trade logs.

use std::{path::PathBuf, sync::LazyLock};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use pulse_core::collab::{CollabError, SourceFeed, SourceItem};
use regex::Regex;

pub struct DirectoryFeed {
  dir:      PathBuf,
  timezone: Tz,
}

impl DirectoryFeed {
  pub fn new(dir: PathBuf, timezone: Tz) -> Self { Self { dir, timezone } }

  /// Trade date from the file name, or the modification time.
  fn timestamp(&self, name: &str, modified: DateTime<Utc>) -> DateTime<Utc> {
    trade_date_in_name(name)
      .and_then(|date| {
        let noon = date.and_hms_opt(12, 0, 0)?;
        self.timezone.from_local_datetime(&noon).earliest()
      })
      .map_or(modified, |dt| dt.with_timezone(&Utc))
  }
}

static TRADE_DATE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(\d{2})_(\d{2})_(\d{4})").expect("trade date pattern is valid")
});

/// Finds the first `MM_DD_YYYY` run in `name`.
pub fn trade_date_in_name(name: &str) -> Option<NaiveDate> {
  let caps = TRADE_DATE.captures(name)?;
  let month = caps[1].parse().ok()?;
  let day = caps[2].parse().ok()?;
  let year = caps[3].parse().ok()?;
  NaiveDate::from_ymd_opt(year, month, day)
}

fn unavailable(context: &str, e: std::io::Error) -> CollabError {
  CollabError::Unavailable(format!("{context}: {e}"))
}

impl SourceFeed for DirectoryFeed {
  /// Offers every CSV in the directory. Trade dates come from file names, so
  /// modification times say nothing about novelty and `since` is not used to
  /// filter; the store ignores sources it already knows.
  async fn list_new_sources(
    &self,
    _since: Option<DateTime<Utc>>,
  ) -> Result<Vec<SourceItem>, CollabError> {
    let dir = self.dir.display().to_string();
    let mut entries = tokio::fs::read_dir(&self.dir)
      .await
      .map_err(|e| unavailable(&dir, e))?;

    let mut items = Vec::new();
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|e| unavailable(&dir, e))?
    {
      let path = entry.path();
      let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
      let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        continue;
      };
      if !is_csv {
        continue;
      }

      let metadata = entry.metadata().await.map_err(|e| unavailable(name, e))?;
      if !metadata.is_file() {
        continue;
      }
      let modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
      let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| unavailable(name, e))?;

      items.push(SourceItem {
        source_id: name.to_owned(),
        payload:   String::from_utf8_lossy(&bytes).into_owned(),
        timestamp: self.timestamp(name, modified),
      });
    }

    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    tracing::debug!(dir, count = items.len(), "listed source directory");
    Ok(items)
  }
}
