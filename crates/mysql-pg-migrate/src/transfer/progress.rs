//! Progress observations emitted after every chunk.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Shortest duration used as a divisor, so a chunk that completes within the
/// timer's resolution still yields a finite rate.
const MIN_CHUNK_DURATION: Duration = Duration::from_micros(1);

/// Estimated time remaining for the current table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    Remaining(Duration),
    /// The last chunk had a zero rate.
    Unbounded,
}

impl Eta {
    /// Remaining rows divided by the last chunk's rate.
    pub fn estimate(remaining_rows: u64, rows_per_second: f64) -> Self {
        if rows_per_second <= 0.0 || !rows_per_second.is_finite() {
            return Eta::Unbounded;
        }
        Duration::try_from_secs_f64(remaining_rows as f64 / rows_per_second)
            .map(Eta::Remaining)
            .unwrap_or(Eta::Unbounded)
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::Unbounded => f.write_str("unbounded"),
            Eta::Remaining(d) => {
                let secs = d.as_secs();
                write!(f, "{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
            }
        }
    }
}

impl Serialize for Eta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Rows per second for one chunk, from that chunk's wall-clock time only.
pub fn chunk_rate(rows: u64, elapsed: Duration) -> f64 {
    rows as f64 / elapsed.max(MIN_CHUNK_DURATION).as_secs_f64()
}

/// Share of the row-count snapshot already migrated, capped at 100.
pub fn percent(rows_migrated: u64, total_rows: u64) -> f64 {
    if total_rows == 0 {
        return 100.0;
    }
    (rows_migrated as f64 / total_rows as f64 * 100.0).min(100.0)
}

/// One progress observation.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub table: String,
    /// 1-based position of the table in the plan.
    pub table_index: usize,
    pub table_total: usize,
    pub rows_migrated: u64,
    pub total_rows: u64,
    pub percent: f64,
    pub chunk_rows: u64,
    pub rows_per_second: f64,
    pub eta: Eta,
}

impl ProgressUpdate {
    /// Build an update after a chunk of `chunk_rows` took `chunk_elapsed`.
    pub fn after_chunk(
        table: &str,
        position: (usize, usize),
        rows_migrated: u64,
        total_rows: u64,
        chunk_rows: u64,
        chunk_elapsed: Duration,
    ) -> Self {
        let rate = chunk_rate(chunk_rows, chunk_elapsed);
        Self {
            table: table.to_string(),
            table_index: position.0,
            table_total: position.1,
            rows_migrated,
            total_rows,
            percent: percent(rows_migrated, total_rows),
            chunk_rows,
            rows_per_second: rate,
            eta: Eta::estimate(total_rows.saturating_sub(rows_migrated), rate),
        }
    }
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {}: {}/{} rows ({:.1}%), {:.0} rows/s, ETA {}",
            self.table_index,
            self.table_total,
            self.table,
            self.rows_migrated,
            self.total_rows,
            self.percent,
            self.rows_per_second,
            self.eta
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_rate() {
        assert_eq!(chunk_rate(1000, Duration::from_millis(500)), 2000.0);
        assert_eq!(chunk_rate(0, Duration::from_secs(1)), 0.0);
        // Zero elapsed is clamped, not a division by zero.
        assert!(chunk_rate(10, Duration::ZERO).is_finite());
    }

    #[test]
    fn test_eta() {
        assert_eq!(
            Eta::estimate(1500, 500.0),
            Eta::Remaining(Duration::from_secs(3))
        );
        assert_eq!(Eta::estimate(1500, 0.0), Eta::Unbounded);
        assert_eq!(Eta::Unbounded.to_string(), "unbounded");
        assert_eq!(Eta::Remaining(Duration::from_secs(3725)).to_string(), "01:02:05");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(250, 1000), 25.0);
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1200, 1000), 100.0);
    }

    #[test]
    fn test_update_after_chunk() {
        let update =
            ProgressUpdate::after_chunk("users", (1, 3), 1000, 2500, 1000, Duration::from_secs(2));
        assert_eq!(update.rows_per_second, 500.0);
        assert_eq!(update.percent, 40.0);
        assert_eq!(update.eta, Eta::Remaining(Duration::from_secs(3)));
        assert_eq!(
            update.to_string(),
            "[1/3] users: 1000/2500 rows (40.0%), 500 rows/s, ETA 00:00:03"
        );

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["eta"], "00:00:03");
        assert_eq!(json["table_total"], 3);
    }
}
