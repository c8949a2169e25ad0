//! Durable ledger of sync lifecycle events.
//!
//! Every sync pass records what it did into an append-only table:
//!
//! | event        | meaning                                        |
//! |--------------|------------------------------------------------|
//! | `next_period`| a sync window was derived from the log         |
//! | `start`      | a sync began for the window starting here      |
//! | `record`     | one artifact was copied into the sink          |
//! | `end`        | the window was fully processed                 |
//! | `error`      | the sync stopped on this failure               |
//!
//! Rows are never updated or deleted; the ledger is the source of truth for
//! what a partial run achieved. A run that errors keeps its `record` rows and
//! gains a single `error` row, with no `end` row, which is exactly what the
//! next window derivation needs to resume conservatively.
//!
//! The store is SQLite via `rusqlite`; timestamps are whole seconds since the
//! Unix epoch and never decrease within one process.

use std::path::Path;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::calendar::{Date, PeriodType};
use crate::error::Result;

const LEDGER_TABLE: &str = "repo_ledger";

const DDL: &str = "CREATE TABLE IF NOT EXISTS repo_ledger (
    event_time    INT,
    event_name    VARCHAR(16),
    event_date    VARCHAR(10),
    event_data    VARCHAR(256)
)";

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Seconds since the Unix epoch.
    pub event_time: i64,
    pub event_name: String,
    /// `YYYY-MM-DD`, or empty when the event has no date.
    pub event_date: String,
    pub event_data: String,
}

/// Append-only event log driving and recording sync passes.
pub trait RepoLedger: Send {
    /// Records that a sync began for the window starting at `date`.
    fn start(&mut self, date: Date) -> Result<()>;

    /// Records that the window ending at `date` was fully processed.
    fn end(&mut self, date: Date) -> Result<()>;

    /// Records the failure that stopped a sync; `date` is the last artifact
    /// date attempted, when one was drawn.
    fn error(&mut self, date: Option<Date>, message: &str) -> Result<()>;

    /// Records one successfully copied artifact.
    fn record(&mut self, date: Date, period: PeriodType) -> Result<()>;

    /// Derives the next unprocessed window from the log; always `from <= to`.
    /// The derivation is itself logged as a `next_period` event.
    fn next_period(&mut self) -> Result<(Date, Date)>;

    /// The last `limit` rows in append order.
    fn dump(&self, limit: usize) -> Result<Vec<LedgerEvent>>;
}

/// SQLite-backed [`RepoLedger`].
///
/// The next window resumes from the day after the last `end` event, or from
/// the configured floor date when the log has none, and runs through
/// yesterday (or a fixed horizon when one is set, which test rigs and bounded
/// backfills use).
pub struct DbLedger {
    conn: Connection,
    floor: Date,
    horizon: Option<Date>,
    last_time: i64,
}

impl DbLedger {
    /// Opens (or creates) the ledger database at `path`. `floor` is the
    /// first date the mirror is interested in, used when the log carries no
    /// completed window yet.
    pub fn open(path: impl AsRef<Path>, floor: Date) -> Result<Self> {
        Self::init(Connection::open(path)?, floor)
    }

    /// In-memory ledger, mainly for tests and dry runs.
    pub fn open_in_memory(floor: Date) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, floor)
    }

    fn init(conn: Connection, floor: Date) -> Result<Self> {
        conn.execute(DDL, [])?;
        Ok(DbLedger {
            conn,
            floor,
            horizon: None,
            last_time: 0,
        })
    }

    /// Fixes the upper bound of derived windows instead of using yesterday.
    pub fn with_horizon(mut self, horizon: Date) -> Self {
        self.horizon = Some(horizon);
        self
    }

    fn now(&mut self) -> i64 {
        let t = chrono::Utc::now().timestamp().max(self.last_time);
        self.last_time = t;
        t
    }

    fn append(&mut self, name: &str, date: Option<Date>, data: &str) -> Result<()> {
        let time = self.now();
        let date = date.map(|d| d.to_string()).unwrap_or_default();
        self.conn.execute(
            &format!(
                "INSERT INTO {LEDGER_TABLE} (event_time, event_name, event_date, event_data) \
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![time, name, date, data],
        )?;
        Ok(())
    }

    fn last_end_date(&self) -> Result<Option<Date>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT event_date FROM {LEDGER_TABLE} WHERE event_name = 'end' \
             ORDER BY rowid DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let date: String = row.get(0)?;
                Ok(Some(Date::parse(&date)?))
            }
            None => Ok(None),
        }
    }

    /// The last `limit` rows rendered as a JSON array, for diagnostics.
    pub fn dump_json(&self, limit: usize) -> Result<String> {
        Ok(serde_json::to_string(&self.dump(limit)?)?)
    }
}

impl RepoLedger for DbLedger {
    fn start(&mut self, date: Date) -> Result<()> {
        self.append("start", Some(date), "")
    }

    fn end(&mut self, date: Date) -> Result<()> {
        self.append("end", Some(date), "")
    }

    fn error(&mut self, date: Option<Date>, message: &str) -> Result<()> {
        self.append("error", date, message)
    }

    fn record(&mut self, date: Date, period: PeriodType) -> Result<()> {
        self.append("record", Some(date), period.as_str())
    }

    fn next_period(&mut self) -> Result<(Date, Date)> {
        let mut from = match self.last_end_date()? {
            Some(end) => end.add_days(1),
            None => self.floor,
        };
        let to = self.horizon.unwrap_or_else(Date::yesterday);
        // A fully caught-up log degenerates to re-scanning the final day,
        // which the missing scan then reports as empty.
        if from > to {
            from = to;
        }
        self.append("next_period", Some(from), &to.to_string())?;
        Ok((from, to))
    }

    fn dump(&self, limit: usize) -> Result<Vec<LedgerEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT event_time, event_name, event_date, event_data FROM {LEDGER_TABLE} \
             ORDER BY rowid DESC LIMIT ?1"
        ))?;
        let mut events = stmt
            .query_map(params![limit as i64], |row| {
                Ok(LedgerEvent {
                    event_time: row.get(0)?,
                    event_name: row.get(1)?,
                    event_date: row.get(2)?,
                    event_data: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        events.reverse();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Date {
        Date::parse(s).unwrap()
    }

    fn names(events: &[LedgerEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_name.as_str()).collect()
    }

    #[test]
    fn events_append_in_order() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01")).unwrap();
        ledger.start(d("2021-01-01")).unwrap();
        ledger.record(d("2021-07-12"), PeriodType::Day).unwrap();
        ledger.record(d("2021-07-13"), PeriodType::Quarter).unwrap();
        ledger.end(d("2021-08-01")).unwrap();

        let events = ledger.dump(10).unwrap();
        assert_eq!(names(&events), vec!["start", "record", "record", "end"]);
        assert_eq!(events[1].event_date, "2021-07-12");
        assert_eq!(events[1].event_data, "D");
        assert_eq!(events[2].event_data, "Q");
        assert_eq!(events[3].event_date, "2021-08-01");
        assert!(events.windows(2).all(|w| w[0].event_time <= w[1].event_time));
    }

    #[test]
    fn error_rows_keep_message_and_optional_date() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01")).unwrap();
        ledger.error(None, "scan blew up").unwrap();
        ledger
            .error(Some(d("2021-07-13")), "object already exists: x")
            .unwrap();

        let events = ledger.dump(10).unwrap();
        assert_eq!(events[0].event_date, "");
        assert_eq!(events[0].event_data, "scan blew up");
        assert_eq!(events[1].event_date, "2021-07-13");
    }

    #[test]
    fn dump_returns_the_tail() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01")).unwrap();
        for i in 0..5 {
            ledger.record(d("2021-07-12").add_days(i), PeriodType::Day).unwrap();
        }
        let events = ledger.dump(2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_date, "2021-07-15");
        assert_eq!(events[1].event_date, "2021-07-16");
    }

    #[test]
    fn next_period_starts_at_the_floor() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01"))
            .unwrap()
            .with_horizon(d("2021-08-01"));
        let (from, to) = ledger.next_period().unwrap();
        assert_eq!(from, d("2021-01-01"));
        assert_eq!(to, d("2021-08-01"));

        let events = ledger.dump(10).unwrap();
        assert_eq!(names(&events), vec!["next_period"]);
        assert_eq!(events[0].event_date, "2021-01-01");
        assert_eq!(events[0].event_data, "2021-08-01");
    }

    #[test]
    fn next_period_resumes_after_the_last_end() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01"))
            .unwrap()
            .with_horizon(d("2021-08-01"));
        ledger.start(d("2021-01-01")).unwrap();
        ledger.end(d("2021-03-31")).unwrap();

        let (from, to) = ledger.next_period().unwrap();
        assert_eq!(from, d("2021-04-01"));
        assert_eq!(to, d("2021-08-01"));
    }

    #[test]
    fn next_period_never_inverts_the_window() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01"))
            .unwrap()
            .with_horizon(d("2021-03-31"));
        ledger.end(d("2021-03-31")).unwrap();

        let (from, to) = ledger.next_period().unwrap();
        assert!(from <= to);
        assert_eq!(from, d("2021-03-31"));
        assert_eq!(to, d("2021-03-31"));
    }

    #[test]
    fn dump_json_renders_rows() {
        let mut ledger = DbLedger::open_in_memory(d("2021-01-01")).unwrap();
        ledger.start(d("2021-01-01")).unwrap();
        let json = ledger.dump_json(1).unwrap();
        assert!(json.contains("\"event_name\":\"start\""));
    }
}
