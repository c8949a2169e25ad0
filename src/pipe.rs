//! The sync pipe: drives source→sink replication under a ledger.
//!
//! One [`RepoPipe::sync`] call performs a single serial pass:
//!
//! ```text
//!           next_period()        iterate_missing()          each missing
//! IDLE ───────────────────► WINDOWED ──────────────────► COPYING ─────────► COPYING
//!                                    │                         │  (record per ok)
//!                                    └─(empty)─► DONE          │
//!                                                              └─(any failure)─► FAILED
//! ```
//!
//! For every missing artifact the pipe resolves the source object, creates
//! the sink object, streams the bytes across, and appends a `record` event.
//! Copies use rename-atomic overwrite, so at most the artifact being copied
//! when a failure hits can be incomplete on disk, and even then only as a
//! leftover temporary, never as a partially-written target.
//!
//! On the first failure the pipe appends one `error` event carrying the last
//! attempted artifact date, stops, and does not append `end`; already-copied
//! artifacts keep their `record` rows and are not rolled back. Retry policy
//! belongs to the caller.

use tracing::{debug, info, warn};

use crate::calendar::Date;
use crate::error::{MirrorError, Result};
use crate::ledger::RepoLedger;
use crate::repo::{DEFAULT_BUFSIZE, RepoFs};

/// Connects one source tree to one sink tree under a ledger.
pub struct RepoPipe<L, S, K>
where
    L: RepoLedger,
    S: RepoFs,
    K: RepoFs,
{
    ledger: L,
    source: S,
    sink: K,
}

impl<L, S, K> RepoPipe<L, S, K>
where
    L: RepoLedger,
    S: RepoFs,
    K: RepoFs,
{
    pub fn new(ledger: L, source: S, sink: K) -> Self {
        RepoPipe {
            ledger,
            source,
            sink,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Tears the pipe down, handing back its parts; useful after a sync to
    /// inspect the ledger or keep using the trees.
    pub fn into_parts(self) -> (L, S, K) {
        (self.ledger, self.source, self.sink)
    }

    /// Runs one sync pass over the next unprocessed window.
    ///
    /// Returns the copied window on success. The first failing step makes
    /// the pass stop: the failure is recorded as an `error` event (keeping
    /// the `record` rows of everything already copied) and returned.
    pub async fn sync(&mut self) -> Result<(Date, Date)> {
        let (beg, end) = self.ledger.next_period()?;
        self.ledger.start(beg)?;
        info!(from = %beg, to = %end, "sync window opened");

        let mut last_date: Option<Date> = None;
        match self.copy_missing(beg, end, &mut last_date).await {
            Ok(copied) => {
                self.ledger.end(end)?;
                info!(from = %beg, to = %end, copied, "sync window completed");
                Ok((beg, end))
            }
            Err(e) => {
                warn!(date = ?last_date.map(|d| d.to_string()), error = %e, "sync failed");
                self.ledger.error(last_date, &e.to_string())?;
                Err(e)
            }
        }
    }

    async fn copy_missing(
        &mut self,
        beg: Date,
        end: Date,
        last_date: &mut Option<Date>,
    ) -> Result<usize> {
        let missing = self.sink.iterate_missing(beg, end).await?;
        let mut copied = 0usize;

        for item in missing {
            let path = item?;
            let period = path.period_type()?;
            let date = path.date()?;
            *last_date = Some(date);

            let source = self
                .source
                .find(period, date)
                .await?
                .ok_or_else(|| MirrorError::NotFound(path.uri()))?;
            let sink = self.sink.create(period, date).await?;
            sink.write(source.read(DEFAULT_BUFSIZE).await?, true).await?;

            self.ledger.record(date, period)?;
            copied += 1;
            debug!(uri = %path.uri(), period = %period, "artifact copied");
        }
        Ok(copied)
    }
}
