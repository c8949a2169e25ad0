use mirrorkit::{Date, DbLedger, PeriodType, RepoLedger};
use tempfile::TempDir;

fn d(s: &str) -> Date {
    Date::parse(s).unwrap()
}

#[test]
fn ledger_persists_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("ledger.db");

    {
        let mut ledger = DbLedger::open(&db_path, d("2021-01-01")).unwrap();
        ledger.start(d("2021-01-01")).unwrap();
        ledger.record(d("2021-02-01"), PeriodType::Day).unwrap();
        ledger.end(d("2021-03-31")).unwrap();
    }

    // Reopening must not recreate the table or lose rows.
    let mut ledger = DbLedger::open(&db_path, d("2021-01-01"))
        .unwrap()
        .with_horizon(d("2021-12-31"));
    let events = ledger.dump(16).unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].event_name, "end");
    assert_eq!(events[2].event_date, "2021-03-31");

    // The next window resumes from the recorded progress.
    let (from, to) = ledger.next_period().unwrap();
    assert_eq!(from, d("2021-04-01"));
    assert_eq!(to, d("2021-12-31"));
}

#[test]
fn two_runs_interleave_monotonically() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("ledger.db");

    let mut ledger = DbLedger::open(&db_path, d("2021-01-01"))
        .unwrap()
        .with_horizon(d("2021-06-30"));
    let (b1, e1) = ledger.next_period().unwrap();
    ledger.start(b1).unwrap();
    ledger.end(e1).unwrap();

    let (b2, _) = ledger.next_period().unwrap();
    assert_eq!(b2, e1.add_days(1).min(d("2021-06-30")));

    let events = ledger.dump(16).unwrap();
    assert!(events.windows(2).all(|w| w[0].event_time <= w[1].event_time));
}
