mod common;

use common::{edgar_tree, formatter};
use mirrorkit::{Date, FileRepoFs, PeriodType, RepoFs, UsHolidays};
use tempfile::TempDir;

fn d(s: &str) -> Date {
    Date::parse(s).unwrap()
}

#[tokio::test]
async fn scan_finds_the_documented_gap_set() {
    let tmp = TempDir::new().unwrap();
    edgar_tree(tmp.path());
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();

    let mut quarters = Vec::new();
    let mut days = Vec::new();
    for item in fs
        .iterate_missing(d("2017-09-10"), d("2019-05-25"))
        .await
        .unwrap()
    {
        let path = item.unwrap();
        match path.period_type().unwrap() {
            PeriodType::Quarter => {
                assert_eq!(path.leaf(), Some("master.idx"));
                quarters.push((path.year().unwrap(), path.quarter().unwrap()));
            }
            PeriodType::Day => {
                let date = path.date().unwrap();
                assert!(!date.is_weekend(), "{date}");
                assert!(
                    !UsHolidays::for_year(date.year()).contains(date),
                    "{date} is a holiday"
                );
                days.push(date);
            }
        }
    }

    assert_eq!(quarters.len(), 7);
    assert_eq!(days.len(), 350);

    // Each quarter's master is announced at most once, in time order.
    let mut deduped = quarters.clone();
    deduped.dedup();
    assert_eq!(deduped, quarters);
    assert_eq!(
        quarters,
        vec![
            (2017, 3),
            (2018, 1),
            (2018, 2),
            (2018, 3),
            (2018, 4),
            (2019, 1),
            (2019, 2)
        ]
    );

    // Day paths come out strictly increasing and outside the prepared tree.
    assert!(days.windows(2).all(|w| w[0] < w[1]));
    assert!(days.iter().all(|date| *date < d("2017-10-01")
        || (*date > d("2018-01-25") && *date <= d("2019-05-25"))));
}

#[tokio::test]
async fn fully_mirrored_quarter_yields_nothing() {
    let tmp = TempDir::new().unwrap();
    edgar_tree(tmp.path());
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();

    let missing = fs
        .find_missing(d("2017-10-01"), d("2017-12-31"))
        .await
        .unwrap();
    assert!(missing.is_empty(), "{missing:?}");
}

#[tokio::test]
async fn weekends_alone_yield_nothing() {
    let tmp = TempDir::new().unwrap();
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();

    // 2021-07-17/18 is a Saturday/Sunday pair.
    let missing = fs
        .find_missing(d("2021-07-17"), d("2021-07-18"))
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn empty_sink_gets_quarter_then_days() {
    let tmp = TempDir::new().unwrap();
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();

    // Monday through Wednesday, no holidays.
    let missing = fs
        .find_missing(d("2021-07-12"), d("2021-07-14"))
        .await
        .unwrap();
    assert_eq!(
        missing,
        vec![
            "Q/2021/QTR3/master.idx",
            "D/2021/QTR3/master20210712.idx",
            "D/2021/QTR3/master20210713.idx",
            "D/2021/QTR3/master20210714.idx",
        ]
    );
}

#[tokio::test]
async fn reversed_window_is_empty() {
    let tmp = TempDir::new().unwrap();
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();
    let missing = fs
        .find_missing(d("2021-07-14"), d("2021-07-12"))
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn scan_sees_files_written_since_the_last_scan() {
    let tmp = TempDir::new().unwrap();
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();

    let before = fs
        .find_missing(d("2021-07-12"), d("2021-07-12"))
        .await
        .unwrap();
    assert_eq!(before.len(), 2); // quarter master + the day itself

    // Drop the daily file in behind the facade's back.
    let dir = tmp.path().join("D/2021/QTR3");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("master20210712.idx"), "x").unwrap();

    let after = fs
        .find_missing(d("2021-07-12"), d("2021-07-12"))
        .await
        .unwrap();
    assert!(after.is_empty(), "{after:?}");
}

#[tokio::test]
async fn holiday_weekdays_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let mut fs = FileRepoFs::new(tmp.path(), formatter()).unwrap();

    // 2020-07-03 is the observed Independence Day (a Friday).
    let missing = fs
        .find_missing(d("2020-07-03"), d("2020-07-03"))
        .await
        .unwrap();
    assert!(missing.is_empty());
}
