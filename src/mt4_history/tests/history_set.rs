mod common;

use common::{bar, day, history_dir, minute_bars};
use history_source::models::period::Period;
use mt4_history::{
    codec::BarFormat,
    error::{FormatErrorKind, HistoryError},
    file::{HistoryFile, file_name},
    registry::{SetOrigin, SetRegistry},
};

#[test]
fn overlapping_synchronize_keeps_head_and_replaces_overlap() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();
    let t0 = day(2022, 1, 4);
    let (t1, t2) = (t0 + 60, t0 + 120);

    let set = registry.create("EURUSD", 5, BarFormat::V400, dir.path()).unwrap();
    set.synchronize(&[bar(t0, 1.1), bar(t1, 1.2)]).unwrap();
    set.synchronize(&[bar(t1, 1.25), bar(t2, 1.3)]).unwrap();

    let bars = set.file(Period::M1).unwrap().unwrap().read_bars().unwrap();
    let closes: Vec<(i64, f64)> = bars.iter().map(|b| (b.time, b.close)).collect();
    assert_eq!(closes, [(t0, 1.1), (t1, 1.25), (t2, 1.3)]);
    assert_eq!(set.last_sync_time().unwrap(), Some(t2));

    // higher timeframes stay empty placeholders
    for period in &Period::ALL[1..] {
        assert_eq!(set.file(*period).unwrap().unwrap().bar_count(), 0, "{period}");
    }
    assert_eq!(registry.close_all().unwrap(), 1);
}

#[test]
fn create_writes_all_nine_files() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();
    registry.create("GBPUSD", 5, BarFormat::V401, dir.path()).unwrap();
    registry.close_all().unwrap();

    for period in Period::ALL {
        let file = HistoryFile::open(&dir.path().join(file_name("GBPUSD", period))).unwrap();
        assert_eq!(file.period(), period);
        assert_eq!(file.format(), BarFormat::V401);
        assert_eq!(file.digits(), 5);
    }
}

#[test]
fn get_without_files_returns_none() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();
    assert!(registry.get("EURUSD", dir.path()).unwrap().is_none());
    assert!(registry.get("EURUSD", &dir.path().join("missing")).unwrap().is_none());
    assert!(registry.is_empty());
}

#[test]
fn get_opens_a_set_from_a_lone_m1_file() {
    let dir = history_dir();
    let d = day(2022, 1, 4);
    let mut m1 = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V400).unwrap();
    m1.synchronize(&minute_bars(d, 3, 1.1)).unwrap();
    m1.close().unwrap();

    let mut registry = SetRegistry::new();
    let set = registry.get("EURUSD", dir.path()).unwrap().unwrap();
    assert_eq!(set.digits(), 5);
    assert_eq!(set.format(), BarFormat::V400);
    assert_eq!(set.last_sync_time().unwrap(), Some(d + 120));
    assert!(set.file(Period::H1).unwrap().is_none());
    assert_eq!(registry.len(), 1);

    // a second lookup returns the registered set
    registry.get("eurusd", dir.path()).unwrap().unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn get_skips_corrupt_files() {
    let dir = history_dir();
    std::fs::write(dir.path().join(file_name("EURUSD", Period::M1)), b"short").unwrap();
    HistoryFile::create(dir.path(), "EURUSD", Period::M5, 3, BarFormat::V400)
        .unwrap()
        .close()
        .unwrap();

    let mut registry = SetRegistry::new();
    let set = registry.get("EURUSD", dir.path()).unwrap().unwrap();
    assert_eq!(set.digits(), 3);
    assert_eq!(set.last_sync_time().unwrap(), None);
}

#[test]
fn files_of_another_symbol_are_not_adopted() {
    let dir = history_dir();
    let foreign = |period: Period| {
        let mut file = HistoryFile::create(dir.path(), "GBPUSD", period, 5, BarFormat::V400).unwrap();
        file.close().unwrap();
        std::fs::rename(file.path(), dir.path().join(file_name("EURUSD", period))).unwrap();
    };
    foreign(Period::M1);

    let mut registry = SetRegistry::new();
    assert!(registry.get("EURUSD", dir.path()).unwrap().is_none());
    assert!(registry.is_empty());

    // a genuine file defines the set; the foreign one still cannot be loaded
    HistoryFile::create(dir.path(), "EURUSD", Period::M5, 5, BarFormat::V400)
        .unwrap()
        .close()
        .unwrap();
    foreign(Period::H1);
    let set = registry.get("EURUSD", dir.path()).unwrap().unwrap();
    assert!(set.file(Period::M5).unwrap().is_some());
    let err = set.file(Period::H1).unwrap_err();
    assert_eq!(err.format_kind(), Some(FormatErrorKind::SymbolMismatch));
}

#[test]
fn create_replaces_an_open_set() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();
    let d = day(2022, 1, 4);
    registry
        .create("EURUSD", 5, BarFormat::V400, dir.path())
        .unwrap()
        .synchronize(&minute_bars(d, 3, 1.1))
        .unwrap();

    let set = registry.create("EURUSD", 5, BarFormat::V400, dir.path()).unwrap();
    assert_eq!(set.file(Period::M1).unwrap().unwrap().bar_count(), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn get_or_create_reports_origin_and_checks_digits() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();

    let (origin, _) = registry.get_or_create("EURUSD", 5, BarFormat::V400, dir.path()).unwrap();
    assert_eq!(origin, SetOrigin::NewFromScratch);
    let (origin, _) = registry.get_or_create("EURUSD", 5, BarFormat::V400, dir.path()).unwrap();
    assert_eq!(origin, SetOrigin::OpenExisting);

    let err = registry
        .get_or_create("EURUSD", 3, BarFormat::V400, dir.path())
        .unwrap_err();
    assert_eq!(err.format_kind(), Some(FormatErrorKind::DigitsMismatch));
}

#[test]
fn closed_sets_are_unregistered_and_reject_writes() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();
    registry.create("EURUSD", 5, BarFormat::V400, dir.path()).unwrap();

    assert!(registry.close("EURUSD", dir.path()).unwrap());
    assert!(!registry.close("EURUSD", dir.path()).unwrap());
    assert!(registry.is_empty());

    // reopening from disk works after close
    let set = registry.get("EURUSD", dir.path()).unwrap().unwrap();
    assert_eq!(set.last_sync_time().unwrap(), Some(0));
    assert!(set.close().unwrap());
    assert!(matches!(
        set.synchronize(&[bar(day(2022, 1, 4), 1.1)]),
        Err(HistoryError::InvalidState(_))
    ));
}

#[test]
fn append_bars_fans_out_to_every_period() {
    let dir = history_dir();
    let mut registry = SetRegistry::new();
    let d = day(2022, 1, 4);
    let set = registry.create("XAUUSD", 2, BarFormat::V401, dir.path()).unwrap();
    assert_eq!(set.append_bars(&minute_bars(d, 4, 1800.0)).unwrap(), 4);

    assert_eq!(set.file(Period::M1).unwrap().unwrap().bar_count(), 4);
    assert_eq!(set.file(Period::MN1).unwrap().unwrap().bar_count(), 0);
}
