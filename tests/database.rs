use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use runlog_rs::config::Config;
use runlog_rs::database::Database;
use runlog_rs::error::DatabaseError;
use tempfile::tempdir;

fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid date")
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("dir");
    }
    std::fs::write(path, content).expect("fixture");
}

fn dates(db: &Database) -> Vec<NaiveDateTime> {
    db.entries().iter().map(|entry| entry.date()).collect()
}

#[test]
fn reload_sorts_newest_first_and_skips_junk() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path();
    write(&root.join("2020/a"), "Date: 2020-01-01 08:00:00\nDistance: 5 km\n\n");
    write(&root.join("2021/b"), "Date: 2021-06-01 07:30\n\n");
    write(&root.join("2020/c"), "Date: 2020-03-15\n\nbody\n");
    write(&root.join("2020/no-date"), "Distance: 3 km\n\n");
    write(&root.join("2020/c~"), "Date: 2019-01-01\n\n");
    write(&root.join("2020/c.bak"), "Date: 2019-01-02\n\n");
    write(&root.join(".hidden/d"), "Date: 2019-01-03\n\n");
    write(&root.join("2020/run.tcx"), "<TrainingCenterDatabase/>");

    let db = Database::open(Config::new(root)).expect("open");

    assert_eq!(db.len(), 3);
    assert_eq!(
        dates(&db),
        vec![
            NaiveDate::from_ymd_opt(2021, 6, 1)
                .and_then(|d| d.and_hms_opt(7, 30, 0))
                .expect("date"),
            at(2020, 3, 15, 0),
            at(2020, 1, 1, 8),
        ]
    );
}

#[test]
fn open_fails_for_missing_directory() {
    let dir = tempdir().expect("temp dir");
    let result = Database::open(Config::new(dir.path().join("absent")));
    assert!(matches!(result, Err(DatabaseError::Scan { .. })));
}

#[test]
fn add_activity_keeps_order_and_replaces_same_date() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path();
    let mut db = Database::open(Config::new(root)).expect("open");

    let days = [5, 1, 9, 3, 7];
    for day in days {
        let path = root.join(format!("run-{}", day));
        write(&path, &format!("Date: 2020-01-{:02} 08:00:00\n\n", day));
        db.add_activity(&path).expect("add");
    }
    let got = dates(&db);
    let mut sorted = got.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(got, sorted);
    assert_eq!(db.len(), days.len());

    let dup = root.join("run-3-again");
    write(&dup, "Date: 2020-01-03 08:00:00\nDistance: 3 km\n\n");
    let index = db.add_activity(&dup).expect("add duplicate");

    assert_eq!(db.len(), days.len());
    assert_eq!(db.entries()[index].record().field("Distance"), Some("3 km"));
    assert_eq!(db.find(at(2020, 1, 3, 8)), Some(index));

    let undated = root.join("undated");
    write(&undated, "Distance: 1 km\n\n");
    assert!(matches!(
        db.add_activity(&undated),
        Err(DatabaseError::MissingDate(_))
    ));
}

#[test]
fn create_edit_synchronize_and_remove() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path();
    let mut db = Database::open(Config::new(root)).expect("open");

    let date = at(2022, 4, 2, 9);
    let index = db.create_activity(date).expect("create");
    let path = root.join("2022").join("2022-04-02-090000");
    assert!(path.exists());
    assert!(matches!(
        db.create_activity(date),
        Err(DatabaseError::AlreadyExists(_))
    ));

    {
        let mut activity = db.activity_mut(index).expect("activity");
        activity.set_field_text("Distance", "8 km").expect("distance");
        activity.set_body("Long run.\n");
    }
    assert_eq!(db.synchronize().expect("sync"), 1);
    assert_eq!(db.synchronize().expect("sync again"), 0);

    let reopened = Database::open(Config::new(root)).expect("reopen");
    let activity = reopened.activity(0).expect("activity");
    assert_eq!(activity.distance(), Some(8000.0));
    assert_eq!(activity.body(), "Long run.\n");

    assert!(db.remove_activity(date).expect("remove"));
    assert!(!path.exists());
    assert!(db.is_empty());
    assert!(!db.remove_activity(date).expect("nothing left"));
}

#[test]
fn synchronize_resorts_after_date_edit() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path();
    write(&root.join("a"), "Date: 2020-01-01 08:00:00\n\n");
    write(&root.join("b"), "Date: 2020-02-01 08:00:00\n\n");
    let mut db = Database::open(Config::new(root)).expect("open");

    let oldest = db.find(at(2020, 1, 1, 8)).expect("present");
    db.activity_mut(oldest)
        .expect("activity")
        .set_date(at(2020, 3, 1, 8));
    db.synchronize().expect("sync");

    assert_eq!(dates(&db), vec![at(2020, 3, 1, 8), at(2020, 2, 1, 8)]);
}

#[test]
fn completion_uses_recent_window_and_ignores_case() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path();
    write(
        &root.join("new"),
        "Date: 2023-06-01 08:00:00\nEquipment: Pegasus trail-shoes\nWeather: sunny\nMood: great\nAvg-HR: 150\n\n",
    );
    write(
        &root.join("mid"),
        "Date: 2023-04-01 08:00:00\nEquipment: pegasus Speedgoat\nWeather: Sunny windy\n\n",
    );
    write(
        &root.join("old"),
        "Date: 2022-01-01 08:00:00\nEquipment: PegasusOld\nMotto: keep going\n\n",
    );
    let db = Database::open(Config::new(root)).expect("open");

    assert_eq!(
        db.complete_field_value("Equipment", "p"),
        vec!["Pegasus".to_string()]
    );
    assert_eq!(
        db.complete_field_value("equipment", ""),
        vec!["Pegasus", "Speedgoat", "trail-shoes"]
    );
    assert_eq!(db.complete_field_value("Weather", "S"), vec!["sunny"]);
    assert_eq!(db.complete_field_name("mo"), vec!["Mood"]);
    assert_eq!(db.complete_field_name("avg-h"), vec!["Avg-HR"]);
    assert!(db.complete_field_name("cal").is_empty(), "unused catalog names are not offered");
}

#[test]
fn failed_synchronize_still_resorts_the_index() {
    let dir = tempdir().expect("temp dir");
    let root = dir.path();
    write(&root.join("kept/a"), "Date: 2020-01-01 08:00:00\n\n");
    write(&root.join("gone/b"), "Date: 2020-02-01 08:00:00\n\n");
    let mut db = Database::open(Config::new(root)).expect("open");

    let january = db.find(at(2020, 1, 1, 8)).expect("present");
    db.activity_mut(january)
        .expect("activity")
        .set_date(at(2021, 1, 1, 8));
    let february = db.find(at(2020, 2, 1, 8)).expect("present");
    db.activity_mut(february)
        .expect("activity")
        .set_body("edited\n");
    std::fs::remove_dir_all(root.join("gone")).expect("remove dir");

    assert!(db.synchronize().is_err());
    assert_eq!(dates(&db), vec![at(2021, 1, 1, 8), at(2020, 2, 1, 8)]);
    assert!(db.find(at(2021, 1, 1, 8)).is_some());

    let reread = runlog_rs::record::Record::open(root.join("kept/a")).expect("written");
    assert_eq!(reread.field("Date"), Some("2021-01-01 08:00:00"));
}
