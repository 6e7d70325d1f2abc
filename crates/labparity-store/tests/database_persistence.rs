use labparity_store::{Database, StoreError, TeamDraft};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "labparity-store-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

#[test]
fn reopened_store_sees_previous_writes() {
    let tmp = TempDirGuard::new("reopen");
    let path = tmp.path().join("state/portal.jsonl");

    {
        let db = Database::open(&path).expect("open empty store");
        db.set_baseline_url("http://baseline.example").expect("set baseline");
        db.upsert_submission("lab1", "Ada", "http://ada.example")
            .expect("submit");
        db.ensure_leaderboard_entry("lab1", "http://ada.example", "Ada")
            .expect("ensure entry");
        db.update_leaderboard("lab1", "http://ada.example", "Ada", Some(true))
            .expect("record verdict");
        db.create_team(TeamDraft {
            lab: "lab1".to_string(),
            name: "Blue".to_string(),
            members: "ada, bob".to_string(),
        })
        .expect("create team");
    }

    let db = Database::open(&path).expect("reopen store");
    assert_eq!(db.baseline_url().as_deref(), Some("http://baseline.example"));
    assert_eq!(db.list_submissions(Some("lab1")).len(), 1);
    let entry = db
        .leaderboard_entry("lab1", "http://ada.example")
        .expect("leaderboard row");
    assert_eq!(entry.sync, Some(true));
    assert!(entry.last_checked.is_some());
    assert_eq!(db.list_teams(Some("lab1"))[0].name, "Blue");
}

#[test]
fn missing_team_is_reported() {
    let db = Database::in_memory();
    let draft = TeamDraft {
        lab: "lab1".to_string(),
        name: "Ghost".to_string(),
        members: "nobody".to_string(),
    };
    assert!(matches!(
        db.update_team(42, draft),
        Err(StoreError::TeamNotFound(42))
    ));
    assert!(matches!(db.delete_team(42), Err(StoreError::TeamNotFound(42))));
}

#[test]
fn concurrent_writers_serialize_through_the_lock() {
    let tmp = TempDirGuard::new("concurrent");
    let db = Arc::new(Database::open(tmp.path().join("portal.jsonl")).expect("open store"));
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let mut handles = Vec::new();
    for i in 0..workers {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let url = format!("http://student-{i}.example");
            db.upsert_submission("lab1", &format!("s{i}"), &url)
                .expect("submit");
            db.update_leaderboard("lab1", &url, &format!("s{i}"), Some(i % 2 == 0))
                .expect("record verdict");
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread");
    }

    assert_eq!(db.list_submissions(Some("lab1")).len(), workers);
    assert_eq!(db.list_leaderboard(Some("lab1")).len(), workers);

    let reopened = Database::open(tmp.path().join("portal.jsonl")).expect("reopen");
    assert_eq!(reopened.list_leaderboard(None).len(), workers);
}

#[test]
fn failed_snapshot_write_leaves_state_unchanged() {
    let tmp = TempDirGuard::new("failed-write");
    let blocker = tmp.path().join("not-a-dir");
    fs::write(&blocker, b"plain file").expect("blocker file");
    let db = Database::open(blocker.join("portal.jsonl")).expect("missing file opens empty");

    let result = db.upsert_submission("lab1", "Ada", "http://ada.example");
    assert!(matches!(result, Err(StoreError::Jsonl(_))), "{result:?}");
    assert!(db.list_submissions(Some("lab1")).is_empty());
    assert!(db.set_baseline_url("http://ref.example").is_err());
    assert_eq!(db.baseline_url(), None);
}
