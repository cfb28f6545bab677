mod common;

use cad_intake_core::model::{FileKey, WorkItem};
use cad_intake_core::{Error, ProgressReporter, SilentReporter};
use common::{Fixture, ScriptedEngine, PROJECT};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Classification timestamps are stored to the second; keep downloads
/// strictly older than the batch that stamps them.
fn settle() {
    thread::sleep(Duration::from_millis(1100));
}

fn status(fx: &Fixture, key: FileKey) -> Option<String> {
    fx.db.file_status(PROJECT, &key).unwrap()
}

fn external(name: &str) -> FileKey {
    FileKey::External(name.to_string())
}

fn internal(name: &str) -> FileKey {
    FileKey::Internal(name.to_string())
}

/// Mixed download folder: one drawing to process, a document to copy,
/// an owned trade's drawing and a file nobody registered.
fn mixed_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.trade("HP", "Heating Piping", false)
        .trade("EL", "Electrical", true)
        .elevation("01", "0'0")
        .cad_record("tower-hp-l01", "HP", "01", "123456_HP-Lev01", None)
        .cad_record("tower-el-l01", "EL", "01", "123456_EL-Lev01", None)
        .record("Schedule", "pdf", "Copy");

    fx.download("tower-hp-l01.dwg", "heating");
    fx.download("tower-el-l01.dwg", "lighting");
    fx.download("Schedule.pdf", "pdf");
    fx.download("notes.txt", "hello");
    fx
}

/// Two area drawings of one floor that recombine into `123456_HP-Lev01`.
/// A third child is registered but never downloaded.
fn parent_fixture() -> Fixture {
    let fx = Fixture::new();
    let parent = Some("123456_HP-Lev01");
    fx.trade("HP", "Heating Piping", false)
        .elevation("01", "0'0")
        .cad_record("tower-hp-a-l01", "HP[A]", "01", "123456_HP-A-Lev01", parent)
        .cad_record("tower-hp-b-l01", "HP[B]", "01", "123456_HP-B-Lev01", parent)
        .cad_record("tower-hp-c-l01", "HP[C]", "01", "123456_HP-C-Lev01", parent)
        .cad_record("123456_HP-Lev01", "HP", "01", "123456_HP-Lev01", None);

    fx.download("tower-hp-a-l01.dwg", "east");
    fx.download("tower-hp-b-l01.dwg", "west");
    fx
}

#[derive(Default)]
struct RecordingReporter {
    classified: Mutex<Option<(usize, usize, usize, usize)>>,
    completed: AtomicUsize,
    parents: AtomicUsize,
}

impl ProgressReporter for RecordingReporter {
    fn on_classified(&self, to_process: usize, to_copy: usize, ignored: usize, unknown: usize) {
        *self.classified.lock().unwrap() = Some((to_process, to_copy, ignored, unknown));
    }

    fn on_file_complete(&self, _name: &str, _success: bool) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_parent_complete(&self, _name: &str, _success: bool) {
        self.parents.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_update_mixed_folder() {
    let fx = mixed_fixture();
    settle();

    let cad = Arc::new(ScriptedEngine::new());
    let reporter = RecordingReporter::default();
    let result = fx.engine(cad.clone()).run("123456", &reporter).unwrap();

    assert_eq!(result.project, PROJECT);
    assert_eq!(result.report.processed, vec!["tower-hp-l01.dwg"]);
    assert_eq!(result.report.copied, vec!["Schedule.pdf"]);
    assert_eq!(result.report.ignored, vec!["tower-el-l01.dwg"]);
    assert_eq!(result.report.unknown, vec!["notes.txt"]);
    assert!(result.report.failed.is_empty());
    assert_eq!(*reporter.classified.lock().unwrap(), Some((1, 1, 1, 1)));
    assert_eq!(reporter.completed.load(Ordering::SeqCst), 1);

    let merged = fx.merge.join("Heating Piping").join("123456_HP-Lev01.dwg");
    assert!(merged.is_file());
    assert!(fx.merge.join("MISC").join("Schedule.pdf").is_file());
    // owned trades are never touched
    assert!(!fx.merge.join("Electrical").exists());

    assert_eq!(status(&fx, external("tower-hp-l01")).as_deref(), Some("Ready"));
    assert_eq!(status(&fx, external("Schedule")).as_deref(), Some("Ready"));
    assert_eq!(status(&fx, external("tower-el-l01")).as_deref(), Some("Downloaded"));

    assert!(fx.db.last_processed(PROJECT, &internal("123456_HP-Lev01")).unwrap().is_some());
    assert!(fx.db.last_processed(PROJECT, &external("Schedule")).unwrap().is_some());
    assert!(fx.db.last_processed(PROJECT, &external("tower-el-l01")).unwrap().is_none());

    let report_path = result.report_path.unwrap();
    assert!(report_path.starts_with(&fx.config.report_dir));
    let csv = fs::read_to_string(&report_path).unwrap();
    assert!(csv.starts_with("category,file\n"));
    assert!(csv.contains("processed,tower-hp-l01.dwg"));
    assert!(csv.contains("copied,Schedule.pdf"));
}

#[test]
fn test_second_run_is_up_to_date() {
    let fx = mixed_fixture();
    settle();

    let cad = Arc::new(ScriptedEngine::new());
    let engine = fx.engine(cad.clone());
    engine.run("123456", &SilentReporter).unwrap();
    let calls = cad.call_count();

    let again = engine.run("123456", &SilentReporter).unwrap();
    assert!(again.report.processed.is_empty());
    assert!(again.report.copied.is_empty());
    assert_eq!(again.report.up_to_date, vec!["Schedule.pdf", "tower-hp-l01.dwg"]);
    assert_eq!(cad.call_count(), calls);
}

#[test]
fn test_children_combine_into_parent() {
    let fx = parent_fixture();
    settle();

    let cad = Arc::new(ScriptedEngine::new());
    let reporter = RecordingReporter::default();
    let result = fx.engine(cad.clone()).run("123456", &reporter).unwrap();

    assert_eq!(
        result.report.processed,
        vec!["123456_HP-Lev01.dwg", "tower-hp-a-l01.dwg", "tower-hp-b-l01.dwg"]
    );
    assert!(result.report.failed.is_empty());
    assert_eq!(reporter.parents.load(Ordering::SeqCst), 1);

    let processed_dir = fx.merge.join("Heating Piping");
    assert!(processed_dir.join("123456_HP-A-Lev01.dwg").is_file());
    assert!(processed_dir.join("123456_HP-B-Lev01.dwg").is_file());
    assert!(processed_dir.join("123456_HP-Lev01.dwg").is_file());

    let parent = result
        .items
        .iter()
        .find_map(|item| match item {
            WorkItem::Parent(p) => Some(p),
            _ => None,
        })
        .unwrap();
    assert!(parent.execute_successful);
    assert_eq!(parent.child_paths.len(), 3);
    assert_eq!(parent.children.len(), 2);

    let script = fs::read_to_string(
        parent
            .inbox_directory
            .join("Backup")
            .join("Scripts")
            .join("HP_01_combine.scr"),
    )
    .unwrap();
    assert!(script.contains("-LAYER MAKE \"HP-A\""));
    assert!(script.contains("-LAYER MAKE \"HP-B\""));
    // registered but never downloaded
    assert!(!script.contains("HP-C"));

    assert_eq!(status(&fx, internal("123456_HP-Lev01")).as_deref(), Some("Ready"));
    assert!(fx.db.last_processed(PROJECT, &internal("123456_HP-Lev01")).unwrap().is_some());
    assert!(fx.db.last_processed(PROJECT, &internal("123456_HP-A-Lev01")).unwrap().is_some());
}

#[test]
fn test_failed_child_blocks_parent() {
    let fx = parent_fixture();
    settle();

    let cad = Arc::new(ScriptedEngine::failing_on("tower-hp-a-l01"));
    let result = fx.engine(cad.clone()).run("123456", &SilentReporter).unwrap();

    assert_eq!(result.report.processed, vec!["tower-hp-b-l01.dwg"]);
    assert_eq!(
        result.report.failed,
        vec!["123456_HP-Lev01.dwg", "tower-hp-a-l01.dwg"]
    );

    let processed_dir = fx.merge.join("Heating Piping");
    assert!(!processed_dir.join("123456_HP-Lev01.dwg").exists());
    assert!(!processed_dir.join("123456_HP-A-Lev01.dwg").exists());
    assert!(processed_dir.join("123456_HP-B-Lev01.dwg").is_file());

    assert_eq!(status(&fx, external("tower-hp-a-l01")).as_deref(), Some("Failed"));
    assert_eq!(status(&fx, external("tower-hp-b-l01")).as_deref(), Some("Ready"));
    assert_eq!(status(&fx, internal("123456_HP-Lev01")).as_deref(), Some("Failed"));
    assert!(fx.db.last_processed(PROJECT, &internal("123456_HP-Lev01")).unwrap().is_none());
}

#[test]
fn test_unprepared_child_blocks_parent() {
    let fx = Fixture::new();
    let parent = Some("123456_HP-Lev01");
    fx.trade("HP", "Heating Piping", false)
        .elevation("01", "0'0")
        .cad_record("tower-hp-a-l01", "HP[A]", "01", "123456_HP-A-Lev01", parent)
        // no elevation row for level 99
        .cad_record("tower-hp-b-l99", "HP[B]", "99", "123456_HP-B-Lev99", parent)
        .cad_record("123456_HP-Lev01", "HP", "01", "123456_HP-Lev01", None);
    fx.download("tower-hp-a-l01.dwg", "east");
    fx.download("tower-hp-b-l99.dwg", "west");

    // an earlier batch left this child in the merge folder
    let processed_dir = fx.merge.join("Heating Piping");
    fs::create_dir_all(&processed_dir).unwrap();
    fs::write(processed_dir.join("123456_HP-B-Lev99.dwg"), "old west").unwrap();
    settle();

    let cad = Arc::new(ScriptedEngine::new());
    let result = fx.engine(cad.clone()).run("123456", &SilentReporter).unwrap();

    assert_eq!(result.report.processed, vec!["tower-hp-a-l01.dwg"]);
    assert_eq!(
        result.report.failed,
        vec!["123456_HP-Lev01.dwg", "tower-hp-b-l99.dwg"]
    );

    let parent = result
        .items
        .iter()
        .find_map(|item| match item {
            WorkItem::Parent(p) => Some(p),
            _ => None,
        })
        .unwrap();
    assert!(!parent.execute_successful);
    assert_eq!(parent.children.len(), 2);
    assert!(parent
        .children
        .iter()
        .any(|c| c.base_name == "tower-hp-b-l99" && !c.execute_successful));

    assert!(!processed_dir.join("123456_HP-Lev01.dwg").exists());
    assert!(!parent
        .inbox_directory
        .join("Backup")
        .join("Scripts")
        .join("HP_01_combine.scr")
        .exists());
    assert_eq!(status(&fx, internal("123456_HP-Lev01")).as_deref(), Some("Failed"));
    assert_eq!(status(&fx, external("tower-hp-b-l99")).as_deref(), Some("Failed"));
}

#[test]
fn test_empty_download_folder() {
    let fx = Fixture::new();
    fx.trade("HP", "Heating Piping", false);

    let cad = Arc::new(ScriptedEngine::new());
    let result = fx.engine(cad.clone()).run("123456", &SilentReporter).unwrap();

    assert!(result.items.is_empty());
    assert!(result.report.rows().is_empty());
    assert_eq!(cad.call_count(), 0);
}

#[test]
fn test_missing_download_folder_is_created() {
    let fx = Fixture::new();
    fs::remove_dir_all(&fx.download).unwrap();

    let cad = Arc::new(ScriptedEngine::new());
    fx.engine(cad).run("123456", &SilentReporter).unwrap();

    assert!(fx.download.is_dir());
}

#[test]
fn test_invalid_project_number() {
    let fx = Fixture::new();
    let engine = fx.engine(Arc::new(ScriptedEngine::new()));

    for input in ["12345", "1234567", "12a456", ""] {
        let err = engine.run(input, &SilentReporter).unwrap_err();
        assert!(matches!(err, Error::InvalidProjectNumber(_)), "{}: {:?}", input, err);
    }
}

#[test]
fn test_unknown_project() {
    let fx = Fixture::new();
    let engine = fx.engine(Arc::new(ScriptedEngine::new()));

    let err = engine.run("654321", &SilentReporter).unwrap_err();
    assert!(matches!(err, Error::ProjectFolderNotFound(_)));

    // folder on disk, nothing in the store
    fs::create_dir_all(
        fx.config
            .projects_dir
            .join("222222 - Annex")
            .join("01 Field Management")
            .join("04 Coordination")
            .join("INbox"),
    )
    .unwrap();
    let err = engine.run("222222", &SilentReporter).unwrap_err();
    assert!(matches!(err, Error::ProjectNotFound(222222)));
}

#[test]
fn test_missing_inbox() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.config.projects_dir.join("333333 - Garage")).unwrap();
    let engine = fx.engine(Arc::new(ScriptedEngine::new()));

    let err = engine.run("333333", &SilentReporter).unwrap_err();
    assert!(matches!(err, Error::InboxNotFound(_)));
}
