// Integration tests for the document controller
// Open, edit, save and submit documents the way an editor does

use scan_editor::document::{DocumentError, DocumentState, Operation, OperationSuccess};
use scan_editor::remote::{RemoteResult, ScanInfo};
use scan_editor::{
    MemoryScanService, ScanCommand, ScanId, ScanResource, ScanService, Session, xml,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn two_commands() -> Vec<ScanCommand> {
    vec![ScanCommand::move_to("x", 5.0), ScanCommand::wait(2.0)]
}

fn memory_session() -> (Session, Arc<MemoryScanService>) {
    let service = Arc::new(MemoryScanService::new());
    (Session::new(service.clone()), service)
}

/// Scan service that holds every submission until released
struct SlowService {
    released: AtomicBool,
    inner: MemoryScanService,
}

impl SlowService {
    fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
            inner: MemoryScanService::new(),
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl ScanService for SlowService {
    fn submit(&self, name: &str, commands: &[ScanCommand]) -> RemoteResult<ScanId> {
        let deadline = Instant::now() + TIMEOUT;
        while !self.released.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.inner.submit(name, commands)
    }

    fn fetch(&self, id: ScanId) -> RemoteResult<Vec<ScanCommand>> {
        self.inner.fetch(id)
    }

    fn query_status(&self, id: ScanId) -> RemoteResult<ScanInfo> {
        self.inner.query_status(id)
    }
}

#[test]
fn test_move_wait_log_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.scn");
    std::fs::write(&path, xml::encode_string(&two_commands()).unwrap()).unwrap();

    let (session, _) = memory_session();
    let mut document = session.create_document();
    document.open_from_file(&path).unwrap();
    let completions = document.wait_idle(TIMEOUT);
    assert!(completions[0].is_ok());
    assert_eq!(document.commands(), two_commands().as_slice());

    let mut edited = two_commands();
    edited.push(ScanCommand::log("done"));
    document.edit(edited, "Add log").unwrap();
    assert_eq!(document.commands().len(), 3);
    assert!(document.is_dirty());

    assert_eq!(document.undo().unwrap().as_deref(), Some("Add log"));
    assert_eq!(document.commands(), two_commands().as_slice());
    assert!(!document.is_dirty());

    let encoded = xml::encode_string(document.commands()).unwrap();
    assert_eq!(xml::decode_str(&encoded).unwrap(), two_commands());
}

#[test]
fn test_save_and_reopen_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved.scn");
    let (session, _) = memory_session();

    let mut document = session.create_document();
    document
        .edit(
            vec![
                ScanCommand::comment("Align"),
                ScanCommand::loop_over(
                    "motor_x",
                    0.0,
                    10.0,
                    2.0,
                    vec![ScanCommand::log_devices("point", ["motor_x", "detector"])],
                ),
            ],
            "Draft",
        )
        .unwrap();
    assert!(document.is_dirty());

    document.save_as(&path).unwrap();
    assert_eq!(document.state(), DocumentState::Saving);
    let completions = document.wait_idle(TIMEOUT);
    assert!(matches!(
        completions[0].result,
        Ok(OperationSuccess::Saved(ScanResource::File(_)))
    ));
    assert!(!document.is_dirty());
    assert!(!document.undo_log().can_undo());
    assert_eq!(document.name(), "saved");
    let saved = document.commands().to_vec();
    drop(document);

    let mut reopened = session.create_document();
    reopened.open_from_file(&path).unwrap();
    reopened.wait_idle(TIMEOUT);
    assert_eq!(reopened.commands(), saved.as_slice());
    assert_eq!(reopened.state(), DocumentState::Ready);
}

#[test]
fn test_dirty_listener() {
    let flips = Rc::new(RefCell::new(Vec::new()));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dirty.scn");
    let (session, _) = memory_session();

    let mut document = session.create_document();
    let sink = flips.clone();
    document.on_dirty_changed(move |dirty| sink.borrow_mut().push(dirty));

    document.edit(two_commands(), "Add").unwrap();
    document.save_as(&path).unwrap();
    document.wait_idle(TIMEOUT);
    document.edit(Vec::new(), "Clear").unwrap();
    document.undo().unwrap();

    assert_eq!(*flips.borrow(), vec![true, false, true, false]);
}

#[test]
fn test_save_while_saving() {
    let service = Arc::new(SlowService::new());
    let id = service.inner.submit("slow", &two_commands()).unwrap();
    let session = Session::new(service.clone());

    let mut document = session.create_document();
    document.open_from_remote(id).unwrap();
    document.wait_idle(TIMEOUT);
    document.edit(vec![ScanCommand::wait(1.0)], "Replace").unwrap();

    document.save().unwrap();
    assert!(matches!(
        document.save(),
        Err(DocumentError::OperationInProgress(Operation::Save))
    ));
    assert!(matches!(
        document.submit("again"),
        Err(DocumentError::OperationInProgress(Operation::Save))
    ));

    service.release();
    let completions = document.wait_idle(TIMEOUT);
    assert_eq!(completions.len(), 1);
    assert!(matches!(
        completions[0].result,
        Ok(OperationSuccess::Saved(ScanResource::Remote(_)))
    ));
    assert_eq!(document.state(), DocumentState::Ready);
    assert!(!document.is_dirty());
}

#[test]
fn test_edit_during_save_stays_dirty() {
    let service = Arc::new(SlowService::new());
    let id = service.inner.submit("slow", &two_commands()).unwrap();
    let session = Session::new(service.clone());

    let mut document = session.create_document();
    document.open_from_remote(id).unwrap();
    document.wait_idle(TIMEOUT);
    document.edit(vec![ScanCommand::wait(1.0)], "First").unwrap();

    document.save().unwrap();
    document.edit(vec![ScanCommand::wait(3.0)], "During save").unwrap();
    service.release();
    document.wait_idle(TIMEOUT);

    assert!(document.is_dirty());
    assert_eq!(document.commands(), &[ScanCommand::wait(3.0)]);
}

#[test]
fn test_save_without_destination() {
    let (session, _) = memory_session();
    let mut document = session.create_document();
    document.edit(two_commands(), "Add").unwrap();
    assert!(matches!(document.save(), Err(DocumentError::NoDestination)));
    assert_eq!(document.state(), DocumentState::Ready);
}

#[test]
fn test_already_open() {
    let (session, service) = memory_session();
    let id = service.submit("shared", &two_commands()).unwrap();

    let mut first = session.create_document();
    first.open_from_remote(id).unwrap();

    // Bound right away, before the load finished
    let mut second = session.create_document();
    match second.open_from_remote(id) {
        Err(DocumentError::AlreadyOpen(resource, owner)) => {
            assert_eq!(resource, ScanResource::Remote(id));
            assert_eq!(owner, first.id());
        }
        other => panic!("expected AlreadyOpen, got {:?}", other),
    }
    assert_eq!(second.state(), DocumentState::Empty);

    first.close();
    second.open_from_remote(id).unwrap();
    second.wait_idle(TIMEOUT);
    assert_eq!(second.commands(), two_commands().as_slice());
}

#[test]
fn test_same_file_two_spellings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.scn");
    std::fs::write(&path, xml::encode_string(&two_commands()).unwrap()).unwrap();
    let other_spelling = dir.path().join(".").join("a.scn");

    let (session, _) = memory_session();
    let mut first = session.create_document();
    first.open_from_file(&path).unwrap();
    let mut second = session.create_document();
    assert!(matches!(
        second.open_from_file(&other_spelling),
        Err(DocumentError::AlreadyOpen(..))
    ));
}

#[test]
fn test_close_cancels_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("close.scn");
    std::fs::write(&path, xml::encode_string(&two_commands()).unwrap()).unwrap();

    let (session, _) = memory_session();
    let mut document = session.create_document();
    document.open_from_file(&path).unwrap();
    document.close();

    std::thread::sleep(Duration::from_millis(50));
    assert!(document.process_completions().is_empty());
    assert!(document.commands().is_empty());
    assert_eq!(document.state(), DocumentState::Closed);
    assert!(session.registry().is_empty());
}

#[test]
fn test_malformed_file_leaves_model_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.scn");
    std::fs::write(
        &path,
        "<commands><move><device>x</device><value>1</value></move><teleport/></commands>",
    )
    .unwrap();

    let (session, _) = memory_session();
    let mut document = session.create_document();
    document.edit(two_commands(), "Keep").unwrap();
    document.open_from_file(&path).unwrap();
    let completions = document.wait_idle(TIMEOUT);

    assert!(matches!(
        completions[0].result,
        Err(DocumentError::MalformedDocument(ref message)) if message.contains("teleport")
    ));
    assert_eq!(document.state(), DocumentState::LoadFailed);
    assert_eq!(document.commands(), two_commands().as_slice());
    assert!(document.is_dirty());
}

#[test]
fn test_missing_file_is_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = memory_session();
    let mut document = session.create_document();
    document.open_from_file(dir.path().join("missing.scn")).unwrap();
    let completions = document.wait_idle(TIMEOUT);
    assert!(matches!(
        completions[0].result,
        Err(DocumentError::IoFailure(_))
    ));
}

#[test]
fn test_save_failure_keeps_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("x.scn");
    let (session, _) = memory_session();

    let mut document = session.create_document();
    document.edit(two_commands(), "Add").unwrap();
    document.save_as(&path).unwrap();
    let completions = document.wait_idle(TIMEOUT);

    assert!(matches!(
        completions[0].result,
        Err(DocumentError::IoFailure(_))
    ));
    assert_eq!(document.state(), DocumentState::SaveFailed);
    assert!(document.is_dirty());
    assert_eq!(document.resource(), None);
    assert!(session.registry().is_empty());
}

#[test]
fn test_remote_round_trip() {
    let (session, service) = memory_session();
    let id = service.submit("round trip", &[ScanCommand::move_to("x", 5.0)]).unwrap();
    assert_eq!(service.fetch(id).unwrap(), vec![ScanCommand::move_to("x", 5.0)]);

    let mut document = session.create_document();
    document.open_from_remote(ScanId(id.0 + 100)).unwrap();
    let completions = document.wait_idle(TIMEOUT);
    assert!(matches!(
        completions[0].result,
        Err(DocumentError::NotFound(missing)) if missing == ScanId(id.0 + 100)
    ));
}

#[test]
fn test_completion_listener() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (session, _) = memory_session();
    let mut document = session.create_document();
    let sink = seen.clone();
    document.on_completion(move |completion| sink.borrow_mut().push(completion.operation));

    document.edit(two_commands(), "Add").unwrap();
    document.submit("listener").unwrap();
    document.wait_idle(TIMEOUT);

    assert_eq!(*seen.borrow(), vec![Operation::Submit]);
}
