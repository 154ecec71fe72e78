// DocumentController - one open scan document and its background work
//
// Loads, saves, submissions and status queries run as jobs on worker
// threads. Workers never touch the document: they push a `WorkOutcome`
// into a ring buffer and the owning thread applies it in
// `process_completions`. At most one operation is in flight per document.

use crate::config::EditorConfig;
use crate::document::error::{DocumentError, DocumentResult, Operation};
use crate::document::resource::{DocumentId, DocumentRegistry, ScanResource, normalize_path};
use crate::document::state::{DocumentState, ScanDocument};
use crate::jobs::{JobHandle, JobInfo, JobManager, JobMonitor};
use crate::messaging::channels::publish;
use crate::messaging::{Notification, NotificationCategory, SharedNotificationProducer};
use crate::remote::{RemoteResult, ScanClient, ScanId, ScanInfo, ScanService, ScanState};
use crate::scan::{ListenerId, ScanCommand, SequenceChange};
use crate::undo::UndoLog;
use crate::xml;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Completions that can queue up before the document processes them
const COMPLETION_CAPACITY: usize = 16;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Collaborators shared by every document of an editor session
#[derive(Clone)]
pub struct Session {
    service: Arc<dyn ScanService>,
    jobs: JobManager,
    registry: DocumentRegistry,
    notifications: Option<SharedNotificationProducer>,
    max_undo: usize,
}

impl Session {
    pub fn new(service: Arc<dyn ScanService>) -> Self {
        Self {
            service,
            jobs: JobManager::new(),
            registry: DocumentRegistry::new(),
            notifications: None,
            max_undo: crate::undo::DEFAULT_MAX_HISTORY,
        }
    }

    /// Session talking to the scan server named in `config`
    pub fn from_config(config: &EditorConfig) -> RemoteResult<Self> {
        let client = ScanClient::new(&config.server)?;
        Ok(Self::new(Arc::new(client)).with_max_undo(config.history.max_undo))
    }

    /// Report completions to the presentation layer through `producer`
    pub fn with_notifications(mut self, producer: SharedNotificationProducer) -> Self {
        self.notifications = Some(producer);
        self
    }

    pub fn with_max_undo(mut self, max_undo: usize) -> Self {
        self.max_undo = max_undo;
        self
    }

    pub fn with_jobs(mut self, jobs: JobManager) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn service(&self) -> &Arc<dyn ScanService> {
        &self.service
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// A new, empty document bound to nothing
    pub fn create_document(&self) -> DocumentController {
        DocumentController::new(self.clone())
    }

    /// Request cancellation of every job still running in this session
    ///
    /// Documents notice on their next `process_completions` and go back to
    /// where they were before the operation started.
    pub fn shutdown(&self) {
        let active = self.jobs.active_jobs().len();
        if active > 0 {
            tracing::info!(jobs = active, "Cancelling background jobs");
        }
        self.jobs.cancel_all();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.registry)
            .field("max_undo", &self.max_undo)
            .finish_non_exhaustive()
    }
}

/// What a successful background operation produced
#[derive(Debug, Clone, PartialEq)]
pub enum OperationSuccess {
    /// Number of top-level commands now in the document
    Loaded { commands: usize },
    /// Resource the document is now bound to
    Saved(ScanResource),
    Submitted(ScanId),
    Status(ScanInfo),
}

/// Outcome of one background operation, as applied to the document
#[derive(Debug)]
pub struct Completion {
    pub operation: Operation,
    pub result: DocumentResult<OperationSuccess>,
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Raw result a worker hands back
enum WorkResult {
    Loaded(Vec<ScanCommand>),
    Saved {
        resource: ScanResource,
        snapshot: Vec<ScanCommand>,
    },
    Submitted(ScanId),
    Status(ScanInfo),
}

struct WorkOutcome {
    ticket: u64,
    result: DocumentResult<WorkResult>,
}

type CompletionProducer = Arc<Mutex<HeapProd<WorkOutcome>>>;
type CompletionListener = Box<dyn FnMut(&Completion)>;

/// Operation in flight and what to restore if it is cancelled
struct PendingOperation {
    operation: Operation,
    ticket: u64,
    job: JobHandle,
    previous_state: DocumentState,
    previous_resource: Option<ScanResource>,
    /// Resource claimed for this operation on top of the current binding
    claimed: Option<ScanResource>,
}

/// Owns one open scan document
///
/// Not `Send`: the model, undo log and listeners live on the thread that
/// created the controller. Call [`DocumentController::process_completions`]
/// from that thread to apply finished background work.
pub struct DocumentController {
    id: DocumentId,
    session: Session,
    document: ScanDocument,
    pending: Option<PendingOperation>,
    next_ticket: u64,
    producer: CompletionProducer,
    consumer: HeapCons<WorkOutcome>,
    completion_listeners: Vec<CompletionListener>,
    closed: bool,
}

impl DocumentController {
    pub fn new(session: Session) -> Self {
        let (producer, consumer) = HeapRb::<WorkOutcome>::new(COMPLETION_CAPACITY).split();
        let document = ScanDocument::new(session.max_undo);
        Self {
            id: DocumentId::next(),
            session,
            document,
            pending: None,
            next_ticket: 1,
            producer: Arc::new(Mutex::new(producer)),
            consumer,
            completion_listeners: Vec::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn commands(&self) -> &[ScanCommand] {
        self.document.commands()
    }

    pub fn is_dirty(&self) -> bool {
        self.document.is_dirty()
    }

    pub fn state(&self) -> DocumentState {
        self.document.state()
    }

    pub fn resource(&self) -> Option<&ScanResource> {
        self.document.resource()
    }

    /// Title for the presentation layer, `*` marks unsaved edits
    pub fn title(&self) -> String {
        let name = self.name();
        if self.is_dirty() {
            format!("*{}", name)
        } else {
            name
        }
    }

    /// Name of the bound resource
    pub fn name(&self) -> String {
        self.document
            .resource()
            .map(ScanResource::display_name)
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn undo_log(&self) -> &UndoLog {
        self.document.undo_log()
    }

    /// Operation currently in flight
    pub fn in_flight(&self) -> Option<Operation> {
        self.pending.as_ref().map(|pending| pending.operation)
    }

    pub fn job(&self) -> Option<JobInfo> {
        self.pending.as_ref().map(|pending| pending.job.info())
    }

    pub fn on_dirty_changed(&mut self, listener: impl FnMut(bool) + 'static) {
        self.document.on_dirty_changed(listener);
    }

    pub fn on_history_changed(
        &mut self,
        listener: impl FnMut(Option<&str>, Option<&str>) + 'static,
    ) {
        self.document.on_history_changed(listener);
    }

    pub fn subscribe(&mut self, listener: impl FnMut(SequenceChange<'_>) + 'static) -> ListenerId {
        self.document.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.document.unsubscribe(id)
    }

    /// Called for every completion applied by `process_completions`
    pub fn on_completion(&mut self, listener: impl FnMut(&Completion) + 'static) {
        self.completion_listeners.push(Box::new(listener));
    }

    // Editing

    /// Replace the command sequence as one undoable edit
    ///
    /// Allowed while saving or submitting; the edit is simply not part of the
    /// saved snapshot. Rejected while a load would overwrite it.
    pub fn edit(
        &mut self,
        commands: Vec<ScanCommand>,
        description: impl Into<String>,
    ) -> DocumentResult<()> {
        self.ensure_editable()?;
        self.document.edit(commands, description);
        Ok(())
    }

    pub fn undo(&mut self) -> DocumentResult<Option<String>> {
        self.ensure_editable()?;
        Ok(self.document.undo())
    }

    pub fn redo(&mut self) -> DocumentResult<Option<String>> {
        self.ensure_editable()?;
        Ok(self.document.redo())
    }

    // Background operations

    /// Load a `.scn` file in the background
    ///
    /// The document is bound to the file right away so that a second open of
    /// the same file finds it.
    pub fn open_from_file(&mut self, path: impl AsRef<Path>) -> DocumentResult<()> {
        let path = normalize_path(path.as_ref());
        let resource = ScanResource::File(path.clone());
        self.begin_load(resource, "Load Scan", move |monitor| {
            monitor.begin_task(format!("Reading {}", path.display()));
            let file = File::open(&path)?;
            let commands = xml::decode(BufReader::new(file))?;
            Ok(WorkResult::Loaded(commands))
        })
    }

    /// Fetch the commands of a submitted scan in the background
    pub fn open_from_remote(&mut self, id: ScanId) -> DocumentResult<()> {
        let service = self.session.service.clone();
        self.begin_load(ScanResource::Remote(id), "Read Scan", move |monitor| {
            monitor.begin_task(format!("Fetching scan {}", id));
            Ok(WorkResult::Loaded(service.fetch(id)?))
        })
    }

    /// Open whatever `resource` names
    pub fn open(&mut self, resource: ScanResource) -> DocumentResult<()> {
        match resource {
            ScanResource::File(path) => self.open_from_file(path),
            ScanResource::Remote(id) => self.open_from_remote(id),
        }
    }

    /// Write the current commands back to the bound resource
    ///
    /// A file is replaced atomically. A remote scan cannot be changed in
    /// place, so the commands are submitted as a new scan and the document is
    /// rebound to its id.
    pub fn save(&mut self) -> DocumentResult<()> {
        self.ensure_idle()?;
        let resource = self
            .document
            .resource()
            .cloned()
            .ok_or(DocumentError::NoDestination)?;
        self.begin_save(resource, None)
    }

    /// Bind the document to `path` and save there
    ///
    /// The previous binding is kept if the save fails.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> DocumentResult<()> {
        self.ensure_idle()?;
        let resource = ScanResource::File(normalize_path(path.as_ref()));
        let claimed = self.claim(&resource)?;
        self.begin_save(resource, claimed)
    }

    /// Submit the current commands for execution under `name`
    ///
    /// The new id arrives with the completion; binding and dirty flag are
    /// left alone.
    pub fn submit(&mut self, name: &str) -> DocumentResult<()> {
        self.ensure_idle()?;
        let snapshot = self.document.commands().to_vec();
        let service = self.session.service.clone();
        let name = name.to_string();
        let job_name = format!("Submit '{}'", name);
        self.start(
            Operation::Submit,
            DocumentState::Submitting,
            None,
            &job_name,
            move |monitor| {
                monitor.begin_task(format!("Submitting {} commands", snapshot.len()));
                Ok(WorkResult::Submitted(service.submit(&name, &snapshot)?))
            },
        )
    }

    /// Query the execution status of the bound remote scan
    pub fn query_status(&mut self) -> DocumentResult<()> {
        self.ensure_idle()?;
        let id = self
            .document
            .resource()
            .and_then(ScanResource::as_remote)
            .ok_or(DocumentError::NoDestination)?;
        let service = self.session.service.clone();
        self.start(
            Operation::Query,
            DocumentState::Fetching,
            None,
            "Scan Status",
            move |monitor| {
                monitor.begin_task(format!("Querying scan {}", id));
                Ok(WorkResult::Status(service.query_status(id)?))
            },
        )
    }

    /// Apply finished background work
    ///
    /// Must be called on the thread that owns the controller. Each applied
    /// operation yields one [`Completion`]; results of cancelled work are
    /// dropped silently.
    pub fn process_completions(&mut self) -> Vec<Completion> {
        // Observed before draining so a result pushed just before the job
        // finished is not mistaken for a missing one
        let finished = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.job.is_finished());

        let mut completions = Vec::new();
        while let Some(outcome) = self.consumer.try_pop() {
            let ticket = outcome.ticket;
            match self.pending.take_if(|pending| pending.ticket == ticket) {
                Some(pending) => completions.push(self.apply(pending, outcome.result)),
                None => tracing::debug!(document = %self.id, ticket, "Dropping stale result"),
            }
        }

        if finished && let Some(pending) = self.pending.take() {
            if pending.job.is_canceled() {
                // Cancelled from outside, e.g. by Session::shutdown
                self.restore(pending);
            } else {
                let err = std::io::Error::other("Background job ended without a result");
                completions.push(self.apply(pending, Err(DocumentError::IoFailure(err))));
            }
        }

        for completion in &completions {
            self.report(completion);
        }
        completions
    }

    /// Process completions until nothing is in flight or `timeout` passes
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<Completion> {
        let deadline = Instant::now() + timeout;
        let mut completions = self.process_completions();
        while self.pending.is_some() && Instant::now() < deadline {
            std::thread::sleep(IDLE_POLL_INTERVAL);
            completions.extend(self.process_completions());
        }
        completions
    }

    /// Cancel the operation in flight, returns false if there is none
    ///
    /// The document goes back to where it was before the operation started.
    pub fn cancel(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        pending.job.cancel();
        self.restore(pending);
        true
    }

    /// Cancel in-flight work and give up every bound resource
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.cancel();
        self.session.registry.release_all(self.id);
        self.document.set_state(DocumentState::Closed);
        self.closed = true;
        tracing::debug!(document = %self.id, "Document closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // Internals

    fn ensure_open(&self) -> DocumentResult<()> {
        if self.closed {
            return Err(DocumentError::Closed);
        }
        Ok(())
    }

    fn ensure_idle(&self) -> DocumentResult<()> {
        self.ensure_open()?;
        match &self.pending {
            Some(pending) => Err(DocumentError::OperationInProgress(pending.operation)),
            None => Ok(()),
        }
    }

    fn ensure_editable(&self) -> DocumentResult<()> {
        self.ensure_open()?;
        match self.in_flight() {
            Some(Operation::Load) => Err(DocumentError::OperationInProgress(Operation::Load)),
            _ => Ok(()),
        }
    }

    /// Claim `resource` in the session registry
    ///
    /// Returns the resource if this document did not hold it before.
    fn claim(&self, resource: &ScanResource) -> DocumentResult<Option<ScanResource>> {
        if self.session.registry.lookup(resource) == Some(self.id) {
            return Ok(None);
        }
        self.session
            .registry
            .claim(resource, self.id)
            .map_err(|owner| DocumentError::AlreadyOpen(resource.clone(), owner))?;
        Ok(Some(resource.clone()))
    }

    /// Undo the bookkeeping of a cancelled operation
    fn restore(&mut self, pending: PendingOperation) {
        tracing::info!(document = %self.id, operation = %pending.operation, "Operation cancelled");
        self.release_claim(&pending);
        self.document.set_resource(pending.previous_resource);
        self.document.set_state(pending.previous_state);
    }

    fn release_claim(&self, pending: &PendingOperation) {
        if let Some(claimed) = &pending.claimed {
            self.session.registry.release(claimed, self.id);
        }
    }

    fn begin_load<F>(&mut self, resource: ScanResource, job_name: &str, work: F) -> DocumentResult<()>
    where
        F: FnOnce(&JobMonitor) -> DocumentResult<WorkResult> + Send + 'static,
    {
        self.ensure_idle()?;
        let claimed = self.claim(&resource)?;
        tracing::info!(document = %self.id, resource = %resource, "Opening");
        match self.start(
            Operation::Load,
            DocumentState::Loading,
            claimed.clone(),
            job_name,
            work,
        ) {
            Ok(()) => {
                self.document.set_resource(Some(resource));
                Ok(())
            }
            Err(err) => {
                if let Some(claimed) = &claimed {
                    self.session.registry.release(claimed, self.id);
                }
                Err(err)
            }
        }
    }

    fn begin_save(
        &mut self,
        target: ScanResource,
        claimed: Option<ScanResource>,
    ) -> DocumentResult<()> {
        let snapshot = self.document.commands().to_vec();
        let service = self.session.service.clone();
        tracing::info!(document = %self.id, resource = %target, "Saving");
        let started = self.start(
            Operation::Save,
            DocumentState::Saving,
            claimed.clone(),
            "Save Scan",
            move |monitor| match target {
                ScanResource::File(path) => {
                    monitor.begin_task(format!("Writing {}", path.display()));
                    write_file(&path, &snapshot)?;
                    Ok(WorkResult::Saved {
                        resource: ScanResource::File(path),
                        snapshot,
                    })
                }
                remote @ ScanResource::Remote(_) => {
                    monitor.begin_task("Submitting scan");
                    let id = service.submit(&remote.display_name(), &snapshot)?;
                    Ok(WorkResult::Saved {
                        resource: ScanResource::Remote(id),
                        snapshot,
                    })
                }
            },
        );
        if started.is_err()
            && let Some(claimed) = &claimed
        {
            self.session.registry.release(claimed, self.id);
        }
        started
    }

    /// Schedule `work` and record it as the operation in flight
    fn start<F>(
        &mut self,
        operation: Operation,
        state: DocumentState,
        claimed: Option<ScanResource>,
        job_name: &str,
        work: F,
    ) -> DocumentResult<()>
    where
        F: FnOnce(&JobMonitor) -> DocumentResult<WorkResult> + Send + 'static,
    {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let producer = self.producer.clone();
        let document = self.id;

        let job = self.session.jobs.schedule(job_name, move |monitor| {
            let result = work(monitor);
            if monitor.is_canceled() {
                tracing::debug!(%document, ticket, "Result of cancelled job discarded");
                return;
            }
            let pushed = match producer.lock() {
                Ok(mut producer) => producer.try_push(WorkOutcome { ticket, result }).is_ok(),
                Err(_) => false,
            };
            if !pushed {
                tracing::error!(%document, ticket, "Completion queue unavailable");
            }
        })?;

        self.pending = Some(PendingOperation {
            operation,
            ticket,
            job,
            previous_state: self.document.state(),
            previous_resource: self.document.resource().cloned(),
            claimed,
        });
        self.document.set_state(state);
        Ok(())
    }

    fn apply(
        &mut self,
        pending: PendingOperation,
        result: DocumentResult<WorkResult>,
    ) -> Completion {
        let operation = pending.operation;
        let result = match result {
            Ok(WorkResult::Loaded(commands)) => {
                if let Some(previous) = &pending.previous_resource
                    && Some(previous) != self.document.resource()
                {
                    self.session.registry.release(previous, self.id);
                }
                let count = commands.len();
                self.document.load(commands);
                self.document.set_state(DocumentState::Ready);
                Ok(OperationSuccess::Loaded { commands: count })
            }
            Ok(WorkResult::Saved { resource, snapshot }) => {
                if let Some(previous) = &pending.previous_resource
                    && *previous != resource
                {
                    self.session.registry.release(previous, self.id);
                }
                if let Err(owner) = self.session.registry.claim(&resource, self.id) {
                    tracing::warn!(document = %self.id, %resource, %owner, "Saved resource is bound elsewhere");
                }
                self.document.set_resource(Some(resource.clone()));
                self.document.mark_saved(snapshot);
                self.document.set_state(DocumentState::Ready);
                Ok(OperationSuccess::Saved(resource))
            }
            Ok(WorkResult::Submitted(id)) => {
                self.document.set_state(pending.previous_state);
                Ok(OperationSuccess::Submitted(id))
            }
            Ok(WorkResult::Status(info)) => {
                self.document.set_state(pending.previous_state);
                Ok(OperationSuccess::Status(info))
            }
            Err(err) => {
                let state = match operation {
                    Operation::Load => {
                        if let Some(previous) = &pending.previous_resource
                            && Some(previous) != self.document.resource()
                        {
                            self.session.registry.release(previous, self.id);
                        }
                        DocumentState::LoadFailed
                    }
                    Operation::Save => {
                        self.release_claim(&pending);
                        DocumentState::SaveFailed
                    }
                    Operation::Submit | Operation::Query => pending.previous_state,
                };
                self.document.set_state(state);
                Err(err)
            }
        };
        Completion { operation, result }
    }

    /// Log the completion, notify the presentation layer and listeners
    fn report(&mut self, completion: &Completion) {
        let category = match (completion.operation, self.document.resource()) {
            (Operation::Submit | Operation::Query, _) => NotificationCategory::Remote,
            (_, Some(ScanResource::Remote(_))) => NotificationCategory::Remote,
            _ => NotificationCategory::Document,
        };
        let name = self.name();
        let notification = match &completion.result {
            Ok(success) => {
                let message = match success {
                    OperationSuccess::Loaded { commands } => {
                        format!("Loaded {} ({} commands)", name, commands)
                    }
                    OperationSuccess::Saved(resource) => format!("Saved {}", resource),
                    OperationSuccess::Submitted(id) => format!("Submitted scan #{}", id),
                    OperationSuccess::Status(info) => match info.percentage {
                        Some(percentage) => {
                            format!("Scan #{} '{}': {} ({}%)", info.id, info.name, info.state, percentage)
                        }
                        None => format!("Scan #{} '{}': {}", info.id, info.name, info.state),
                    },
                };
                match success {
                    OperationSuccess::Status(info)
                        if matches!(info.state, ScanState::Aborted | ScanState::Failed) =>
                    {
                        tracing::warn!(document = %self.id, scan = %info.id, "{}", message);
                        Notification::warning(category, message)
                    }
                    _ => {
                        tracing::info!(document = %self.id, operation = %completion.operation, "{}", message);
                        Notification::info(category, message)
                    }
                }
            }
            Err(err) => {
                tracing::warn!(document = %self.id, operation = %completion.operation, error = %err, "Operation failed");
                Notification::error(
                    category,
                    format!("Cannot {} {}: {}", completion.operation, name, err),
                )
            }
        };

        if let Some(producer) = &self.session.notifications
            && !publish(producer, notification)
        {
            tracing::warn!(document = %self.id, "Notification queue full");
        }
        for listener in self.completion_listeners.iter_mut() {
            listener(completion);
        }
    }
}

impl Drop for DocumentController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DocumentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentController")
            .field("id", &self.id)
            .field("document", &self.document)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Encode into a sibling temp file, then move it over `path`
fn write_file(path: &Path, commands: &[ScanCommand]) -> DocumentResult<()> {
    let temp = temp_path(path);
    let written = (|| -> DocumentResult<()> {
        let mut sink = BufWriter::new(File::create(&temp)?);
        xml::encode(commands, &mut sink)?;
        sink.flush()?;
        sink.get_ref().sync_all()?;
        Ok(())
    })();
    if let Err(err) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(err);
    }
    std::fs::rename(&temp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp);
    })?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scan".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
