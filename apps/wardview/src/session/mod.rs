use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::api::{
    ApiClient, ApiError, DocumentRequestDraft, ExamDraft, IvDraft, MealRequestDraft, Snapshot,
    VitalDraft,
};
use crate::config::{Config, ConfigError};
use crate::model::{DocumentRequest, ExamSchedule, IvRecord, MealRequest, Scope, ViewModel, Vital};
use crate::protocol::{ExamEvent, IvEvent, MealEvent, PushEvent, VitalEvent};
use crate::sync::fetch::{FetchTicket, SnapshotFetcher};
use crate::sync::optimistic::{OptimisticManager, Undo};
use crate::sync::reduce::{Outcome, Reducer, ViewState};
use crate::transport::{ChannelConfig, ChannelEvent, PushChannel};

/// Window in which refetch-class push events collapse into one snapshot
/// request.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    TornDown,
}

/// A locally initiated write, applied optimistically on admission scopes
/// before the request goes out.
#[derive(Debug, Clone)]
pub enum Mutation {
    CreateVital(VitalDraft),
    CreateIv(IvDraft),
    UpsertMeal(MealRequestDraft),
    CreateExam(ExamDraft),
    DeleteExam(i64),
    CreateDocumentRequest(DocumentRequestDraft),
    PatchDocument { id: i64, status: String },
}

pub type DischargeHook = Box<dyn FnOnce() + Send>;

enum Command {
    Refetch { force: bool },
    Mutate {
        mutation: Mutation,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop,
}

/// Authoritative entity returned by a successful write.
enum WriteOk {
    Vital(Vital),
    Iv(IvRecord),
    Meal(MealRequest),
    Exam(ExamSchedule),
    ExamDeleted,
    DocumentCreated(DocumentRequest),
    DocumentPatched { id: i64 },
}

/// Results of spawned I/O, funneled back into the actor's inbox so the view
/// model is only ever touched from one task.
enum Completion {
    Fetch {
        ticket: FetchTicket,
        result: Result<Snapshot, ApiError>,
    },
    Write {
        undo: Option<Undo>,
        result: Result<WriteOk, ApiError>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Caller-facing handle to a running session. Dropping the handle tears the
/// session down.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ViewModel>,
    connected: watch::Receiver<bool>,
    refreshing: watch::Receiver<bool>,
}

impl SessionHandle {
    pub fn view(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn refreshing(&self) -> watch::Receiver<bool> {
        self.refreshing.clone()
    }

    pub async fn refetch(&self, force: bool) -> Result<(), SessionError> {
        self.commands
            .send(Command::Refetch { force })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Apply a write. On admission scopes the view reflects it immediately;
    /// the result resolves once the server confirms or rejects it, rolling
    /// the optimistic entry back on rejection.
    pub async fn mutate(&self, mutation: Mutation) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Mutate {
                mutation,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }
}

pub struct Session;

impl Session {
    /// Open a scope session: connect its push channel, fetch the first
    /// snapshot, and keep the view model converged until stopped or
    /// invalidated.
    pub fn spawn(
        scope: Scope,
        config: &Config,
        on_discharge: Option<DischargeHook>,
    ) -> Result<SessionHandle, SessionError> {
        let api = ApiClient::new(config)?;
        let url = config.channel_url(scope.channel_name())?;
        let (channel, events) = PushChannel::connect(url, ChannelConfig::default());
        Ok(spawn_actor(scope, api, Some(channel), events, on_discharge))
    }

    #[cfg(test)]
    pub(crate) fn spawn_with(
        scope: Scope,
        api: ApiClient,
        events: mpsc::Receiver<ChannelEvent>,
        on_discharge: Option<DischargeHook>,
    ) -> SessionHandle {
        spawn_actor(scope, api, None, events, on_discharge)
    }
}

fn spawn_actor(
    scope: Scope,
    api: ApiClient,
    channel: Option<PushChannel>,
    events: mpsc::Receiver<ChannelEvent>,
    on_discharge: Option<DischargeHook>,
) -> SessionHandle {
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let (completions_tx, completions_rx) = mpsc::channel(32);
    let (view_tx, view_rx) = watch::channel(ViewModel::empty_for(&scope));
    let (connected_tx, connected_rx) = watch::channel(false);
    let (refreshing_tx, refreshing_rx) = watch::channel(false);

    let reducer = Reducer::new(scope.clone());
    let actor = SessionActor {
        scope,
        api,
        channel,
        state: SessionState::Idle,
        first_load_done: false,
        channel_gone: false,
        inflight_fetches: 0,
        debounce_deadline: None,
        fetcher: SnapshotFetcher::new(),
        reducer,
        optimistic: OptimisticManager::new(),
        commands: commands_rx,
        events,
        completions: completions_rx,
        completions_tx,
        view_tx,
        connected_tx,
        refreshing_tx,
        on_discharge,
    };
    tokio::spawn(actor.run());

    SessionHandle {
        commands: commands_tx,
        view: view_rx,
        connected: connected_rx,
        refreshing: refreshing_rx,
    }
}

struct SessionActor {
    scope: Scope,
    api: ApiClient,
    channel: Option<PushChannel>,
    state: SessionState,
    first_load_done: bool,
    channel_gone: bool,
    inflight_fetches: u32,
    debounce_deadline: Option<Instant>,
    fetcher: SnapshotFetcher,
    reducer: Reducer,
    optimistic: OptimisticManager,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Receiver<ChannelEvent>,
    completions: mpsc::Receiver<Completion>,
    completions_tx: mpsc::Sender<Completion>,
    view_tx: watch::Sender<ViewModel>,
    connected_tx: watch::Sender<bool>,
    refreshing_tx: watch::Sender<bool>,
    on_discharge: Option<DischargeHook>,
}

impl SessionActor {
    async fn run(mut self) {
        self.state = SessionState::Connecting;
        self.trigger_fetch(false);

        loop {
            // select! evaluates every branch expression, so the disabled
            // debounce branch still needs a live Instant.
            let debounce_at = self
                .debounce_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.teardown(),
                },
                event = self.events.recv(), if !self.channel_gone => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => self.channel_gone = true,
                },
                completion = self.completions.recv() => {
                    if let Some(completion) = completion {
                        self.handle_completion(completion);
                    }
                }
                _ = tokio::time::sleep_until(debounce_at), if self.debounce_deadline.is_some() => {
                    self.debounce_deadline = None;
                    if self.fetch_issued(false).is_none() {
                        // Throttled; try again once the window clears.
                        self.debounce_deadline = Some(Instant::now() + DEBOUNCE_WINDOW);
                    }
                }
            }
            if self.state == SessionState::TornDown {
                break;
            }
        }
    }

    fn publish_view(&mut self) {
        let view = self.reducer.view().clone();
        self.view_tx.send_replace(view);
    }

    fn trigger_fetch(&mut self, force: bool) {
        self.fetch_issued(force);
    }

    fn fetch_issued(&mut self, force: bool) -> Option<FetchTicket> {
        if self.state == SessionState::TornDown {
            return None;
        }
        let ticket = self.fetcher.begin(force)?;
        self.inflight_fetches += 1;
        self.refreshing_tx.send_replace(true);
        let api = self.api.clone();
        let scope = self.scope.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_snapshot(&scope, ticket.bust).await;
            let _ = completions.send(Completion::Fetch { ticket, result }).await;
        });
        Some(ticket)
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refetch { force } => self.trigger_fetch(force),
            Command::Stop => self.teardown(),
            Command::Mutate { mutation, reply } => self.start_mutation(mutation, reply),
        }
    }

    /// Optimistically apply the write on admission scopes, then hand the
    /// request to a spawned task; the outcome comes back as a completion.
    fn start_mutation(
        &mut self,
        mutation: Mutation,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) {
        if self.state == SessionState::TornDown {
            let _ = reply.send(Err(SessionError::Closed));
            return;
        }
        let undo = self.apply_optimistic(&mutation);
        if undo.is_some() {
            self.publish_view();
        }

        let backend = self.api.backend().clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = match mutation {
                Mutation::CreateVital(draft) => {
                    backend.create_vital(&draft).await.map(WriteOk::Vital)
                }
                Mutation::CreateIv(draft) => backend.create_iv_record(&draft).await.map(WriteOk::Iv),
                Mutation::UpsertMeal(draft) => {
                    backend.upsert_meal_request(&draft).await.map(WriteOk::Meal)
                }
                Mutation::CreateExam(draft) => {
                    backend.create_exam_schedule(&draft).await.map(WriteOk::Exam)
                }
                Mutation::DeleteExam(id) => backend
                    .delete_exam_schedule(id)
                    .await
                    .map(|()| WriteOk::ExamDeleted),
                Mutation::CreateDocumentRequest(draft) => backend
                    .create_document_request(&draft)
                    .await
                    .map(WriteOk::DocumentCreated),
                Mutation::PatchDocument { id, status } => backend
                    .patch_document_request(id, &status)
                    .await
                    .map(|()| WriteOk::DocumentPatched { id }),
            };
            let _ = completions
                .send(Completion::Write {
                    undo,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn apply_optimistic(&mut self, mutation: &Mutation) -> Option<Undo> {
        let ViewModel::Admission(view) = self.reducer.view_mut() else {
            // Station writes update through the broadcast round-trip.
            return None;
        };
        match mutation {
            Mutation::CreateVital(draft) => Some(self.optimistic.create_vital(view, draft)),
            Mutation::CreateIv(draft) => Some(self.optimistic.create_iv(view, draft)),
            Mutation::UpsertMeal(draft) => Some(self.optimistic.upsert_meal(view, draft)),
            Mutation::CreateExam(draft) => Some(self.optimistic.create_exam(view, draft)),
            Mutation::DeleteExam(id) => self.optimistic.delete_exam(view, *id),
            Mutation::PatchDocument { id, status } => {
                self.optimistic.patch_document(view, *id, status)
            }
            // Document creation settles from the write response instead.
            Mutation::CreateDocumentRequest(_) => None,
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                self.connected_tx.send_replace(true);
                // The mount-time fetch covers the very first open.
                if self.first_load_done {
                    self.trigger_fetch(false);
                }
            }
            ChannelEvent::Closed => {
                self.connected_tx.send_replace(false);
            }
            ChannelEvent::Message(raw) => match PushEvent::decode(&raw) {
                Ok(event) => self.handle_push(event),
                Err(err) => {
                    tracing::warn!(
                        target = "wardview::session",
                        scope = self.scope.channel_name(),
                        error = %err,
                        "dropping malformed push payload"
                    );
                }
            },
        }
    }

    fn handle_push(&mut self, event: PushEvent) {
        match self.reducer.apply_push(&event) {
            Outcome::Applied => self.publish_view(),
            Outcome::Ignored => {}
            Outcome::RefetchDebounced => {
                self.debounce_deadline = Some(Instant::now() + DEBOUNCE_WINDOW);
            }
            Outcome::RefetchNow => self.trigger_fetch(true),
            Outcome::Discharged => {
                tracing::info!(
                    target = "wardview::session",
                    scope = self.scope.channel_name(),
                    "admission discharged"
                );
                self.publish_view();
                self.fire_discharge();
                self.teardown();
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch { ticket, result } => self.finish_fetch(ticket, result),
            Completion::Write {
                undo,
                result,
                reply,
            } => self.finish_write(undo, result, reply),
        }
    }

    fn finish_fetch(&mut self, ticket: FetchTicket, result: Result<Snapshot, ApiError>) {
        self.inflight_fetches = self.inflight_fetches.saturating_sub(1);
        if self.inflight_fetches == 0 {
            self.refreshing_tx.send_replace(false);
        }
        if self.state == SessionState::TornDown {
            return;
        }
        if !self.fetcher.accept(ticket) {
            tracing::debug!(
                target = "wardview::session",
                scope = self.scope.channel_name(),
                seq = ticket.seq,
                "dropping superseded snapshot"
            );
            return;
        }
        match result {
            Ok(snapshot) => {
                self.reducer.apply_snapshot(snapshot);
                self.first_load_done = true;
                if self.state == SessionState::Connecting {
                    self.state = SessionState::Active;
                }
                self.publish_view();
            }
            Err(err) if err.is_terminal() => {
                tracing::warn!(
                    target = "wardview::session",
                    scope = self.scope.channel_name(),
                    error = %err,
                    "scope invalidated"
                );
                self.reducer.invalidate();
                // An invalid token on an admission scope is indistinguishable
                // from a discharge that happened while we were away.
                if self.scope.admission_token().is_some() {
                    self.fire_discharge();
                }
                self.teardown();
            }
            Err(err) => {
                // Transient; the next scheduled fetch recovers.
                tracing::warn!(
                    target = "wardview::session",
                    scope = self.scope.channel_name(),
                    error = %err,
                    "snapshot fetch failed"
                );
            }
        }
    }

    fn finish_write(
        &mut self,
        undo: Option<Undo>,
        result: Result<WriteOk, ApiError>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) {
        match result {
            Ok(confirmed) => {
                self.settle_write(confirmed);
                self.publish_view();
                let _ = reply.send(Ok(()));
            }
            Err(err) => {
                if let Some(undo) = undo {
                    if let ViewModel::Admission(view) = self.reducer.view_mut() {
                        self.optimistic.rollback(view, undo);
                    }
                    self.publish_view();
                }
                let _ = reply.send(Err(err.into()));
            }
        }
    }

    /// Feed the confirmed entity through the same merge path a broadcast
    /// takes, reconciling the optimistic entry.
    fn settle_write(&mut self, confirmed: WriteOk) {
        match confirmed {
            WriteOk::Vital(vital) => {
                self.reducer.apply_push(&PushEvent::NewVital(VitalEvent {
                    vital,
                    room: None,
                }));
            }
            WriteOk::Iv(record) => {
                self.reducer.apply_push(&PushEvent::NewIv(IvEvent {
                    record,
                    room: None,
                }));
            }
            WriteOk::Meal(request) => {
                self.reducer
                    .apply_push(&PushEvent::NewMealRequest(MealEvent {
                        request,
                        room: None,
                    }));
            }
            WriteOk::Exam(schedule) => {
                self.reducer
                    .apply_push(&PushEvent::NewExamSchedule(ExamEvent {
                        schedule,
                        room: None,
                    }));
            }
            WriteOk::ExamDeleted => {}
            // Document broadcasts reach only the station channel; the
            // creating scope must apply the confirmed row itself.
            WriteOk::DocumentCreated(request) => {
                if let ViewModel::Admission(view) = self.reducer.view_mut() {
                    match view
                        .document_requests
                        .iter_mut()
                        .find(|existing| existing.id.is_some() && existing.id == request.id)
                    {
                        Some(existing) => *existing = request,
                        None => {
                            view.document_requests.push(request);
                            view.sort_document_requests();
                        }
                    }
                }
            }
            WriteOk::DocumentPatched { id } => {
                if let ViewModel::Admission(view) = self.reducer.view_mut() {
                    if let Some(request) = view
                        .document_requests
                        .iter_mut()
                        .find(|request| request.id == Some(id))
                    {
                        request.is_optimistic = false;
                    }
                }
            }
        }
    }

    fn fire_discharge(&mut self) {
        match self.on_discharge.take() {
            Some(hook) => hook(),
            None => {
                tracing::warn!(
                    target = "wardview::session",
                    scope = self.scope.channel_name(),
                    "no discharge hook installed; tearing down"
                );
            }
        }
    }

    fn teardown(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        self.state = SessionState::TornDown;
        self.debounce_deadline = None;
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.connected_tx.send_replace(false);
        if self.reducer.state() == ViewState::Invalidated {
            tracing::debug!(
                target = "wardview::session",
                scope = self.scope.channel_name(),
                "session torn down with invalidated scope"
            );
        }
    }
}
