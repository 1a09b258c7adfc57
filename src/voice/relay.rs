//! SignalWire RELAY client
//!
//! Holds one websocket to RELAY. Outgoing commands are correlated with their
//! responses through a pending-request map; `signalwire.event` frames are
//! routed to the per-call session they belong to. Inbound calls are handed
//! out through [`IncomingCalls`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::call::*;
use super::config::VoiceConfig;
use super::protocol::{self, CallRef, CollectResult, ControlKind, Frame, RelayEvent, RpcError};
use super::{Result, VoiceError};

/// Inbound calls buffered before the handler picks them up
const CALL_QUEUE_CAPACITY: usize = 64;

/// How long a record operation may still report its result after hangup
const RECORD_FINALIZE_GRACE: Duration = Duration::from_secs(10);

type PendingResponse = oneshot::Sender<std::result::Result<Value, RpcError>>;

/// Connected RELAY client
pub struct RelayClient {
    shared: Arc<RelayShared>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("active_calls", &self.shared.live_calls())
            .finish()
    }
}

impl RelayClient {
    /// Connect, authenticate and subscribe to the configured contexts.
    pub async fn connect(config: &VoiceConfig) -> Result<(Self, IncomingCalls)> {
        config.validate().map_err(VoiceError::ConfigError)?;
        let url = config.relay_url().map_err(VoiceError::ConfigError)?;

        info!(host = %url, "Connecting to RELAY");
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| VoiceError::WebSocket(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (call_tx, call_rx) = mpsc::channel(CALL_QUEUE_CAPACITY);
        let shared = Arc::new(RelayShared::new(
            out_tx,
            Duration::from_secs(config.request_timeout_secs),
        ));

        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "RELAY write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_shared = shared.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => reader_shared.handle_text(text.as_str(), &call_tx).await,
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "RELAY closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "RELAY read failed");
                        break;
                    }
                }
            }
            reader_shared.shutdown();
        });

        let client = Self {
            shared,
            reader,
            writer,
        };
        client
            .shared
            .execute(
                "signalwire.connect",
                protocol::connect_params(&config.project_id, &config.token),
            )
            .await?;
        client
            .shared
            .execute(
                "signalwire.receive",
                protocol::receive_params(&config.contexts),
            )
            .await?;
        info!(contexts = ?config.contexts, "RELAY session established");

        Ok((client, call_rx))
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
        self.shared.shutdown();
    }
}

/// State shared between the socket tasks and every [`RelayCall`]
struct RelayShared {
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<String, PendingResponse>>,
    sessions: Mutex<HashMap<String, Arc<CallSession>>>,
    request_timeout: Duration,
}

impl RelayShared {
    fn new(outbound: mpsc::UnboundedSender<String>, request_timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            request_timeout,
        }
    }

    /// Send a request and wait for its response
    async fn execute(&self, method: &str, params: Value) -> Result<Value> {
        let request = protocol::RpcRequest::new(method, params);
        let text = serde_json::to_string(&request)?;
        let id = request.id;

        let (responder, receiver) = oneshot::channel();
        self.pending.lock().insert(id.clone(), responder);

        if self.outbound.send(text).is_err() {
            self.pending.lock().remove(&id);
            return Err(VoiceError::Disconnected);
        }
        debug!(%method, request_id = %id, "RELAY request sent");

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(Ok(result))) => {
                protocol::check_result(method, &result)?;
                Ok(result)
            }
            Ok(Ok(Err(error))) => Err(VoiceError::Rejected {
                method: method.to_string(),
                code: error.code.to_string(),
                message: error.message,
            }),
            Ok(Err(_)) => Err(VoiceError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(VoiceError::Timeout(method.to_string()))
            }
        }
    }

    fn send_raw(&self, frame: Value) {
        if self.outbound.send(frame.to_string()).is_err() {
            debug!("Dropping RELAY frame, writer is gone");
        }
    }

    async fn handle_text(self: &Arc<Self>, text: &str, incoming: &CallSender) {
        let frame = match protocol::parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed RELAY frame");
                return;
            }
        };

        match frame {
            Frame::Response { id, outcome } => {
                let responder = self.pending.lock().remove(&id);
                match responder {
                    Some(responder) => {
                        let _ = responder.send(outcome);
                    }
                    None => debug!(request_id = %id, "Response for unknown RELAY request"),
                }
            }
            Frame::Request { id, method, params } => {
                self.send_raw(protocol::ack(&id));
                match method.as_str() {
                    "signalwire.event" => match protocol::parse_event(&params) {
                        Ok(event) => self.dispatch_event(event, incoming).await,
                        Err(e) => warn!(error = %e, "Ignoring undecodable RELAY event"),
                    },
                    "signalwire.ping" => {}
                    "signalwire.disconnect" => info!("RELAY announced a disconnect"),
                    other => debug!(method = other, "Unhandled RELAY request"),
                }
            }
        }
    }

    async fn dispatch_event(self: &Arc<Self>, event: RelayEvent, incoming: &CallSender) {
        match event {
            RelayEvent::CallReceived(desc) => {
                let session = Arc::new(CallSession::new());
                self.sessions
                    .lock()
                    .insert(desc.call_id.clone(), session.clone());

                info!(
                    call_id = %desc.call_id,
                    from = %desc.from,
                    to = %desc.to,
                    context = ?desc.context,
                    "Inbound call received"
                );
                let call_id = desc.call_id.clone();
                let call: Arc<dyn Call> = Arc::new(RelayCall {
                    shared: self.clone(),
                    session,
                    call_id: desc.call_id,
                    node_id: desc.node_id,
                    from: desc.from,
                    to: desc.to,
                });
                if incoming.send(call).await.is_err() {
                    warn!(%call_id, "No call handler is listening, dropping call");
                    self.sessions.lock().remove(&call_id);
                }
            }
            RelayEvent::CallState { call_id, state } => {
                let session = self.session(&call_id);
                if let Some(session) = session {
                    debug!(%call_id, ?state, "Call state changed");
                    session.set_state(state);
                    if state.is_ended() {
                        self.retire_session(call_id);
                    }
                }
            }
            RelayEvent::Other(event_type) => {
                debug!(%event_type, "Ignoring RELAY event");
            }
            event => {
                let session = event.call_id().and_then(|id| self.session(id));
                match session {
                    Some(session) => session.apply(event),
                    None => debug!(?event, "Event for unknown call"),
                }
            }
        }
    }

    fn session(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.lock().get(call_id).cloned()
    }

    /// Ended calls stay routable for a while so trailing control events land.
    fn retire_session(self: &Arc<Self>, call_id: String) {
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(RECORD_FINALIZE_GRACE).await;
            if let Some(shared) = shared.upgrade() {
                shared.sessions.lock().remove(&call_id);
            }
        });
    }

    fn live_calls(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| !s.is_ended())
            .count()
    }

    /// Fail every pending request and end every call.
    fn shutdown(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "Failing pending RELAY requests");
        }
        drop(pending);

        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.set_state(CallState::Ended);
        }
    }
}

/// Per-call event state.
///
/// Final control events are parked here until the operation that issued them
/// picks them up.
struct CallSession {
    state: watch::Sender<CallState>,
    controls: Mutex<HashMap<(ControlKind, String), RelayEvent>>,
    notify: Notify,
}

impl CallSession {
    fn new() -> Self {
        let (state, _) = watch::channel(CallState::Created);
        Self {
            state,
            controls: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    fn set_state(&self, state: CallState) {
        self.state.send_replace(state);
        self.notify.notify_waiters();
    }

    fn is_ended(&self) -> bool {
        self.state.borrow().is_ended()
    }

    fn apply(&self, event: RelayEvent) {
        let key = match event.final_control() {
            Some((kind, control_id)) => (kind, control_id.to_string()),
            None => return,
        };
        self.controls.lock().insert(key, event);
        self.notify.notify_waiters();
    }

    fn take_control(&self, key: &(ControlKind, String)) -> Option<RelayEvent> {
        self.controls.lock().remove(key)
    }

    /// Wait for the final event of a control operation.
    ///
    /// Fails with `CallEnded` once the call is over, unless `end_grace` allows
    /// the result to trail the hangup.
    async fn await_control(
        &self,
        kind: ControlKind,
        control_id: &str,
        end_grace: Option<Duration>,
    ) -> Result<RelayEvent> {
        let key = (kind, control_id.to_string());
        let mut grace_deadline: Option<Instant> = None;
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.take_control(&key) {
                return Ok(event);
            }
            if self.is_ended() {
                let grace = end_grace.ok_or_else(|| VoiceError::CallEnded(control_id.to_string()))?;
                let deadline = *grace_deadline.get_or_insert_with(|| Instant::now() + grace);
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return self
                        .take_control(&key)
                        .ok_or_else(|| VoiceError::CallEnded(control_id.to_string()));
                }
                continue;
            }
            notified.await;
        }
    }

    async fn wait_for(&self, condition: CallCondition) -> Result<()> {
        let mut state = self.state.subscribe();
        state
            .wait_for(|s| condition.is_satisfied_by(*s))
            .await
            .map(|_| ())
            .map_err(|_| VoiceError::Disconnected)
    }
}

/// A call delivered by [`RelayClient`]
pub struct RelayCall {
    shared: Arc<RelayShared>,
    session: Arc<CallSession>,
    call_id: String,
    node_id: String,
    from: String,
    to: String,
}

impl std::fmt::Debug for RelayCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCall")
            .field("call_id", &self.call_id)
            .field("node_id", &self.node_id)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl RelayCall {
    fn call_ref(&self) -> CallRef<'_> {
        CallRef {
            node_id: &self.node_id,
            call_id: &self.call_id,
        }
    }
}

fn new_control_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Call for RelayCall {
    fn id(&self) -> &str {
        &self.call_id
    }

    fn from(&self) -> &str {
        &self.from
    }

    fn to(&self) -> &str {
        &self.to
    }

    async fn answer(&self) -> Result<()> {
        self.shared
            .execute("calling.answer", self.call_ref().answer())
            .await?;
        Ok(())
    }

    async fn play_tts(&self, text: &str) -> Result<Playback> {
        let control_id = new_control_id();
        self.shared
            .execute("calling.play", self.call_ref().play_tts(&control_id, text))
            .await?;
        Ok(Playback { control_id })
    }

    async fn wait_for_playback(&self, playback: &Playback) -> Result<()> {
        match self
            .session
            .await_control(ControlKind::Play, &playback.control_id, None)
            .await?
        {
            RelayEvent::Play {
                state: protocol::PlayState::Error,
                ..
            } => Err(VoiceError::Playback(playback.control_id.clone())),
            _ => Ok(()),
        }
    }

    async fn prompt_tts(&self, text: &str, options: &PromptOptions) -> Result<PromptResult> {
        let control_id = new_control_id();
        self.shared
            .execute(
                "calling.play_and_collect",
                self.call_ref().prompt_tts(&control_id, text, options),
            )
            .await?;

        let event = self
            .session
            .await_control(ControlKind::Collect, &control_id, None)
            .await?;
        let result = match event {
            RelayEvent::Collect { result, .. } => result,
            other => return Err(VoiceError::Collect(format!("unexpected event {:?}", other))),
        };

        match result {
            CollectResult::Digits { digits, terminator } => Ok(PromptResult {
                digits: Some(digits).filter(|d| !d.is_empty()),
                terminator,
            }),
            CollectResult::NoInput | CollectResult::NoMatch | CollectResult::Speech(_) => {
                Ok(PromptResult::no_input())
            }
            CollectResult::Error => Err(VoiceError::Collect(control_id)),
            CollectResult::StartOfInput | CollectResult::Unknown(_) => Err(VoiceError::Collect(
                format!("unexpected collect result for {}", control_id),
            )),
        }
    }

    async fn record_audio(&self, options: &RecordOptions) -> Result<Recording> {
        let control_id = new_control_id();
        self.shared
            .execute(
                "calling.record",
                self.call_ref().record_audio(&control_id, options),
            )
            .await?;

        let event = self
            .session
            .await_control(ControlKind::Record, &control_id, Some(RECORD_FINALIZE_GRACE))
            .await?;
        match event {
            RelayEvent::Record {
                url: Some(url),
                duration,
                size,
                ..
            } => Ok(Recording {
                id: control_id,
                url,
                duration,
                size,
            }),
            RelayEvent::Record { state, .. } => Err(VoiceError::Recording(format!(
                "{} ended in state {:?} without a URL",
                control_id, state
            ))),
            other => Err(VoiceError::Recording(format!("unexpected event {:?}", other))),
        }
    }

    async fn hangup(&self) -> Result<()> {
        self.shared
            .execute("calling.end", self.call_ref().end())
            .await?;
        Ok(())
    }

    async fn wait_for(&self, condition: CallCondition) -> Result<()> {
        self.session.wait_for(condition).await
    }
}
