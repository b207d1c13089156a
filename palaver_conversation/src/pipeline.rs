//! One inference call per user turn.
//!
//! A turn moves through `Rendering -> Dispatched -> Streaming -> Committing`
//! and back to idle, or from `Rendering`/`Streaming` to `Failed`. The
//! inference engine is shared and non-reentrant, so dispatch goes through a
//! single-permit [`AdmissionGate`]; the permit travels with the producer task
//! and is released only once the engine's stream has been dropped.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use palaver_core::{
    ChatError, ChatMessage, ConversationId, FragmentStream, GenerationRequest, InferenceEngine,
    Result, Template, render,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::manager::{SessionManager, lock};
use crate::session::ConversationSession;

/// Fragments buffered between producer and consumer.
const FRAGMENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Rendering,
    Dispatched,
    Streaming,
    Committing,
    Failed,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Rendering => "rendering",
            Self::Dispatched => "dispatched",
            Self::Streaming => "streaming",
            Self::Committing => "committing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the producer task hands to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    /// End-of-stream sentinel: the engine finished normally.
    End,
    Failed(String),
}

/// Admits at most one generation call against the engine at a time.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
}

impl AdmissionGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait for the engine to be free.
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ChatError::GenerationFailed("admission gate closed".to_string()))
    }

    /// True while a generation call holds the engine.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Resets a session's in-flight flag however the turn ends.
struct InFlight {
    slot: Arc<Mutex<ConversationSession>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.slot).in_flight = false;
    }
}

pub struct GenerationPipeline {
    engine: Arc<dyn InferenceEngine>,
    gate: AdmissionGate,
    timeout: Option<Duration>,
}

impl GenerationPipeline {
    #[must_use]
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        info!("Creating generation pipeline for engine: {}", engine.name());
        Self {
            engine,
            gate: AdmissionGate::new(),
            timeout: None,
        }
    }

    /// Bound the consumption loop; expiry fails the turn.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Run one chat turn for `id`.
    ///
    /// The user turn is committed only if the prompt renders; once committed
    /// it is kept even if generation fails. Every fragment is passed to
    /// `on_fragment` as it arrives. Returns the trimmed reply that was
    /// appended to history.
    pub async fn submit_turn<F>(
        &self,
        sessions: &SessionManager,
        template: &Template,
        id: &ConversationId,
        text: &str,
        mut on_fragment: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        transition(id, GenerationState::Rendering);
        let slot = sessions.slot(id);
        let (request, _in_flight) = {
            let mut session = lock(&slot);
            if session.in_flight {
                return Err(ChatError::Busy(id.clone()));
            }

            let mut next = session.history.clone();
            next.push(ChatMessage::user(text));
            let (view, params) = sessions.read_params(&session, |store| {
                (next.view(store.system_message()), store.snapshot())
            });
            let prompt = render(&view, template, true).inspect_err(|e| {
                warn!("Rendering failed for conversation {id}: {e}");
                transition(id, GenerationState::Failed);
            })?;

            session.history = next;
            session.in_flight = true;
            (
                GenerationRequest { prompt, params },
                InFlight {
                    slot: Arc::clone(&slot),
                },
            )
        };

        if request.params.debug {
            info!(
                "Prompt for conversation {id} ({} template):\n{}",
                template.id, request.prompt
            );
            info!("Generation parameters for {id}: {:?}", request.params);
        }

        let reply = match self.stream(id, request, &mut on_fragment).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Generation failed for conversation {id}: {e}");
                transition(id, GenerationState::Failed);
                return Err(e);
            }
        };

        transition(id, GenerationState::Committing);
        let reply = reply.trim().to_string();
        lock(&slot).add_message(ChatMessage::assistant(reply.clone()));
        transition(id, GenerationState::Idle);
        Ok(reply)
    }

    /// Dispatch `request` once admitted and drain its fragments.
    ///
    /// Returns the untrimmed concatenation of every fragment.
    pub async fn stream<F>(
        &self,
        id: &ConversationId,
        request: GenerationRequest,
        on_fragment: &mut F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        if self.gate.is_occupied() {
            debug!("Conversation {id} waiting for the engine");
        }
        let permit = self.gate.admit().await?;
        transition(id, GenerationState::Dispatched);

        let (tx, mut rx) = mpsc::channel(FRAGMENT_BUFFER);
        let fragments = self.engine.generate(request);
        tokio::spawn(async move {
            produce(fragments, tx).await;
            drop(permit);
        });

        transition(id, GenerationState::Streaming);
        let consume = async {
            let mut reply = String::new();
            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::Fragment(fragment) => {
                        on_fragment(&fragment);
                        reply.push_str(&fragment);
                    }
                    StreamEvent::End => return Ok(reply),
                    StreamEvent::Failed(reason) => return Err(ChatError::GenerationFailed(reason)),
                }
            }
            Err(ChatError::GenerationFailed(
                "engine stopped without finishing the reply".to_string(),
            ))
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, consume).await.map_err(|_| {
                ChatError::GenerationFailed(format!("no complete reply within {limit:?}"))
            })?,
            None => consume.await,
        }
    }
}

/// Forward engine output to the consumer. Consumes the stream so it is
/// dropped before the caller releases its permit.
async fn produce(mut fragments: FragmentStream, tx: mpsc::Sender<StreamEvent>) {
    while let Some(item) = fragments.next().await {
        let (event, last) = match item {
            Ok(fragment) => (StreamEvent::Fragment(fragment), false),
            Err(e) => (StreamEvent::Failed(format!("{e:#}")), true),
        };
        if tx.send(event).await.is_err() || last {
            return;
        }
    }
    // The receiver may already be gone after a timeout.
    let _ = tx.send(StreamEvent::End).await;
}

fn transition(id: &ConversationId, state: GenerationState) {
    debug!("Conversation {id}: {state}");
}
