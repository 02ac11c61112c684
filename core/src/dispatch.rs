//! Spawning requests and collecting their completions.

use std::fmt;
use std::future::Future;

use branches_client::ApiClient;
use branches_types::Credential;
use tokio::sync::mpsc;

use crate::event::{Completion, SyncEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session counter. Bumped whenever the credential in use changes hands, so a
/// completion from an earlier session can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Runs each request on its own task and funnels results into one channel.
///
/// Requests are never aborted. A superseded one still completes and is
/// counted; `apply` decides whether its result matters.
pub(crate) struct Dispatcher {
    api: ApiClient,
    tx: mpsc::Sender<SyncEvent>,
    rx: mpsc::Receiver<SyncEvent>,
    generation: Generation,
    in_flight: usize,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("api", &self.api)
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(api: ApiClient) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            tx,
            rx,
            generation: Generation::default(),
            in_flight: 0,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    pub(crate) fn set_credential(&mut self, credential: Credential) {
        self.api.set_credential(credential);
    }

    pub(crate) fn clear_credential(&mut self) {
        self.api.clear_credential();
    }

    pub(crate) fn advance_generation(&mut self) {
        self.generation = Generation(self.generation.0.saturating_add(1));
        tracing::debug!(generation = %self.generation, "Session generation advanced");
    }

    /// Spawn a request against a snapshot of the client.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F, Fut>(&mut self, request: F)
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let task = request(self.api.clone());
        let tx = self.tx.clone();
        let generation = self.generation;
        self.in_flight += 1;

        tokio::spawn(async move {
            let completion = task.await;
            let operation = completion.operation();
            if tx
                .send(SyncEvent {
                    generation,
                    completion,
                })
                .await
                .is_err()
            {
                tracing::debug!(%operation, "Completion dropped; controller is gone");
            }
        });
    }

    /// Next completion, or `None` when nothing is outstanding.
    pub(crate) async fn recv(&mut self) -> Option<SyncEvent> {
        if self.in_flight == 0 {
            return None;
        }
        let event = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(event)
    }
}
