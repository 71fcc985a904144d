//! Debounced impact estimation
//!
//! Every tree change schedules a request. Requests arriving within the
//! debounce window coalesce into one; a newer request always supersedes an
//! older one, whose result is discarded even if it arrives later. The
//! estimator is advisory: failures and timeouts become a status, never an
//! error for the caller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::application::hash::logic_fingerprint;
use crate::application::services::editor::EditorEvent;
use crate::config::EstimatorConfig;
use crate::infrastructure::traits::{ImpactEstimate, ImpactEstimator, ImpactRequest};

/// Where the impact preview stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
    Unavailable,
}

impl fmt::Display for ImpactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactStatus::Idle => "idle",
            ImpactStatus::Loading => "loading",
            ImpactStatus::Success => "success",
            ImpactStatus::Error => "error",
            ImpactStatus::Unavailable => "unavailable",
        };
        write!(f, "{s}")
    }
}

/// Snapshot published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImpactState {
    pub status: ImpactStatus,
    pub estimate: Option<ImpactEstimate>,
    pub message: Option<String>,
    /// Request this state belongs to
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    pub debounce: Duration,
    pub timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&EstimatorConfig> for GatewayOptions {
    fn from(config: &EstimatorConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// State shared between the gateway and its in-flight task.
struct Shared {
    state: watch::Sender<ImpactState>,
    latest: AtomicU64,
    /// Last successful estimate, keyed by fingerprint
    cached: Mutex<Option<(String, ImpactEstimate)>>,
}

impl Shared {
    /// Publish unless a newer request has been scheduled since.
    fn publish(
        &self,
        generation: u64,
        status: ImpactStatus,
        estimate: Option<ImpactEstimate>,
        message: Option<String>,
    ) -> bool {
        self.state.send_if_modified(|state| {
            if generation != self.latest.load(Ordering::SeqCst) || generation < state.generation {
                debug!(generation, "discarding superseded impact result");
                return false;
            }
            *state = ImpactState {
                status,
                estimate,
                message,
                generation,
            };
            true
        })
    }

    fn cached_for(&self, fingerprint: &str) -> Option<ImpactEstimate> {
        let cached = self.cached.lock().ok()?;
        cached
            .as_ref()
            .filter(|(fp, _)| fp == fingerprint)
            .map(|(_, estimate)| estimate.clone())
    }

    fn remember(&self, fingerprint: String, estimate: ImpactEstimate) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((fingerprint, estimate));
        }
    }
}

/// Debounced, cancel-on-supersede front of an [`ImpactEstimator`].
pub struct ImpactGateway {
    estimator: Option<Arc<dyn ImpactEstimator>>,
    options: GatewayOptions,
    events: mpsc::UnboundedSender<EditorEvent>,
    shared: Arc<Shared>,
    pending: Option<JoinHandle<()>>,
}

impl ImpactGateway {
    pub fn new(
        estimator: Option<Arc<dyn ImpactEstimator>>,
        options: GatewayOptions,
        events: mpsc::UnboundedSender<EditorEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ImpactState::default());
        Self {
            estimator,
            options,
            events,
            shared: Arc::new(Shared {
                state,
                latest: AtomicU64::new(0),
                cached: Mutex::new(None),
            }),
            pending: None,
        }
    }

    /// Observe status changes.
    pub fn subscribe(&self) -> watch::Receiver<ImpactState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> ImpactState {
        self.shared.state.borrow().clone()
    }

    pub fn options(&self) -> GatewayOptions {
        self.options
    }

    /// Schedule an estimate of `logic`, superseding any pending one.
    ///
    /// Returns the request's generation.
    #[instrument(level = "debug", skip(self, logic))]
    pub fn schedule(&mut self, logic: Value, scope_id: &str) -> u64 {
        let generation = self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }

        let Ok(runtime) = Handle::try_current() else {
            debug!("no async runtime, impact preview unavailable");
            self.shared.publish(
                generation,
                ImpactStatus::Unavailable,
                None,
                Some("no async runtime".to_string()),
            );
            return generation;
        };

        let request = ImpactRequest {
            fingerprint: logic_fingerprint(&logic, scope_id),
            logic,
            scope_id: scope_id.to_string(),
        };
        let task = RequestTask {
            generation,
            request,
            estimator: self.estimator.clone(),
            options: self.options,
            events: self.events.clone(),
            shared: Arc::clone(&self.shared),
        };
        self.pending = Some(runtime.spawn(task.run()));
        generation
    }

    /// Drop whatever is pending without publishing anything.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for ImpactGateway {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One scheduled request: wait out the debounce window, then estimate.
struct RequestTask {
    generation: u64,
    request: ImpactRequest,
    estimator: Option<Arc<dyn ImpactEstimator>>,
    options: GatewayOptions,
    events: mpsc::UnboundedSender<EditorEvent>,
    shared: Arc<Shared>,
}

impl RequestTask {
    async fn run(self) {
        tokio::time::sleep(self.options.debounce).await;
        if self.generation != self.shared.latest.load(Ordering::SeqCst) {
            return;
        }

        if self
            .events
            .send(EditorEvent::ImpactRequested(self.request.clone()))
            .is_err()
        {
            debug!("event receiver dropped");
        }

        let Some(estimator) = self.estimator else {
            self.shared.publish(
                self.generation,
                ImpactStatus::Unavailable,
                None,
                Some("no impact estimator configured".to_string()),
            );
            return;
        };

        if let Some(estimate) = self.shared.cached_for(&self.request.fingerprint) {
            debug!(fingerprint = %self.request.fingerprint, "logic unchanged, reusing estimate");
            self.shared
                .publish(self.generation, ImpactStatus::Success, Some(estimate), None);
            return;
        }

        self.shared
            .publish(self.generation, ImpactStatus::Loading, None, None);

        match tokio::time::timeout(self.options.timeout, estimator.estimate(&self.request)).await {
            Ok(Ok(estimate)) => {
                debug!(generation = self.generation, matched = estimate.matched, "impact estimated");
                if self.shared.publish(
                    self.generation,
                    ImpactStatus::Success,
                    Some(estimate.clone()),
                    None,
                ) {
                    self.shared.remember(self.request.fingerprint, estimate);
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "impact estimate failed");
                self.shared.publish(
                    self.generation,
                    ImpactStatus::Error,
                    None,
                    Some(e.to_string()),
                );
            }
            Err(_) => {
                warn!(timeout = ?self.options.timeout, "impact estimate timed out");
                self.shared.publish(
                    self.generation,
                    ImpactStatus::Error,
                    None,
                    Some(format!("timed out after {:?}", self.options.timeout)),
                );
            }
        }
    }
}
