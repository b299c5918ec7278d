//! Scripted in-process transport for tests.

use super::{ActivateOutcome, LicenseTransport, ValidateOutcome};
use crate::device::DeviceIdentity;
use crate::key::{ApiBase, LicenseKey};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// A call observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Validate {
        api_base: String,
        key: String,
        device: String,
    },
    Activate {
        api_base: String,
        key: String,
        device: String,
        device_name: String,
    },
}

struct Scripted<T> {
    outcome: T,
    gate: Option<oneshot::Receiver<()>>,
}

/// Transport that replays queued outcomes in order.
///
/// An empty queue answers `Unreachable`. Gated outcomes are held until the
/// returned sender fires (or is dropped), which lets tests keep a call in
/// flight while another operation starts.
#[derive(Default)]
pub struct MockTransport {
    validate: Mutex<VecDeque<Scripted<ValidateOutcome>>>,
    activate: Mutex<VecDeque<Scripted<ActivateOutcome>>>,
    calls: Mutex<Vec<TransportCall>>,
}

impl MockTransport {
    /// Creates a transport with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a validation outcome.
    pub fn push_validate(&self, outcome: ValidateOutcome) {
        lock(&self.validate).push_back(Scripted {
            outcome,
            gate: None,
        });
    }

    /// Queues an activation outcome.
    pub fn push_activate(&self, outcome: ActivateOutcome) {
        lock(&self.activate).push_back(Scripted {
            outcome,
            gate: None,
        });
    }

    /// Queues a validation outcome released only when the sender fires.
    pub fn push_validate_gated(&self, outcome: ValidateOutcome) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.validate).push_back(Scripted {
            outcome,
            gate: Some(rx),
        });
        tx
    }

    /// Queues an activation outcome released only when the sender fires.
    pub fn push_activate_gated(&self, outcome: ActivateOutcome) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.activate).push_back(Scripted {
            outcome,
            gate: Some(rx),
        });
        tx
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Number of validate calls received.
    pub fn validate_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, TransportCall::Validate { .. }))
            .count()
    }

    /// Number of activate calls received.
    pub fn activate_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, TransportCall::Activate { .. }))
            .count()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LicenseTransport for MockTransport {
    async fn validate(
        &self,
        api_base: &ApiBase,
        key: &LicenseKey,
        device: &DeviceIdentity,
    ) -> ValidateOutcome {
        lock(&self.calls).push(TransportCall::Validate {
            api_base: api_base.to_string(),
            key: key.to_string(),
            device: device.to_string(),
        });
        let next = lock(&self.validate).pop_front();
        match next {
            Some(Scripted { outcome, gate }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                outcome
            }
            None => ValidateOutcome::Unreachable("no scripted validate response".to_string()),
        }
    }

    async fn activate(
        &self,
        api_base: &ApiBase,
        key: &LicenseKey,
        device: &DeviceIdentity,
        device_name: &str,
    ) -> ActivateOutcome {
        lock(&self.calls).push(TransportCall::Activate {
            api_base: api_base.to_string(),
            key: key.to_string(),
            device: device.to_string(),
            device_name: device_name.to_string(),
        });
        let next = lock(&self.activate).pop_front();
        match next {
            Some(Scripted { outcome, gate }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                outcome
            }
            None => ActivateOutcome::Unreachable("no scripted activate response".to_string()),
        }
    }
}
