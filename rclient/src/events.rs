//! Progress events emitted by wallet flows.
//!
//! Flows never print. They report through an [`Observer`] passed in by the
//! caller, which may log, render to a terminal, or record for tests.

use serde_json::Value;
use tracing::{debug, info};

use crate::invoke::Method;
use crate::keyring::{DerivedIdentities, SignatureScheme};
use crate::wallet::{Flow, FlowReport};

/// A step in the life of a wallet flow.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A flow started with an unlocked key.
    FlowStarted {
        /// Flow being run.
        flow: Flow,
        /// Keystore label of the key.
        label: &'a str,
        /// Identities derived from the key.
        identities: &'a DerivedIdentities,
    },
    /// A call is about to be submitted.
    CallStarted {
        /// Position in the flow's call plan.
        step: usize,
        /// Method being called.
        method: Method,
    },
    /// A call returned a decoded success value.
    CallSucceeded {
        /// Position in the flow's call plan.
        step: usize,
        /// Method that was called.
        method: Method,
        /// Decoded result.
        value: &'a Value,
    },
    /// A local signature is being computed for a call.
    Signing {
        /// Method whose arguments are being signed.
        method: Method,
        /// Signature scheme in use.
        scheme: SignatureScheme,
    },
    /// A flow completed.
    FlowFinished {
        /// Final report.
        report: &'a FlowReport,
    },
}

impl Event<'_> {
    /// Short machine-readable event name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FlowStarted { .. } => "flow_started",
            Self::CallStarted { .. } => "call_started",
            Self::CallSucceeded { .. } => "call_succeeded",
            Self::Signing { .. } => "signing",
            Self::FlowFinished { .. } => "flow_finished",
        }
    }
}

/// Receives flow events.
pub trait Observer: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &Event<'_>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event<'_>) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event<'_>) {
        match event {
            Event::FlowStarted {
                flow,
                label,
                identities,
            } => info!(
                flow = %flow,
                label,
                legacy_address = %identities.legacy_address,
                native_address = %identities.native_address,
                "flow started"
            ),
            Event::CallStarted { step, method } => debug!(step, method = %method, "call started"),
            Event::CallSucceeded {
                step,
                method,
                value,
            } => debug!(step, method = %method, value = %value, "call succeeded"),
            Event::Signing { method, scheme } => {
                debug!(method = %method, scheme = %scheme, "signing call arguments");
            }
            Event::FlowFinished { report } => {
                info!(flow = %report.flow, label = %report.label, "flow finished");
            }
        }
    }
}

impl<F> Observer for F
where
    F: Fn(&Event<'_>) + Send + Sync,
{
    fn on_event(&self, event: &Event<'_>) {
        self(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |event: &Event<'_>| seen.lock().unwrap().push(event.kind());

        observer.on_event(&Event::CallStarted {
            step: 0,
            method: Method::Balance,
        });
        NoopObserver.on_event(&Event::CallStarted {
            step: 1,
            method: Method::Balance,
        });

        assert_eq!(*seen.lock().unwrap(), vec!["call_started"]);
    }
}
