//! Ordered multi-call plans with argument rewriting.

use std::fmt;

use serde_json::Value;

use super::{InvokeError, Method, RhoArg, SignedInvocationProxy};
use crate::events::{Event, Observer};

/// What a rewrite hook can see when a step is about to be sent.
#[derive(Debug, Clone, Copy)]
pub struct Prior<'a> {
    /// Decoded results of earlier steps, in order.
    pub outcomes: &'a [Value],
    /// Names reserved for this step's deploy, in order.
    pub reserved: &'a [String],
}

/// Replaces placeholder arguments just before a step is submitted.
pub type RewriteHook<'a> =
    Box<dyn Fn(Vec<RhoArg>, &Prior<'_>) -> Result<Vec<RhoArg>, InvokeError> + Send + Sync + 'a>;

/// One call in a [`CallPlan`].
pub struct CallStep<'a> {
    pub(crate) method: Method,
    pub(crate) args: Vec<RhoArg>,
    pub(crate) rewrite: Option<RewriteHook<'a>>,
    pub(crate) reserve: usize,
}

impl fmt::Debug for CallStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallStep")
            .field("method", &self.method)
            .field("args", &self.args)
            .field("rewrite", &self.rewrite.is_some())
            .field("reserve", &self.reserve)
            .finish()
    }
}

impl<'a> CallStep<'a> {
    /// A call with fixed arguments.
    #[must_use]
    pub const fn new(method: Method, args: Vec<RhoArg>) -> Self {
        Self {
            method,
            args,
            rewrite: None,
            reserve: 0,
        }
    }

    /// Rewrite the arguments right before submission.
    #[must_use]
    pub fn rewrite<F>(mut self, hook: F) -> Self
    where
        F: Fn(Vec<RhoArg>, &Prior<'_>) -> Result<Vec<RhoArg>, InvokeError> + Send + Sync + 'a,
    {
        self.rewrite = Some(Box::new(hook));
        self
    }

    /// Reserve `count` names for this step's deploy.
    #[must_use]
    pub const fn reserve_names(mut self, count: usize) -> Self {
        self.reserve = count;
        self
    }

    /// Method this step calls.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }
}

/// Calls executed strictly in order, each seeing the results before it.
#[derive(Debug, Default)]
pub struct CallPlan<'a> {
    steps: Vec<CallStep<'a>>,
}

impl<'a> CallPlan<'a> {
    /// An empty plan.
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    #[must_use]
    pub fn then(mut self, step: CallStep<'a>) -> Self {
        self.steps.push(step);
        self
    }

    /// Methods in execution order.
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        self.steps.iter().map(CallStep::method).collect()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step through `proxy`, returning each decoded result.
    ///
    /// A step is not submitted until the previous one has replied; the first
    /// failure ends the plan.
    ///
    /// # Errors
    ///
    /// The first [`InvokeError`] raised by a rewrite hook or a call.
    pub async fn execute(
        &self,
        proxy: &SignedInvocationProxy,
        observer: &dyn Observer,
    ) -> Result<Vec<Value>, InvokeError> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (step, call) in self.steps.iter().enumerate() {
            observer.on_event(&Event::CallStarted {
                step,
                method: call.method,
            });
            let value = proxy
                .call_with(
                    call.method,
                    call.args.clone(),
                    call.rewrite.as_ref(),
                    &outcomes,
                    call.reserve,
                )
                .await?;
            observer.on_event(&Event::CallSucceeded {
                step,
                method: call.method,
                value: &value,
            });
            outcomes.push(value);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::deploy::{DeployClient, PriceInfo};
    use crate::events::NoopObserver;
    use crate::registry::ModuleAddress;
    use crate::testing::FakeNode;

    fn proxy(node: &Arc<FakeNode>) -> SignedInvocationProxy {
        SignedInvocationProxy::new(
            Arc::clone(node) as Arc<dyn DeployClient>,
            ModuleAddress::new("rho:id:wallet"),
            || PriceInfo::new(1_000, 1),
        )
    }

    #[tokio::test]
    async fn test_steps_see_prior_outcomes() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::CreateWallet, json!({"=": {"uri": "rho:id:new"}}));
        node.reply(Method::PublishRegistered, json!({"=": "rho:id:new"}));

        let plan = CallPlan::new()
            .then(CallStep::new(Method::CreateWallet, vec![RhoArg::Int(1)]))
            .then(
                CallStep::new(Method::PublishRegistered, vec![RhoArg::Nil]).rewrite(
                    |mut args, prior| {
                        let uri = prior.outcomes[0]["uri"].as_str().unwrap_or_default();
                        args[0] = RhoArg::Uri(uri.to_owned());
                        Ok(args)
                    },
                ),
            );
        assert_eq!(
            plan.methods(),
            vec![Method::CreateWallet, Method::PublishRegistered]
        );

        let outcomes = plan.execute(&proxy(&node), &NoopObserver).await.unwrap();

        assert_eq!(outcomes, vec![json!({"uri": "rho:id:new"}), json!("rho:id:new")]);
        let calls = node.calls();
        assert_eq!(calls[1].args, vec![RhoArg::Uri("rho:id:new".into())]);
    }

    #[tokio::test]
    async fn test_failure_stops_plan() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::PrepareToPublish, json!({"!": "not claimed"}));
        node.reply(Method::PublishClaimed, json!({"=": true}));

        let plan = CallPlan::new()
            .then(CallStep::new(Method::PrepareToPublish, vec![]))
            .then(CallStep::new(Method::PublishClaimed, vec![]));
        let err = plan.execute(&proxy(&node), &NoopObserver).await.unwrap_err();

        assert!(matches!(err, InvokeError::Remote(_)));
        assert_eq!(node.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_hook_error_prevents_submission() {
        let node = Arc::new(FakeNode::new());
        let plan = CallPlan::new().then(
            CallStep::new(Method::Claim, vec![])
                .reserve_names(1)
                .rewrite(|_, _| Err(InvokeError::rewrite(Method::Claim, "no key"))),
        );

        let err = plan.execute(&proxy(&node), &NoopObserver).await.unwrap_err();

        assert!(matches!(err, InvokeError::Rewrite { .. }));
        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_execution_order() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::Balance, json!({"=": 1}));
        node.reply(Method::Transfer, json!({"=": true}));

        let seen = Mutex::new(Vec::new());
        let observer = |event: &Event<'_>| {
            if let Event::CallStarted { method, .. } | Event::CallSucceeded { method, .. } = event {
                seen.lock().unwrap().push((event.kind(), *method));
            }
        };
        CallPlan::new()
            .then(CallStep::new(Method::Balance, vec![]))
            .then(CallStep::new(Method::Transfer, vec![]))
            .execute(&proxy(&node), &observer)
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("call_started", Method::Balance),
                ("call_succeeded", Method::Balance),
                ("call_started", Method::Transfer),
                ("call_succeeded", Method::Transfer),
            ]
        );
    }
}
