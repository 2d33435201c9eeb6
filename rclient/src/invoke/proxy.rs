//! Client-side stand-in for a deployed contract module.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::plan::{Prior, RewriteHook};
use super::{Envelope, InvokeError, InvokeRequest, Method, ReturnChannel, RhoArg};
use crate::deploy::{DeployClient, PriceInfo};
use crate::registry::ModuleAddress;

/// Produces fresh pricing for each call.
pub type PriceSource = Arc<dyn Fn() -> PriceInfo + Send + Sync>;

/// Turns method calls into deploys against one module.
///
/// Pricing is pulled from the [`PriceSource`] once per call, so each call
/// carries its own timestamp and the names reserved for it match the deploy
/// that is eventually sent.
#[derive(Clone)]
pub struct SignedInvocationProxy {
    client: Arc<dyn DeployClient>,
    address: ModuleAddress,
    price: PriceSource,
}

impl fmt::Debug for SignedInvocationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedInvocationProxy")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SignedInvocationProxy {
    /// Create a proxy for the module at `address`.
    pub fn new(
        client: Arc<dyn DeployClient>,
        address: ModuleAddress,
        price: impl Fn() -> PriceInfo + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            address,
            price: Arc::new(price),
        }
    }

    /// Address of the proxied module.
    #[must_use]
    pub const fn address(&self) -> &ModuleAddress {
        &self.address
    }

    /// A proxy whose calls are attributed to `deployer`.
    #[must_use]
    pub fn with_deployer(&self, deployer: Vec<u8>) -> Self {
        let base = Arc::clone(&self.price);
        Self {
            client: Arc::clone(&self.client),
            address: self.address.clone(),
            price: Arc::new(move || base().with_deployer(deployer.clone())),
        }
    }

    /// Call `method` with final arguments and return the decoded result.
    ///
    /// # Errors
    ///
    /// Transport failures and timeouts from the node, [`InvokeError::Remote`]
    /// when the contract reports a failure, [`InvokeError::Protocol`] when the
    /// reply is not an envelope.
    pub async fn call(&self, method: Method, args: Vec<RhoArg>) -> Result<Value, InvokeError> {
        self.call_with(method, args, None, &[], 0).await
    }

    /// Call `method`, optionally reserving names and rewriting arguments.
    ///
    /// When `reserve` is non-zero, that many names are previewed for the
    /// deploy and the first one becomes the return channel. The hook sees
    /// the reserved names and `outcomes` of earlier calls.
    pub(crate) async fn call_with(
        &self,
        method: Method,
        args: Vec<RhoArg>,
        rewrite: Option<&RewriteHook<'_>>,
        outcomes: &[Value],
        reserve: usize,
    ) -> Result<Value, InvokeError> {
        let price = (self.price)();
        let reserved = if reserve > 0 {
            self.client.reserve_names(&price, reserve).await?
        } else {
            Vec::new()
        };

        let args = match rewrite {
            Some(hook) => hook(
                args,
                &Prior {
                    outcomes,
                    reserved: &reserved,
                },
            )?,
            None => args,
        };

        let return_channel = reserved
            .first()
            .map_or(ReturnChannel::DeployId, |name| {
                ReturnChannel::Reserved(name.clone())
            });
        let request = InvokeRequest {
            address: self.address.clone(),
            method,
            args,
            price,
            return_channel,
        };

        debug!(method = %method, address = %self.address, "invoking");
        let reply = self.client.invoke(&request).await?;
        Envelope::decode(reply)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::invoke::CallStep;
    use crate::testing::FakeNode;

    fn proxy(node: &Arc<FakeNode>) -> SignedInvocationProxy {
        SignedInvocationProxy::new(
            Arc::clone(node) as Arc<dyn DeployClient>,
            ModuleAddress::new("rho:id:wallet"),
            || PriceInfo::new(1_000, 1),
        )
    }

    #[tokio::test]
    async fn test_call_decodes_success() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::Balance, json!({"=": 250}));

        let value = proxy(&node)
            .call(Method::Balance, vec![RhoArg::from("1111abc")])
            .await
            .unwrap();

        assert_eq!(value, json!(250));
        let calls = node.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Balance);
        assert_eq!(calls[0].args, vec![RhoArg::from("1111abc")]);
        assert_eq!(calls[0].return_channel, ReturnChannel::DeployId);
        assert_eq!(calls[0].address.as_str(), "rho:id:wallet");
    }

    #[tokio::test]
    async fn test_call_surfaces_remote_failure() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::Transfer, json!({"!": "insufficient funds"}));

        let err = proxy(&node)
            .call(Method::Transfer, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Remote(ref m) if m == "insufficient funds"));
    }

    #[tokio::test]
    async fn test_call_rejects_non_envelope() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::Balance, json!(250));

        let err = proxy(&node).call(Method::Balance, vec![]).await.unwrap_err();
        assert!(matches!(err, InvokeError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_with_deployer_overrides_price() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::Transfer, json!({"=": true}));

        proxy(&node)
            .with_deployer(vec![7; 32])
            .call(Method::Transfer, vec![])
            .await
            .unwrap();

        assert_eq!(node.calls()[0].price.deployer, vec![7; 32]);
    }

    #[tokio::test]
    async fn test_reserved_name_becomes_return_channel() {
        let node = Arc::new(FakeNode::new());
        node.reply(Method::Claim, json!({"=": true}));

        let step = CallStep::new(Method::Claim, vec![]).rewrite(|mut args, prior| {
            args.push(RhoArg::from(prior.reserved[0].clone()));
            Ok(args)
        });
        proxy(&node)
            .call_with(step.method, step.args.clone(), step.rewrite.as_ref(), &[], 1)
            .await
            .unwrap();

        let call = &node.calls()[0];
        let name = node.reserved_names()[0].clone();
        assert_eq!(call.return_channel, ReturnChannel::Reserved(name.clone()));
        assert_eq!(call.args, vec![RhoArg::Str(name)]);
    }
}
