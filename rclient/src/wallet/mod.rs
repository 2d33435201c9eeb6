//! Wallet lifecycle flows.
//!
//! Each flow runs one or more contract calls through a
//! [`SignedInvocationProxy`] with an unlocked [`SigningContext`]:
//!
//! | Flow       | Calls                                   | Local signature       |
//! |------------|-----------------------------------------|-----------------------|
//! | `genVault` | `genVault`                              | none                  |
//! | `claim`    | `claim` (reply on a reserved name)      | secp256k1, DER        |
//! | `balance`  | `balance`                               | none                  |
//! | `publish`  | `createWallet` then `publishRegistered` | Ed25519 over `toSign` |
//! | `publish` (claimed) | `prepareToPublish` then `publishClaimed` | Ed25519  |
//! | `transfer` | `transfer`, deployed as the native key  | none                  |
//!
//! Failures are tagged with the [`Stage`] they happened in.
//!
//! The claim signature covers the compact JSON bytes of
//! `[publicKeyHex, reservedName]` (see [`claim_message`]). Contracts that
//! verify against the protobuf `Par` encoding of the same list will reject it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result, Stage};
use crate::events::{Event, Observer};
use crate::invoke::{CallPlan, CallStep, InvokeError, Method, Prior, RhoArg, SignedInvocationProxy};
use crate::keyring::{SignatureScheme, SigningContext, is_valid_native_address};

/// Placeholder sent in the signature slot until the real signature is known.
pub const SIGNATURE_PLACEHOLDER: &str = "sig goes here";

/// Key scheme announced when creating a wallet.
const WALLET_KEY_SCHEME: &str = "secp256k1";

const CLAIM_SIGNATURE_SLOT: usize = 2;
const PUBLISH_URI_SLOT: usize = 0;
const PUBLISH_SIGNATURE_SLOT: usize = 2;

/// Wallet flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Flow {
    /// Mint test funds.
    GenVault,
    /// Claim a legacy balance.
    Claim,
    /// Read a balance.
    Balance,
    /// Publish a wallet.
    Publish,
    /// Transfer funds.
    Transfer,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GenVault => "genVault",
            Self::Claim => "claim",
            Self::Balance => "balance",
            Self::Publish => "publish",
            Self::Transfer => "transfer",
        })
    }
}

/// Result record of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    /// Flow that ran.
    pub flow: Flow,
    /// Keystore label of the key used.
    pub label: String,
    /// Identity the flow acted for.
    pub identity: String,
    /// Flow-specific outcome.
    pub outcome: Value,
}

/// Runs wallet flows for one unlocked key.
#[derive(Clone, Copy)]
pub struct WalletProtocol<'a> {
    proxy: &'a SignedInvocationProxy,
    signer: &'a SigningContext,
    label: &'a str,
    observer: &'a dyn Observer,
}

impl fmt::Debug for WalletProtocol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletProtocol")
            .field("module", self.proxy.address())
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<'a> WalletProtocol<'a> {
    /// Bind a proxy, an unlocked key and an observer.
    #[must_use]
    pub const fn new(
        proxy: &'a SignedInvocationProxy,
        signer: &'a SigningContext,
        label: &'a str,
        observer: &'a dyn Observer,
    ) -> Self {
        Self {
            proxy,
            signer,
            label,
            observer,
        }
    }

    fn native_address(&self) -> String {
        self.signer.identities().native_address.clone()
    }

    /// Mint `amount` into this key's vault.
    ///
    /// # Errors
    ///
    /// Invalid amounts, or any submission failure.
    pub async fn gen_vault(&self, amount: u64) -> Result<FlowReport> {
        let address = self.native_address();
        let plan = CallPlan::new().then(CallStep::new(
            Method::GenVault,
            vec![RhoArg::from(address.clone()), amount_arg(amount)?],
        ));
        let outcomes = self.run(Flow::GenVault, &plan).await?;
        Ok(self.finish(
            Flow::GenVault,
            address,
            json!({ "amount": amount, "result": first(outcomes) }),
        ))
    }

    /// Claim the legacy balance of this key's Ethereum-style address.
    ///
    /// The contract replies on a reserved name; the signature covers the
    /// JSON array `[publicKeyHex, reservedName]`.
    ///
    /// # Errors
    ///
    /// Signing or submission failures.
    pub async fn claim(&self) -> Result<FlowReport> {
        let ids = self.signer.identities();
        let plan = self.claim_plan();
        let outcomes = self.run(Flow::Claim, &plan).await?;
        Ok(self.finish(
            Flow::Claim,
            ids.legacy_address.clone(),
            json!({ "claimResult": first(outcomes) }),
        ))
    }

    pub(crate) fn claim_plan(&self) -> CallPlan<'a> {
        let ids = self.signer.identities();
        let public_key = hex::encode(&ids.public_key);
        let signer = self.signer;
        let observer = self.observer;

        let args = vec![
            RhoArg::from(ids.legacy_address.clone()),
            RhoArg::from(public_key.clone()),
            RhoArg::from(SIGNATURE_PLACEHOLDER),
        ];
        CallPlan::new().then(
            CallStep::new(Method::Claim, args)
                .reserve_names(1)
                .rewrite(move |args, prior| {
                    let status = prior.reserved.first().ok_or_else(|| {
                        InvokeError::rewrite(Method::Claim, "no name reserved for the reply")
                    })?;
                    let message = claim_message(&public_key, status)
                        .map_err(|e| InvokeError::rewrite(Method::Claim, e.to_string()))?;

                    observer.on_event(&Event::Signing {
                        method: Method::Claim,
                        scheme: SignatureScheme::Secp256k1,
                    });
                    let signature = signer
                        .sign_legacy(&message)
                        .map_err(|e| InvokeError::rewrite(Method::Claim, e.to_string()))?;
                    let der = signature
                        .to_der()
                        .map_err(|e| InvokeError::rewrite(Method::Claim, e.to_string()))?;
                    replace(
                        args,
                        Method::Claim,
                        CLAIM_SIGNATURE_SLOT,
                        RhoArg::from(hex::encode(der)),
                    )
                }),
        )
    }

    /// Read this key's vault balance.
    ///
    /// # Errors
    ///
    /// Any submission failure.
    pub async fn balance(&self) -> Result<FlowReport> {
        let address = self.native_address();
        let plan = CallPlan::new().then(CallStep::new(
            Method::Balance,
            vec![RhoArg::from(address.clone())],
        ));
        let outcomes = self.run(Flow::Balance, &plan).await?;
        Ok(self.finish(Flow::Balance, address, json!({ "balance": first(outcomes) })))
    }

    /// Publish this key's wallet.
    ///
    /// With `claimed`, the wallet came from [`claim`](Self::claim) and is
    /// published through `prepareToPublish`/`publishClaimed`; otherwise a
    /// new wallet is created and published through
    /// `createWallet`/`publishRegistered`.
    ///
    /// # Errors
    ///
    /// Protocol errors when the first call's reply lacks what must be
    /// signed, signing failures, or submission failures.
    pub async fn publish(&self, claimed: bool, nonce: u64) -> Result<FlowReport> {
        let plan = if claimed {
            self.publish_claimed_plan(nonce)?
        } else {
            self.publish_registered_plan(nonce)?
        };
        let outcomes = self.run(Flow::Publish, &plan).await?;
        let uri = outcomes.last().cloned().unwrap_or(Value::Null);
        Ok(self.finish(
            Flow::Publish,
            self.native_address(),
            json!({ "claimed": claimed, "uri": uri }),
        ))
    }

    pub(crate) fn publish_registered_plan(&self, nonce: u64) -> Result<CallPlan<'a>> {
        let ids = self.signer.identities();
        let nonce = amount_arg(nonce)?;
        let signer = self.signer;
        let observer = self.observer;

        let create = CallStep::new(
            Method::CreateWallet,
            vec![
                RhoArg::from(WALLET_KEY_SCHEME),
                RhoArg::from(hex::encode(&ids.public_key)),
                nonce.clone(),
            ],
        );
        let publish = CallStep::new(
            Method::PublishRegistered,
            vec![
                RhoArg::Nil,
                RhoArg::from(ids.native_public_key.to_vec()),
                RhoArg::Nil,
                nonce,
            ],
        )
        .rewrite(move |args, prior| {
            let created = prior_outcome(prior, Method::CreateWallet)?;
            let to_sign = hex_field(created.get("toSign"), "toSign")?;
            let uri = created
                .get("uri")
                .and_then(Value::as_str)
                .ok_or_else(|| InvokeError::protocol("createWallet reply has no uri"))?;

            observer.on_event(&Event::Signing {
                method: Method::PublishRegistered,
                scheme: SignatureScheme::Ed25519,
            });
            let signature = signer.sign_native(&to_sign);
            let args = replace(
                args,
                Method::PublishRegistered,
                PUBLISH_URI_SLOT,
                RhoArg::Uri(uri.to_owned()),
            )?;
            replace(
                args,
                Method::PublishRegistered,
                PUBLISH_SIGNATURE_SLOT,
                RhoArg::from(signature.to_vec()),
            )
        });
        Ok(CallPlan::new().then(create).then(publish))
    }

    pub(crate) fn publish_claimed_plan(&self, nonce: u64) -> Result<CallPlan<'a>> {
        let ids = self.signer.identities();
        let nonce = amount_arg(nonce)?;
        let public_key = hex::encode(&ids.public_key);
        let signer = self.signer;
        let observer = self.observer;

        let prepare = CallStep::new(
            Method::PrepareToPublish,
            vec![RhoArg::from(public_key.clone()), nonce.clone()],
        );
        let publish = CallStep::new(
            Method::PublishClaimed,
            vec![
                RhoArg::from(public_key),
                RhoArg::from(ids.native_public_key.to_vec()),
                RhoArg::Nil,
                nonce,
            ],
        )
        .rewrite(move |args, prior| {
            let prepared = prior_outcome(prior, Method::PrepareToPublish)?;
            let to_sign = hex_field(Some(prepared), "prepareToPublish result")?;

            observer.on_event(&Event::Signing {
                method: Method::PublishClaimed,
                scheme: SignatureScheme::Ed25519,
            });
            let signature = signer.sign_native(&to_sign);
            replace(
                args,
                Method::PublishClaimed,
                PUBLISH_SIGNATURE_SLOT,
                RhoArg::from(signature.to_vec()),
            )
        });
        Ok(CallPlan::new().then(prepare).then(publish))
    }

    /// Transfer `amount` from this key's vault to `to`.
    ///
    /// The deploy is attributed to the native public key so the vault can
    /// authorize the withdrawal.
    ///
    /// # Errors
    ///
    /// Invalid input, or any submission failure.
    pub async fn transfer(&self, to: &str, amount: u64) -> Result<FlowReport> {
        if to.trim().is_empty() {
            return Err(Error::invalid_input("transfer destination is empty"));
        }
        if !is_valid_native_address(to) {
            return Err(Error::invalid_input(format!(
                "{to} is not a valid vault address"
            )));
        }
        let from = self.native_address();
        let proxy = self
            .proxy
            .with_deployer(self.signer.identities().native_public_key.to_vec());
        let plan = CallPlan::new().then(CallStep::new(
            Method::Transfer,
            vec![
                RhoArg::from(from.clone()),
                RhoArg::from(to),
                amount_arg(amount)?,
            ],
        ));
        self.started(Flow::Transfer);
        let outcomes = plan
            .execute(&proxy, self.observer)
            .await
            .map_err(submission_error)?;
        Ok(self.finish(
            Flow::Transfer,
            from,
            json!({ "to": to, "amount": amount, "result": first(outcomes) }),
        ))
    }

    fn started(&self, flow: Flow) {
        self.observer.on_event(&Event::FlowStarted {
            flow,
            label: self.label,
            identities: self.signer.identities(),
        });
    }

    async fn run(&self, flow: Flow, plan: &CallPlan<'_>) -> Result<Vec<Value>> {
        self.started(flow);
        plan.execute(self.proxy, self.observer)
            .await
            .map_err(submission_error)
    }

    fn finish(&self, flow: Flow, identity: String, outcome: Value) -> FlowReport {
        let report = FlowReport {
            flow,
            label: self.label.to_owned(),
            identity,
            outcome,
        };
        self.observer.on_event(&Event::FlowFinished { report: &report });
        report
    }
}

/// Bytes signed by a claim: compact JSON of `[public_key_hex, reserved_name]`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn claim_message(public_key_hex: &str, reserved_name: &str) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&json!([public_key_hex, reserved_name]))
}

fn submission_error(err: InvokeError) -> Error {
    let stage = if matches!(err, InvokeError::Rewrite { .. }) {
        Stage::Signing
    } else {
        Stage::Submission
    };
    Error::at(stage, err)
}

fn amount_arg(value: u64) -> Result<RhoArg> {
    RhoArg::amount(value).ok_or_else(|| Error::invalid_input(format!("{value} is out of range")))
}

fn first(outcomes: Vec<Value>) -> Value {
    outcomes.into_iter().next().unwrap_or(Value::Null)
}

fn prior_outcome<'p>(prior: &Prior<'p>, method: Method) -> std::result::Result<&'p Value, InvokeError> {
    prior
        .outcomes
        .last()
        .ok_or_else(|| InvokeError::protocol(format!("{method} result missing")))
}

fn hex_field(value: Option<&Value>, field: &str) -> std::result::Result<Vec<u8>, InvokeError> {
    let text = value
        .and_then(Value::as_str)
        .ok_or_else(|| InvokeError::protocol(format!("{field} missing or not bytes")))?;
    hex::decode(text.trim_start_matches("0x"))
        .map_err(|e| InvokeError::protocol(format!("{field} is not hex: {e}")))
}

fn replace(
    mut args: Vec<RhoArg>,
    method: Method,
    slot: usize,
    value: RhoArg,
) -> std::result::Result<Vec<RhoArg>, InvokeError> {
    let target = args
        .get_mut(slot)
        .ok_or_else(|| InvokeError::rewrite(method, format!("no argument at position {slot}")))?;
    *target = value;
    Ok(args)
}
