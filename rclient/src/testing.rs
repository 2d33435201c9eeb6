//! In-process node double for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::deploy::{DeployClient, DeployError, DeployId, PriceInfo, SourceText};
use crate::digest::{Hasher, Keccak256Hasher};
use crate::invoke::{InvokeError, InvokeRequest, Method};
use crate::registry::ModuleAddress;

/// Scripted [`DeployClient`] that records everything it is asked to do.
///
/// Replies are queued per method; the last queued reply keeps answering
/// once the others are used up.
#[derive(Debug, Default)]
pub(crate) struct FakeNode {
    replies: Mutex<HashMap<Method, VecDeque<Value>>>,
    calls: Mutex<Vec<InvokeRequest>>,
    reserved: Mutex<Vec<String>>,
    submissions: Mutex<Vec<Vec<String>>>,
    submit_failure: Mutex<Option<DeployError>>,
    counter: AtomicUsize,
}

impl FakeNode {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply for `method`.
    pub(crate) fn reply(&self, method: Method, value: Value) {
        self.replies
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(value);
    }

    /// Make every later `submit` fail with `err`.
    pub(crate) fn fail_submit(&self, err: DeployError) {
        *self.submit_failure.lock().unwrap() = Some(err);
    }

    pub(crate) fn calls(&self) -> Vec<InvokeRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn reserved_names(&self) -> Vec<String> {
        self.reserved.lock().unwrap().clone()
    }

    /// Source names of every `submit`, one entry per call.
    pub(crate) fn submissions(&self) -> Vec<Vec<String>> {
        self.submissions.lock().unwrap().clone()
    }

    /// Address the fake assigns to a source text.
    pub(crate) fn address_for(text: &str) -> ModuleAddress {
        let digest = Keccak256Hasher.digest(text.as_bytes()).to_hex();
        ModuleAddress::new(format!("rho:id:{}", &digest[..16]))
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployClient for FakeNode {
    async fn deploy(&self, _term: &str, _price: &PriceInfo) -> Result<DeployId, DeployError> {
        Ok(DeployId(format!("deploy-{}", self.next())))
    }

    async fn submit(
        &self,
        sources: &[SourceText],
        _price: &PriceInfo,
    ) -> Result<Vec<ModuleAddress>, DeployError> {
        self.submissions
            .lock()
            .unwrap()
            .push(sources.iter().map(|s| s.name.clone()).collect());
        if let Some(err) = self.submit_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(sources.iter().map(|s| Self::address_for(&s.text)).collect())
    }

    async fn reserve_names(
        &self,
        _price: &PriceInfo,
        count: usize,
    ) -> Result<Vec<String>, InvokeError> {
        let names: Vec<String> = (0..count)
            .map(|_| format!("{:064x}", self.next()))
            .collect();
        self.reserved.lock().unwrap().extend(names.iter().cloned());
        Ok(names)
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<Value, InvokeError> {
        self.calls.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&request.method)
            .ok_or_else(|| InvokeError::transport(format!("no reply for {}", request.method)))?;
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.ok_or_else(|| InvokeError::transport(format!("no reply for {}", request.method)))
    }
}
