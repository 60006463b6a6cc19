//! Testing utilities.
//!
//! [`MockTransport`] replays scripted provider outcomes in order and records
//! every request it receives, so generation and turn flows can be tested
//! without network access.

use crate::generation::{GenerationRequest, ProviderError, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A transport that returns scripted responses.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Outcomes still to be returned, oldest first.
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    /// Every request received, in order.
    requests: Mutex<Vec<GenerationRequest>>,
    /// Delay applied before each outcome is returned.
    latency: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push_response(text);
        self
    }

    /// Queue a provider failure.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.push_error(error);
        self
    }

    /// Hold every call for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_response(&self, text: impl Into<String>) {
        lock(&self.script).push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: ProviderError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// Scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        lock(&self.requests).push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("mock transport has no scripted response".to_string())))
    }
}
