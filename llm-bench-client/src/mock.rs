//! Scripted in-memory [`InferenceClient`] for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{InferenceClient, InferenceRequest, InferenceResponse};
use crate::error::{InferenceError, InferenceResult};

type Responder = dyn Fn(&InferenceRequest) -> InferenceResult<InferenceResponse> + Send + Sync;
type DelayFn = dyn Fn(&InferenceRequest) -> Duration + Send + Sync;

pub struct MockInferenceClient {
    responder: Box<Responder>,
    delay: Option<Box<DelayFn>>,
    thinking_models: Option<Vec<String>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl MockInferenceClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&InferenceRequest) -> InferenceResult<InferenceResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            thinking_models: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(InferenceResponse::text(text.clone())))
    }

    /// Responds with the prompt it was given.
    pub fn echo() -> Self {
        Self::new(|req| Ok(InferenceResponse::text(req.prompt.clone())))
    }

    pub fn failing(error: InferenceError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Replays `script` in call order, repeating the last entry once drained.
    pub fn sequence(script: Vec<InferenceResult<InferenceResponse>>) -> Self {
        let last = script
            .last()
            .cloned()
            .unwrap_or_else(|| Ok(InferenceResponse::default()));
        let queue = Arc::new(Mutex::new(VecDeque::from(script)));
        Self::new(move |_| {
            queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .unwrap_or_else(|| last.clone())
        })
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Per-request latency, e.g. to make later samples finish first.
    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(&InferenceRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Restrict thinking support to these model ids instead of the
    /// built-in family table.
    pub fn with_thinking_models(mut self, models: &[&str]) -> Self {
        self.thinking_models = Some(models.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn complete(&self, request: &InferenceRequest) -> InferenceResult<InferenceResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }
        (self.responder)(request)
    }

    fn supports_thinking(&self, model_id: &str) -> bool {
        match &self.thinking_models {
            Some(models) => models.iter().any(|m| m == model_id),
            None => crate::capabilities::supports_thinking(model_id),
        }
    }
}
