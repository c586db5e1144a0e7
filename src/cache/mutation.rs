//! Write operations with lifecycle status and settlement hooks.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

const SOURCE: &str = "cache::mutation";
const METRIC_MUTATION_TOTAL: &str = "roster_mutation_total";
const METRIC_MUTATION_MS: &str = "roster_mutation_ms";

type WriteFn<I, O, E> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, E>> + Send + Sync>;
type SuccessHook<I, O> = Box<dyn Fn(&O, &I) + Send + Sync>;
type ErrorHook<I, E> = Box<dyn Fn(&E, &I) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

impl MutationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationStatus::Idle => "idle",
            MutationStatus::Pending => "pending",
            MutationStatus::Success => "success",
            MutationStatus::Error => "error",
        }
    }
}

/// A named write operation.
///
/// Each [`mutate`](Self::mutate) call invokes the write function exactly once; failures
/// are not retried. Success hooks receive the output and the input, error hooks the
/// error and the input. Hooks run after the status has settled.
///
/// Concurrent calls are not serialized here. Callers are expected to disable whatever
/// triggers a mutation while [`is_pending`](Self::is_pending) is true.
pub struct Mutation<I, O, E> {
    name: &'static str,
    write: WriteFn<I, O, E>,
    on_success: Vec<SuccessHook<I, O>>,
    on_error: Vec<ErrorHook<I, E>>,
    status: watch::Sender<MutationStatus>,
}

impl<I, O, E> Mutation<I, O, E>
where
    I: Clone + Send + 'static,
    O: Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, write: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        let (status, _) = watch::channel(MutationStatus::Idle);
        Self {
            name,
            write: Arc::new(move |input| write(input).boxed()),
            on_success: Vec::new(),
            on_error: Vec::new(),
            status,
        }
    }

    pub fn on_success(mut self, hook: impl Fn(&O, &I) + Send + Sync + 'static) -> Self {
        self.on_success.push(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&E, &I) + Send + Sync + 'static) -> Self {
        self.on_error.push(Box::new(hook));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the write function once and settle.
    pub async fn mutate(&self, input: I) -> Result<O, E> {
        self.status.send_replace(MutationStatus::Pending);
        debug!(target_module = SOURCE, mutation = self.name, "Mutation started");
        let started_at = Instant::now();

        let result = (self.write)(input.clone()).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(METRIC_MUTATION_TOTAL, "mutation" => self.name, "outcome" => outcome)
            .increment(1);
        histogram!(METRIC_MUTATION_MS, "mutation" => self.name)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(output) => {
                self.status.send_replace(MutationStatus::Success);
                debug!(target_module = SOURCE, mutation = self.name, "Mutation succeeded");
                for hook in &self.on_success {
                    hook(output, &input);
                }
            }
            Err(err) => {
                self.status.send_replace(MutationStatus::Error);
                warn!(
                    target_module = SOURCE,
                    mutation = self.name,
                    error = %err,
                    "Mutation failed"
                );
                for hook in &self.on_error {
                    hook(err, &input);
                }
            }
        }
        result
    }

    pub fn status(&self) -> MutationStatus {
        *self.status.borrow()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == MutationStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status() == MutationStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status() == MutationStatus::Error
    }

    /// Return to `Idle`, e.g. when the form that triggered the mutation closes.
    pub fn reset(&self) {
        if !self.is_pending() {
            self.status.send_replace(MutationStatus::Idle);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationStatus> {
        self.status.subscribe()
    }
}
