//! Lazy, single-flight acquisition of the external browser SDK.
//!
//! This is the contract every emitted `loader` module implements, written as
//! an explicit state machine:
//!
//! ```text
//! Unrequested ──ensure_ready──▶ Loading ──ok──▶ Ready
//!                                  │
//!                                  └──err──▶ Failed ──(RetryAfterFailure)──▶ Loading
//! ```
//!
//! All callers that arrive while an acquisition is in flight await the same
//! shared future and observe the same outcome.

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use sdkgen_compiler::RuntimeOptions;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LocationLocked, ShimAcquisitionError};

/// Locates an already available SDK handle or starts loading a new one.
pub trait Acquire: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn acquire(&self, location: &str) -> BoxFuture<'static, Result<Self::Output, ShimAcquisitionError>>;
}

/// Adapts an async closure taking the location into an [`Acquire`].
pub struct AcquireFn<F>(pub F);

impl<F, Fut, T> Acquire for AcquireFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ShimAcquisitionError>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn acquire(&self, location: &str) -> BoxFuture<'static, Result<T, ShimAcquisitionError>> {
        (self.0)(location.to_string()).boxed()
    }
}

/// What happens to callers arriving after a failed acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// The failure is cached; every later caller receives the same error.
    #[default]
    Sticky,
    /// The next caller starts a fresh acquisition.
    RetryAfterFailure,
}

impl RetryPolicy {
    pub fn from_options(options: &RuntimeOptions) -> Self {
        if options.retry_after_failure {
            RetryPolicy::RetryAfterFailure
        } else {
            RetryPolicy::Sticky
        }
    }
}

/// In-flight acquisition shared by every waiting caller.
pub type Acquisition<T> = Shared<BoxFuture<'static, Result<T, ShimAcquisitionError>>>;

pub enum LoaderState<T: Clone> {
    Unrequested,
    /// `attempt` numbers acquisitions so a late waiter of an older attempt
    /// never overwrites the state of a newer one.
    Loading { attempt: u64, pending: Acquisition<T> },
    Ready(T),
    Failed(ShimAcquisitionError),
}

/// Observable summary of a [`LoaderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    Unrequested,
    Loading,
    Ready,
    Failed,
}

impl<T: Clone> LoaderState<T> {
    pub fn status(&self) -> LoaderStatus {
        match self {
            LoaderState::Unrequested     => LoaderStatus::Unrequested,
            LoaderState::Loading { .. }  => LoaderStatus::Loading,
            LoaderState::Ready(_)        => LoaderStatus::Ready,
            LoaderState::Failed(_)       => LoaderStatus::Failed,
        }
    }
}

struct Inner<T: Clone> {
    state:    LoaderState<T>,
    location: String,
    attempts: u64,
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    fn start<A: Acquire<Output = T>>(&mut self, acquirer: &A) -> (u64, Acquisition<T>) {
        self.attempts += 1;
        info!(attempt = self.attempts, location = self.location.as_str(), "acquiring SDK");
        let pending = acquirer.acquire(&self.location).shared();
        self.state = LoaderState::Loading { attempt: self.attempts, pending: pending.clone() };
        (self.attempts, pending)
    }

    fn settle(&mut self, attempt: u64, outcome: &Result<T, ShimAcquisitionError>) {
        let current = matches!(&self.state, LoaderState::Loading { attempt: a, .. } if *a == attempt);
        if !current {
            return;
        }
        self.state = match outcome {
            Ok(sdk) => {
                info!(attempt, "SDK ready");
                LoaderState::Ready(sdk.clone())
            }
            Err(e) => {
                warn!(attempt, error = %e, "SDK acquisition failed");
                LoaderState::Failed(e.clone())
            }
        };
    }
}

/// Owns the loader state; `ensure_ready` and `set_location` are the only
/// operations that change it.
pub struct ScriptLoader<A: Acquire> {
    acquirer: A,
    policy:   RetryPolicy,
    inner:    Mutex<Inner<A::Output>>,
}

impl<A: Acquire> ScriptLoader<A> {
    pub fn new(acquirer: A, location: impl Into<String>) -> Self {
        ScriptLoader {
            acquirer,
            policy: RetryPolicy::default(),
            inner: Mutex::new(Inner {
                state:    LoaderState::Unrequested,
                location: location.into(),
                attempts: 0,
            }),
        }
    }

    /// A loader using the script location and retry policy of the generator
    /// configuration.
    pub fn from_options(acquirer: A, options: &RuntimeOptions) -> Self {
        ScriptLoader::new(acquirer, options.script_url.clone()).with_policy(RetryPolicy::from_options(options))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn status(&self) -> LoaderStatus {
        self.inner.lock().await.state.status()
    }

    pub async fn location(&self) -> String {
        self.inner.lock().await.location.clone()
    }

    /// Number of acquisitions started so far.
    pub async fn attempts(&self) -> u64 {
        self.inner.lock().await.attempts
    }

    /// Resolves with the SDK, starting an acquisition only if none is in
    /// flight and none has succeeded yet.
    pub async fn ensure_ready(&self) -> Result<A::Output, ShimAcquisitionError> {
        let (attempt, pending) = {
            let mut inner = self.inner.lock().await;
            let joined = match &inner.state {
                LoaderState::Ready(sdk) => return Ok(sdk.clone()),
                LoaderState::Loading { attempt, pending } => Some((*attempt, pending.clone())),
                LoaderState::Failed(e) if self.policy == RetryPolicy::Sticky => {
                    debug!("returning cached acquisition failure");
                    return Err(e.clone());
                }
                LoaderState::Unrequested | LoaderState::Failed(_) => None,
            };
            match joined {
                Some(joined) => joined,
                None => inner.start(&self.acquirer),
            }
        };

        let outcome = pending.await;
        self.inner.lock().await.settle(attempt, &outcome);
        outcome
    }

    /// Changes where the SDK is loaded from. Only possible before the first
    /// acquisition starts, or after a failure when retries are enabled.
    pub async fn set_location(&self, location: impl Into<String>) -> Result<(), LocationLocked> {
        let mut inner = self.inner.lock().await;
        let unlocked = match &inner.state {
            LoaderState::Unrequested => true,
            LoaderState::Failed(_) => self.policy == RetryPolicy::RetryAfterFailure,
            LoaderState::Loading { .. } | LoaderState::Ready(_) => false,
        };
        if !unlocked {
            return Err(LocationLocked { current: inner.location.clone() });
        }
        inner.location = location.into();
        debug!(location = inner.location.as_str(), "SDK location changed");
        Ok(())
    }
}
