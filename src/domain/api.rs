//! Contract for the caller-supplied start and grant APIs.
//!
//! An API reports its own progress through an [`ApiProgress`] handle that it
//! receives inside its [`ApiContext`]. The orchestrator treats the call as
//! complete once the progress reaches [`ApiCallState::End`], regardless of
//! whether the API future itself has returned yet.

use crate::error::ApiError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Progress of one external API call. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ApiCallState {
    #[default]
    RequestThrow,
    ResponseWait,
    End,
}

impl ApiCallState {
    pub fn is_end(self) -> bool {
        self == ApiCallState::End
    }
}

/// Which of the two external APIs a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    Start,
    Grant,
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKind::Start => f.write_str("start"),
            ApiKind::Grant => f.write_str("grant"),
        }
    }
}

/// What the orchestrator observes on the progress channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiSnapshot {
    pub state: ApiCallState,
    /// Server-issued transaction id, if the API handed one back when finishing.
    pub transaction_id: Option<String>,
}

/// Shared progress flag driven by the API and watched by the orchestrator.
#[derive(Debug, Clone)]
pub struct ApiProgress {
    tx: Arc<watch::Sender<ApiSnapshot>>,
}

impl Default for ApiProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiProgress {
    /// Creates a progress flag in `RequestThrow`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ApiSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ApiCallState {
        self.tx.borrow().state
    }

    pub fn snapshot(&self) -> ApiSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ApiSnapshot> {
        self.tx.subscribe()
    }

    /// Moves the flag to `next`. Re-entering the current state is a no-op.
    pub fn advance(&self, next: ApiCallState) -> Result<(), ApiError> {
        self.advance_with(next, None)
    }

    /// Marks the request as sent and the API as waiting on its server.
    pub fn response_wait(&self) -> Result<(), ApiError> {
        self.advance(ApiCallState::ResponseWait)
    }

    pub fn finish(&self) -> Result<(), ApiError> {
        self.advance(ApiCallState::End)
    }

    /// Reaches `End` and hands the server-issued transaction id to the orchestrator.
    pub fn finish_with_transaction(&self, transaction_id: impl Into<String>) -> Result<(), ApiError> {
        self.advance_with(ApiCallState::End, Some(transaction_id.into()))
    }

    fn advance_with(
        &self,
        next: ApiCallState,
        transaction_id: Option<String>,
    ) -> Result<(), ApiError> {
        let mut regression = None;
        self.tx.send_if_modified(|snapshot| {
            if next < snapshot.state {
                regression = Some(snapshot.state);
                return false;
            }
            let mut changed = false;
            if next != snapshot.state {
                snapshot.state = next;
                changed = true;
            }
            if let Some(id) = transaction_id {
                snapshot.transaction_id = Some(id);
                changed = true;
            }
            changed
        });
        match regression {
            Some(from) => Err(ApiError::Regression { from, to: next }),
            None => Ok(()),
        }
    }
}

/// Everything an external API needs to know about the call it serves.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub kind: ApiKind,
    pub product_id: String,
    pub quantity: u32,
    /// Id issued by the start API; `None` while the start API itself runs.
    pub transaction_id: Option<String>,
    pub progress: ApiProgress,
}

/// A caller-supplied asynchronous operation (start or grant).
///
/// Implementations must drive `ctx.progress` to `End` once their server
/// call has succeeded. Returning `Err` reports an API failure.
#[async_trait]
pub trait ExternalApi: Send + Sync {
    async fn call(&self, ctx: ApiContext) -> Result<(), ApiError>;
}

pub type ExternalApiRef = Arc<dyn ExternalApi>;

/// The pair of APIs the orchestrator drives around a purchase.
#[derive(Clone)]
pub struct PurchaseApis {
    pub start: ExternalApiRef,
    pub grant: ExternalApiRef,
}

impl PurchaseApis {
    pub fn new(start: ExternalApiRef, grant: ExternalApiRef) -> Self {
        Self { start, grant }
    }

    pub fn get(&self, kind: ApiKind) -> ExternalApiRef {
        match kind {
            ApiKind::Start => Arc::clone(&self.start),
            ApiKind::Grant => Arc::clone(&self.grant),
        }
    }
}

struct FnApi<F>(F);

#[async_trait]
impl<F, Fut> ExternalApi for FnApi<F>
where
    F: Fn(ApiContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    async fn call(&self, ctx: ApiContext) -> Result<(), ApiError> {
        (self.0)(ctx).await
    }
}

/// Wraps an async closure as an [`ExternalApi`].
pub fn api_fn<F, Fut>(f: F) -> ExternalApiRef
where
    F: Fn(ApiContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    Arc::new(FnApi(f))
}
