//! Keeps one view's data in step with the selected range.
//!
//! Every new range value bumps a generation counter and starts exactly one
//! fetch tagged with that generation. A finished fetch only publishes if its
//! tag still matches the counter; anything older is dropped on the floor.
//! The bump and the check both run under the `watch` channel's write lock, so
//! visible transitions follow the order of range changes, not the order in
//! which fetches complete. In-flight requests are never aborted.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::FetchError;

/// What a view sees. `Idle` and `Loading` both carry no data; only `Loading`
/// means a result is on its way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Loaded(T),
    Failed(FetchError),
}

impl<T> FetchState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Loaded(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }
}

type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;
type FetchFn<R, T> = Arc<dyn Fn(R) -> FetchFuture<T> + Send + Sync>;

pub struct RangeBinding<R, T> {
    name: &'static str,
    fetch: FetchFn<R, T>,
    active: Option<R>,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<FetchState<T>>>,
}

impl<R, T> RangeBinding<R, T>
where
    R: Clone + PartialEq + Send + 'static,
    T: Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: &'static str, fetch: F) -> Self
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let fetch: FetchFn<R, T> = Arc::new(move |range| Box::pin(fetch(range)));
        let (state, _) = watch::channel(FetchState::Idle);
        RangeBinding {
            name,
            fetch,
            active: None,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    pub fn active(&self) -> Option<&R> {
        self.active.as_ref()
    }

    /// Switches to `range`. Does nothing if it equals the active range;
    /// otherwise the state becomes `Loading` before this returns and the
    /// returned task publishes the result (unless superseded by then).
    ///
    /// Dropping the handle does not cancel the fetch.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the fetch is spawned
    /// onto the current one.
    pub fn set_range(&mut self, range: R) -> Option<JoinHandle<()>> {
        if self.active.as_ref() == Some(&range) {
            return None;
        }
        self.active = Some(range.clone());

        let generation = self.begin(FetchState::Loading);
        debug!(binding = self.name, generation, "fetch issued");

        let fetch = (self.fetch)(range);
        let name = self.name;
        let current = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        Some(tokio::spawn(async move {
            let result = fetch.await;
            state.send_if_modified(|s| {
                if current.load(Ordering::SeqCst) != generation {
                    debug!(binding = name, generation, "stale result discarded");
                    return false;
                }
                *s = match result {
                    Ok(data) => FetchState::Loaded(data),
                    Err(err) => FetchState::Failed(err),
                };
                true
            });
        }))
    }

    /// Forgets the active range and ignores whatever is still in flight.
    pub fn clear(&mut self) {
        self.active = None;
        self.begin(FetchState::Idle);
    }

    fn begin(&self, next: FetchState<T>) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *s = next;
        });
        generation
    }
}

impl<R, T: Clone> RangeBinding<R, T> {
    pub fn snapshot(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }
}

/// Waits until `rx` holds anything but `Loading`.
pub async fn settled<T: Clone>(rx: &mut watch::Receiver<FetchState<T>>) -> FetchState<T> {
    if let Ok(state) = rx.wait_for(|s| !s.is_loading()).await {
        return state.clone();
    }
    // Sender gone: whatever was last published is final.
    rx.borrow().clone()
}
