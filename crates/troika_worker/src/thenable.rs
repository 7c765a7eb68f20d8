//! Minimal promise-like primitive
//!
//! A [`Thenable`] is settled exactly once, either fulfilled with a value or
//! rejected with a [`WorkerError`]. Listeners attached before settlement run
//! on the thread that settles it (for worker responses that is whichever
//! thread calls [`WorkerRegistry::pump`](crate::WorkerRegistry::pump));
//! listeners attached afterwards run immediately.
//!
//! Thenables also implement [`Future`], so they can be `.await`ed or driven
//! with a simple executor such as `pollster::block_on`.
//!
//! # Example
//!
//! ```rust
//! use troika_worker::Thenable;
//!
//! let (thenable, resolver) = Thenable::<i32>::pending();
//! let doubled = thenable.then(|v| v * 2);
//! resolver.resolve(21);
//! assert_eq!(doubled.try_result(), Some(Ok(42)));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::WorkerError;

/// Outcome of a settled thenable
pub type Outcome<T> = Result<T, WorkerError>;

type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

struct Shared<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
    wakers: Vec<Waker>,
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A settle-once value that may not have arrived yet
pub struct Thenable<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Thenable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Thenable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match lock(&self.shared).outcome {
            None => "pending",
            Some(Ok(_)) => "fulfilled",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Thenable").field("state", &state).finish()
    }
}

/// The settling half of a [`Thenable`]
///
/// Dropping a resolver that never settled rejects its thenable with
/// [`WorkerError::Abandoned`], so listeners are never left hanging.
pub struct Resolver<T: Clone + Send + 'static> {
    shared: Option<Arc<Mutex<Shared<T>>>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    /// Fulfill the thenable. Returns false if it was already settled.
    pub fn resolve(mut self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject the thenable. Returns false if it was already settled.
    pub fn reject(mut self, error: WorkerError) -> bool {
        self.settle(Err(error))
    }

    /// Settle with a prepared outcome
    pub fn settle_with(mut self, outcome: Outcome<T>) -> bool {
        self.settle(outcome)
    }

    fn settle(&mut self, outcome: Outcome<T>) -> bool {
        let Some(shared) = self.shared.take() else {
            return false;
        };
        settle_shared(&shared, outcome)
    }
}

impl<T: Clone + Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.shared.is_some() {
            self.settle(Err(WorkerError::Abandoned));
        }
    }
}

fn settle_shared<T: Clone>(shared: &Mutex<Shared<T>>, outcome: Outcome<T>) -> bool {
    let (callbacks, wakers) = {
        let mut guard = lock(shared);
        if guard.outcome.is_some() {
            return false;
        }
        guard.outcome = Some(outcome.clone());
        (
            std::mem::take(&mut guard.callbacks),
            std::mem::take(&mut guard.wakers),
        )
    };

    // Listeners run outside the lock so they may attach further listeners.
    for callback in callbacks {
        callback(outcome.clone());
    }
    for waker in wakers {
        waker.wake();
    }
    true
}

impl<T: Clone + Send + 'static> Thenable<T> {
    /// Create a pending thenable and the resolver that settles it
    pub fn pending() -> (Self, Resolver<T>) {
        let shared = Arc::new(Mutex::new(Shared {
            outcome: None,
            callbacks: Vec::new(),
            wakers: Vec::new(),
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Resolver {
                shared: Some(shared),
            },
        )
    }

    /// An already fulfilled thenable
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// An already rejected thenable
    pub fn rejected(error: WorkerError) -> Self {
        Self::settled(Err(error))
    }

    /// An already settled thenable
    pub fn settled(outcome: Outcome<T>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                outcome: Some(outcome),
                callbacks: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.shared).outcome.is_none()
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Snapshot of the outcome, if settled
    pub fn try_result(&self) -> Option<Outcome<T>> {
        lock(&self.shared).outcome.clone()
    }

    /// Register a listener for the outcome
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let outcome = {
            let mut guard = lock(&self.shared);
            if guard.outcome.is_none() {
                guard.callbacks.push(Box::new(callback));
                return;
            }
            guard.outcome.clone()
        };
        if let Some(outcome) = outcome {
            callback(outcome);
        }
    }

    /// Chain a transformation of the outcome into a new thenable
    pub fn map_outcome<U, F>(&self, f: F) -> Thenable<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> Outcome<U> + Send + 'static,
    {
        let (next, resolver) = Thenable::pending();
        self.on_settled(move |outcome| {
            resolver.settle_with(f(outcome));
        });
        next
    }

    /// Map the fulfilled value; rejections pass through
    pub fn then<U, F>(&self, f: F) -> Thenable<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_outcome(move |outcome| outcome.map(f))
    }

    /// Map the fulfilled value with a fallible function
    pub fn then_try<U, F>(&self, f: F) -> Thenable<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.map_outcome(move |outcome| outcome.and_then(f))
    }

    /// Chain another asynchronous step, flattening the result
    pub fn and_then<U, F>(&self, f: F) -> Thenable<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Thenable<U> + Send + 'static,
    {
        let (next, resolver) = Thenable::pending();
        self.on_settled(move |outcome| match outcome {
            Ok(value) => f(value).on_settled(move |inner| {
                resolver.settle_with(inner);
            }),
            Err(error) => {
                resolver.reject(error);
            }
        });
        next
    }

    /// Recover from a rejection
    pub fn catch<F>(&self, f: F) -> Thenable<T>
    where
        F: FnOnce(WorkerError) -> T + Send + 'static,
    {
        self.map_outcome(move |outcome| Ok(outcome.unwrap_or_else(f)))
    }

    /// Run a side effect on settlement, passing the outcome through
    pub fn finally<F>(&self, f: F) -> Thenable<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.map_outcome(move |outcome| {
            f();
            outcome
        })
    }

    /// Fulfill with every value in order, or reject with the first rejection
    pub fn all(items: Vec<Thenable<T>>) -> Thenable<Vec<T>> {
        if items.is_empty() {
            return Thenable::resolved(Vec::new());
        }

        struct Gather<T: Clone + Send + 'static> {
            values: Vec<Option<T>>,
            remaining: usize,
            resolver: Option<Resolver<Vec<T>>>,
        }

        let (all, resolver) = Thenable::pending();
        let gather = Arc::new(Mutex::new(Gather {
            values: vec![None; items.len()],
            remaining: items.len(),
            resolver: Some(resolver),
        }));

        for (index, item) in items.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            item.on_settled(move |outcome| {
                let mut guard = gather.lock().unwrap_or_else(PoisonError::into_inner);
                match outcome {
                    Ok(value) => {
                        guard.values[index] = Some(value);
                        guard.remaining -= 1;
                        if guard.remaining > 0 {
                            return;
                        }
                        let values: Vec<T> = guard.values.drain(..).flatten().collect();
                        let resolver = guard.resolver.take();
                        drop(guard);
                        if let Some(resolver) = resolver {
                            resolver.resolve(values);
                        }
                    }
                    Err(error) => {
                        let resolver = guard.resolver.take();
                        drop(guard);
                        if let Some(resolver) = resolver {
                            resolver.reject(error);
                        }
                    }
                }
            });
        }
        all
    }
}

impl<T: Clone + Send + 'static> Future for Thenable<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = lock(&self.shared);
        if let Some(outcome) = &guard.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !guard.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            guard.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_then_runs_after_resolve() {
        let (thenable, resolver) = Thenable::<i32>::pending();
        let mapped = thenable.then(|v| v + 1);
        assert!(mapped.is_pending());

        assert!(resolver.resolve(1));
        assert_eq!(mapped.try_result(), Some(Ok(2)));
    }

    #[test]
    fn test_listener_after_settlement_runs_immediately() {
        let thenable = Thenable::resolved(5u32);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        thenable.on_settled(move |outcome| {
            seen_clone.store(outcome.unwrap_or(0) as usize, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_rejection_skips_then_and_hits_catch() {
        let thenable = Thenable::<i32>::rejected(WorkerError::Rejected("nope".into()));
        let recovered = thenable.then(|v| v * 10).catch(|_| -1);
        assert_eq!(recovered.try_result(), Some(Ok(-1)));
    }

    #[test]
    fn test_and_then_flattens() {
        let (inner, inner_resolver) = Thenable::<String>::pending();
        let inner_clone = inner.clone();
        let chained = Thenable::resolved(3).and_then(move |n| inner_clone.then(move |s| format!("{s}{n}")));
        assert!(chained.is_pending());

        inner_resolver.resolve("x".to_string());
        assert_eq!(chained.try_result(), Some(Ok("x3".to_string())));
    }

    #[test]
    fn test_dropped_resolver_rejects_as_abandoned() {
        let (thenable, resolver) = Thenable::<i32>::pending();
        drop(resolver);
        assert_eq!(thenable.try_result(), Some(Err(WorkerError::Abandoned)));
    }

    #[test]
    fn test_all_preserves_order() {
        let (a, ra) = Thenable::<i32>::pending();
        let (b, rb) = Thenable::<i32>::pending();
        let all = Thenable::all(vec![a, b]);

        rb.resolve(2);
        assert!(all.is_pending());
        ra.resolve(1);
        assert_eq!(all.try_result(), Some(Ok(vec![1, 2])));
    }

    #[test]
    fn test_all_rejects_on_first_failure() {
        let (a, ra) = Thenable::<i32>::pending();
        let (b, _rb) = Thenable::<i32>::pending();
        let all = Thenable::all(vec![a, b]);

        ra.reject(WorkerError::Rejected("boom".into()));
        assert_eq!(
            all.try_result(),
            Some(Err(WorkerError::Rejected("boom".into())))
        );
    }

    #[test]
    fn test_future_resolves_across_threads() {
        let (thenable, resolver) = Thenable::<&'static str>::pending();
        let handle = std::thread::spawn(move || {
            resolver.resolve("done");
        });
        let outcome = pollster::block_on(thenable);
        handle.join().unwrap();
        assert_eq!(outcome, Ok("done"));
    }

    #[test]
    fn test_finally_observes_both_paths() {
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&count);
        let c2 = Arc::clone(&count);
        let _ = Thenable::resolved(1).finally(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let _ = Thenable::<i32>::rejected(WorkerError::Abandoned).finally(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
