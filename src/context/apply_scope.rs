// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async scope preservation.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use super::scope_impl::Scope;

/// A [`Future`] wrapper that installs a [`Scope`] for the duration of every poll.
///
/// Executors poll tasks on whichever thread is free, and thread-local scopes do
/// not follow the task.  `ApplyScope` saves the polling thread's scope, installs
/// its own, polls the inner future and puts the saved scope back.
///
/// Nested context committed *inside* the wrapped future should be reversed before
/// the future yields, which is what the interceptor does for synchronous calls.
///
/// # Examples
///
/// ```rust
/// use logscope::context::{ApplyScope, Scope};
///
/// async fn current_labels() -> Vec<String> {
///     Scope::current().labels()
/// }
///
/// # async fn example() {
/// let scope = Scope::child(Scope::root(), Some("job".to_string()));
/// let labels = ApplyScope::new(scope, current_labels()).await;
/// assert_eq!(labels, ["job"]);
/// # }
/// ```
#[derive(Debug)]
pub struct ApplyScope<F> {
    scope: Scope,
    future: F,
}

impl<F> ApplyScope<F> {
    pub fn new(scope: Scope, future: F) -> Self {
        Self { scope, future }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl<F> Future for ApplyScope<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is structurally pinned and never moved out of `self`
        let (scope, future) = unsafe {
            let this = self.get_unchecked_mut();
            (this.scope.clone(), Pin::new_unchecked(&mut this.future))
        };
        let prior = Scope::current();
        scope.set_current();
        let _restore = Restore(Some(prior));
        future.poll(cx)
    }
}

/// Puts the polling thread's scope back, even if the inner poll panics.
struct Restore(Option<Scope>);

impl Drop for Restore {
    fn drop(&mut self) {
        if let Some(prior) = self.0.take() {
            let _ = prior.try_set_current();
        }
    }
}
