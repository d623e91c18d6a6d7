//! Immediate-or-pending evaluation results.
//!
//! Most scripts never touch an asynchronous host call, so evaluation returns
//! [`Eval::Ready`] and stays on the synchronous path. Only when a native
//! function answers with a future does the surrounding expression become
//! [`Eval::Pending`]; combinators such as [`Eval::then`] and [`gather`]
//! compose the rest of the computation onto that future.

use std::future::Future;
use std::task::{Context, Poll};

use futures::future::{try_join_all, FutureExt, LocalBoxFuture};
use futures::task::noop_waker;

use crate::error::Result;

/// Future of a fallible result, not `Send`: interpreter state is `Rc`-based.
pub type PendingFuture<'a, T> = LocalBoxFuture<'a, Result<T>>;

pub enum Eval<'a, T> {
    Ready(T),
    Pending(PendingFuture<'a, T>),
}

impl<'a, T: 'a> Eval<'a, T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Eval::Pending(_))
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            Eval::Ready(value) => Some(value),

            Eval::Pending(_) => None,
        }
    }

    /// Wrap a host future.
    pub fn pending(future: impl Future<Output = Result<T>> + 'a) -> Self {
        Eval::Pending(future.boxed_local())
    }

    /// Poll `future` once; if it is already complete the result stays on the
    /// synchronous path.
    pub fn from_future(future: impl Future<Output = Result<T>> + 'a) -> Result<Self> {
        let mut future = future.boxed_local();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => result.map(Eval::Ready),

            Poll::Pending => Ok(Eval::Pending(future)),
        }
    }

    pub fn map<U: 'a>(self, f: impl FnOnce(T) -> U + 'a) -> Eval<'a, U> {
        match self {
            Eval::Ready(value) => Eval::Ready(f(value)),

            Eval::Pending(future) => Eval::Pending(future.map(move |r| r.map(f)).boxed_local()),
        }
    }

    /// Fallible continuation producing a plain value.
    pub fn try_map<U: 'a>(self, f: impl FnOnce(T) -> Result<U> + 'a) -> Result<Eval<'a, U>> {
        match self {
            Eval::Ready(value) => f(value).map(Eval::Ready),

            Eval::Pending(future) => Ok(Eval::Pending(
                async move { f(future.await?) }.boxed_local(),
            )),
        }
    }

    /// Fallible continuation that may itself be pending.
    pub fn then<U: 'a>(
        self,
        f: impl FnOnce(T) -> Result<Eval<'a, U>> + 'a,
    ) -> Result<Eval<'a, U>> {
        match self {
            Eval::Ready(value) => f(value),

            Eval::Pending(future) => Ok(Eval::Pending(
                async move { f(future.await?)?.resolve().await }.boxed_local(),
            )),
        }
    }

    pub async fn resolve(self) -> Result<T> {
        match self {
            Eval::Ready(value) => Ok(value),

            Eval::Pending(future) => future.await,
        }
    }
}

/// Collapse a list of results. All-ready input stays ready; otherwise the
/// result is one pending value resolving to the full list, in order.
pub fn gather<'a, T: 'a>(items: Vec<Eval<'a, T>>) -> Eval<'a, Vec<T>> {
    if !items.iter().any(Eval::is_pending) {
        return Eval::Ready(items.into_iter().filter_map(Eval::into_ready).collect());
    }

    Eval::Pending(try_join_all(items.into_iter().map(Eval::resolve)).boxed_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn gather_ready_stays_ready() {
        let gathered = gather(vec![Eval::Ready(1), Eval::Ready(2)]);

        assert_eq!(gathered.into_ready(), Some(vec![1, 2]));
    }

    #[test]
    fn gather_with_pending_keeps_order() {
        let gathered = gather(vec![
            Eval::Ready(1),
            Eval::pending(async { Ok(2) }),
            Eval::Ready(3),
        ]);

        assert!(gathered.is_pending());
        assert_eq!(block_on(gathered.resolve()).ok(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn from_future_completes_immediately_when_possible() {
        let eval = Eval::from_future(async { Ok(7) });

        assert_eq!(eval.ok().and_then(Eval::into_ready), Some(7));
    }
}
