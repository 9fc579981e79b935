//! Requests, replies and reply handles

use crate::error::{Error, Result};
use crate::filter::{FilterRequest, FilterResult};
use memtab_core::IndexKey;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Free-form message routed to a worker's behavior
pub type Message = Box<dyn Any + Send>;

/// A request to the pool
pub enum Request<R> {
    /// Insert a record, replacing one with the same identity
    Create(Option<R>),
    /// Look up a record by its unique key
    Read(Option<IndexKey>),
    /// Same as `Create`
    Update(Option<R>),
    /// Remove the record with this unique key
    Delete(Option<IndexKey>),
    /// Records matching a condition, paginated
    Filter(FilterRequest<R>),
    /// Anything else, passed to the worker's behavior
    Other(Message),
}

impl<R> Request<R> {
    /// Short name of the request kind, used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Create(_) => "create",
            Request::Read(_) => "read",
            Request::Update(_) => "update",
            Request::Delete(_) => "delete",
            Request::Filter(_) => "filter",
            Request::Other(_) => "other",
        }
    }
}

impl<R> fmt::Debug for Request<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Read(key) | Request::Delete(key) => f
                .debug_tuple(self.kind())
                .field(key)
                .finish(),
            Request::Filter(req) => f.debug_tuple(self.kind()).field(req).finish(),
            _ => f.write_str(self.kind()),
        }
    }
}

/// A worker's answer
pub enum Reply<R> {
    /// Write applied
    Done,
    /// Record found, or removed (`None` when absent)
    Record(Option<Arc<R>>),
    /// Page of filter matches
    Filtered(FilterResult<R>),
    /// Behavior reply
    Other(Message),
}

impl<R: fmt::Debug> fmt::Debug for Reply<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Done => f.write_str("Done"),
            Reply::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Reply::Filtered(result) => f.debug_tuple("Filtered").field(result).finish(),
            Reply::Other(_) => f.write_str("Other(<message>)"),
        }
    }
}

/// A request on its way to a worker
pub(crate) struct Envelope<R> {
    pub(crate) request: Request<R>,
    reply: Option<oneshot::Sender<Result<Reply<R>>>>,
}

impl<R> Envelope<R> {
    /// Request that expects an answer
    pub(crate) fn ask(request: Request<R>) -> (Self, oneshot::Receiver<Result<Reply<R>>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Fire-and-forget request
    pub(crate) fn tell(request: Request<R>) -> Self {
        Self {
            request,
            reply: None,
        }
    }

    /// Split into the request and its reply channel
    pub(crate) fn into_parts(self) -> (Request<R>, Option<oneshot::Sender<Result<Reply<R>>>>) {
        (self.request, self.reply)
    }
}

enum ReplyState<R> {
    Pending(oneshot::Receiver<Result<Reply<R>>>),
    Failed(Option<Error>),
}

/// Pending reply to a request
///
/// Await it from async code or call [`wait`](ReplyHandle::wait) from a
/// plain thread. A worker that drops the request without answering resolves
/// the handle to [`Error::NoReply`]. There is no built-in timeout; wrap the
/// handle in `tokio::time::timeout` when one is needed.
pub struct ReplyHandle<R> {
    state: ReplyState<R>,
}

impl<R> ReplyHandle<R> {
    pub(crate) fn pending(rx: oneshot::Receiver<Result<Reply<R>>>) -> Self {
        Self {
            state: ReplyState::Pending(rx),
        }
    }

    pub(crate) fn failed(err: Error) -> Self {
        Self {
            state: ReplyState::Failed(Some(err)),
        }
    }

    /// Block the current thread until the reply arrives
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<Reply<R>> {
        match self.state {
            ReplyState::Pending(rx) => rx.blocking_recv().unwrap_or(Err(Error::NoReply)),
            ReplyState::Failed(err) => Err(err.unwrap_or(Error::NoReply)),
        }
    }
}

impl<R> Unpin for ReplyHandle<R> {}

impl<R> Future for ReplyHandle<R> {
    type Output = Result<Reply<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            ReplyState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(Error::NoReply))),
            ReplyState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(Error::NoReply))),
        }
    }
}

impl<R> fmt::Debug for ReplyHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            ReplyState::Pending(_) => "pending",
            ReplyState::Failed(_) => "failed",
        };
        f.debug_struct("ReplyHandle").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind() {
        assert_eq!(Request::<()>::Create(None).kind(), "create");
        assert_eq!(Request::<()>::Delete(Some(IndexKey::from(1))).kind(), "delete");
        assert_eq!(Request::<()>::Other(Box::new(5u8)).kind(), "other");
        assert_eq!(
            format!("{:?}", Request::<()>::Read(Some(IndexKey::from("a")))),
            "read(Some(Str(\"a\")))"
        );
        assert_eq!(
            format!("{:?}", Request::<()>::Delete(Some(IndexKey::from(3)))),
            "delete(Some(Int(3)))"
        );
    }

    #[test]
    fn test_wait_receives_reply() {
        let (envelope, rx) = Envelope::<u8>::ask(Request::Create(Some(1)));
        let (request, reply) = envelope.into_parts();
        assert_eq!(request.kind(), "create");
        reply.unwrap().send(Ok(Reply::Done)).ok();
        assert!(matches!(ReplyHandle::pending(rx).wait(), Ok(Reply::Done)));
    }

    #[test]
    fn test_dropped_reply_is_no_reply() {
        let (envelope, rx) = Envelope::<u8>::ask(Request::Read(None));
        drop(envelope);
        assert!(matches!(ReplyHandle::pending(rx).wait(), Err(Error::NoReply)));
    }

    #[test]
    fn test_tell_has_no_reply_channel() {
        let (_, reply) = Envelope::<u8>::tell(Request::Update(None)).into_parts();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_await_handle() {
        let (envelope, rx) = Envelope::<u8>::ask(Request::Read(None));
        let handle = ReplyHandle::pending(rx);
        let (_, reply) = envelope.into_parts();
        std::thread::spawn(move || {
            reply.unwrap().send(Ok(Reply::Record(Some(Arc::new(7))))).ok();
        });
        match handle.await {
            Ok(Reply::Record(Some(v))) => assert_eq!(*v, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_handle_resolves_immediately() {
        let handle = ReplyHandle::<u8>::failed(Error::PoolClosed);
        assert!(matches!(handle.await, Err(Error::PoolClosed)));
    }
}
