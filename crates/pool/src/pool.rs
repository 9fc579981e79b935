//! Worker pool
//!
//! # Design
//!
//! - Each worker is a named OS thread with its own unbounded mailbox and its
//!   own [`Handler`]. It processes one request at a time, in arrival order.
//! - Requests are routed round-robin unless addressed to a worker.
//! - All handlers share the store owned by [`PoolSettings`]; the store's
//!   transactions provide isolation, the pool adds no locking of its own.
//!
//! # Shutdown
//!
//! [`Pool::shutdown`] closes every mailbox, lets each worker drain what is
//! already queued, joins the threads and only then closes the store.

use crate::error::{Error, Result};
use crate::filter::{FilterRequest, FilterResult};
use crate::handler::Handler;
use crate::request::{Envelope, Reply, ReplyHandle, Request};
use crate::schema::pick_unique_index;
use crate::settings::PoolSettings;
use memtab_core::{canonical_name, IndexKey, Record};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

type Mailbox<R> = mpsc::UnboundedSender<Envelope<R>>;

/// A pool of workers serving one store
pub struct Pool<R: Record> {
    settings: Arc<PoolSettings<R>>,
    name: String,
    mailboxes: RwLock<Vec<Mailbox<R>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    next: AtomicUsize,
}

impl<R: Record> Pool<R> {
    /// Validate the settings, create the store and start the workers
    pub fn start(mut settings: PoolSettings<R>) -> Result<Self> {
        let shape = R::shape();
        if !shape.is_record() {
            return Err(Error::InvalidShape {
                type_name: shape.type_name().to_string(),
                reason: "not a record type".to_string(),
            });
        }
        let first = shape.first_field().ok_or_else(|| Error::InvalidShape {
            type_name: shape.type_name().to_string(),
            reason: "record has no fields".to_string(),
        })?;
        settings.set_default_index_field(canonical_name(first.name()));

        settings.connect()?;
        if !settings.has_custom_handler() && settings.target().is_none() {
            let store = settings.store().ok_or(Error::NotConnected)?;
            settings.set_target(pick_unique_index(store.schema())?);
        }

        let name = settings.pool_name();
        let size = settings.size();
        let settings = Arc::new(settings);

        let mut pool = Self {
            settings: Arc::clone(&settings),
            name: name.clone(),
            mailboxes: RwLock::new(Vec::with_capacity(size)),
            threads: Mutex::new(Vec::with_capacity(size)),
            next: AtomicUsize::new(0),
        };

        for worker_id in 0..size {
            let handler = settings.create_handler(worker_id)?;
            let (tx, rx) = mpsc::unbounded_channel();
            let pool_name = name.clone();
            let thread = std::thread::Builder::new()
                .name(format!("{name}-worker-{worker_id}"))
                .spawn(move || run_worker(pool_name, worker_id, handler, rx))
                .map_err(|e| Error::WorkerSpawn {
                    worker_id,
                    reason: e.to_string(),
                })?;
            pool.mailboxes.get_mut().push(tx);
            pool.threads.get_mut().push(thread);
        }

        tracing::info!(pool = %name, workers = size, "Pool started");
        Ok(pool)
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of running workers (0 after shutdown)
    pub fn size(&self) -> usize {
        self.mailboxes.read().len()
    }

    /// Settings the pool was created from
    pub fn settings(&self) -> &PoolSettings<R> {
        &self.settings
    }

    // ========================================================================
    // Submission
    // ========================================================================

    fn dispatch(&self, worker: Option<usize>, envelope: Envelope<R>) -> Result<()> {
        let mailboxes = self.mailboxes.read();
        if mailboxes.is_empty() {
            return Err(Error::PoolClosed);
        }
        let worker_id = match worker {
            Some(id) if id < mailboxes.len() => id,
            Some(id) => {
                return Err(Error::UnknownWorker {
                    worker_id: id,
                    pool_size: mailboxes.len(),
                })
            }
            None => self.next.fetch_add(1, Ordering::Relaxed) % mailboxes.len(),
        };
        mailboxes[worker_id]
            .send(envelope)
            .map_err(|_| Error::PoolClosed)
    }

    fn submit(&self, worker: Option<usize>, request: Request<R>) -> ReplyHandle<R> {
        let (envelope, rx) = Envelope::ask(request);
        match self.dispatch(worker, envelope) {
            Ok(()) => ReplyHandle::pending(rx),
            Err(e) => ReplyHandle::failed(e),
        }
    }

    /// Send a request to the next worker and return a handle to its reply
    pub fn request(&self, request: Request<R>) -> ReplyHandle<R> {
        self.submit(None, request)
    }

    /// Send a request to worker `worker`
    pub fn request_to(&self, worker: usize, request: Request<R>) -> ReplyHandle<R> {
        self.submit(Some(worker), request)
    }

    /// Send a request and block until the reply arrives
    ///
    /// Must not be called from inside an async runtime; await
    /// [`request`](Pool::request) there instead.
    pub fn request_blocking(&self, request: Request<R>) -> Result<Reply<R>> {
        self.request(request).wait()
    }

    /// Send a request without waiting for, or receiving, a reply
    pub fn tell(&self, request: Request<R>) -> Result<()> {
        self.dispatch(None, Envelope::tell(request))
    }

    // ========================================================================
    // Typed requests (blocking)
    // ========================================================================

    /// Insert `record`, replacing one with the same identity
    pub fn create(&self, record: R) -> Result<()> {
        match self.request_blocking(Request::Create(Some(record)))? {
            Reply::Done => Ok(()),
            _ => Err(Error::UnexpectedReply { request: "create" }),
        }
    }

    /// Record with unique key `key`
    pub fn read(&self, key: impl Into<IndexKey>) -> Result<Option<Arc<R>>> {
        match self.request_blocking(Request::Read(Some(key.into())))? {
            Reply::Record(record) => Ok(record),
            _ => Err(Error::UnexpectedReply { request: "read" }),
        }
    }

    /// Replace the record with `record`'s identity
    pub fn update(&self, record: R) -> Result<()> {
        match self.request_blocking(Request::Update(Some(record)))? {
            Reply::Done => Ok(()),
            _ => Err(Error::UnexpectedReply { request: "update" }),
        }
    }

    /// Remove and return the record with unique key `key`
    pub fn delete(&self, key: impl Into<IndexKey>) -> Result<Option<Arc<R>>> {
        match self.request_blocking(Request::Delete(Some(key.into())))? {
            Reply::Record(record) => Ok(record),
            _ => Err(Error::UnexpectedReply { request: "delete" }),
        }
    }

    /// Page of records matching `request`'s condition
    pub fn filter(&self, request: FilterRequest<R>) -> Result<FilterResult<R>> {
        match self.request_blocking(Request::Filter(request))? {
            Reply::Filtered(result) => Ok(result),
            _ => Err(Error::UnexpectedReply { request: "filter" }),
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop the workers and close the store
    ///
    /// Queued requests are processed first. Calling this again does nothing.
    pub fn shutdown(&self) -> Result<()> {
        let mailboxes = std::mem::take(&mut *self.mailboxes.write());
        let threads = std::mem::take(&mut *self.threads.lock());
        if mailboxes.is_empty() && threads.is_empty() {
            return Ok(());
        }

        tracing::info!(pool = %self.name, "Shutting down pool");
        drop(mailboxes);
        for thread in threads {
            if thread.join().is_err() {
                tracing::error!(pool = %self.name, "Worker panicked");
            }
        }
        self.settings.close()
    }
}

impl<R: Record> Drop for Pool<R> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(pool = %self.name, error = %e, "Pool shutdown failed");
        }
    }
}

impl<R: Record> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("settings", &self.settings)
            .finish()
    }
}

// ============================================================================
// Worker
// ============================================================================

#[tracing::instrument(name = "worker", skip(handler, mailbox))]
fn run_worker<R: Record>(
    pool: String,
    worker_id: usize,
    mut handler: Box<dyn Handler<R>>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope<R>>,
) {
    tracing::debug!("Worker starting");

    while let Some(envelope) = mailbox.blocking_recv() {
        let (request, reply) = envelope.into_parts();
        let kind = request.kind();
        tracing::debug!(request = kind, "Processing request");

        match handler.handle(request) {
            Ok(Some(answer)) => {
                if let Some(reply) = reply {
                    // Caller may have stopped waiting
                    let _ = reply.send(Ok(answer));
                }
            }
            Ok(None) => {
                tracing::debug!(request = kind, "Request dropped without reply");
            }
            Err(e) => {
                tracing::debug!(request = kind, error = %e, "Request failed");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    tracing::debug!("Worker stopped, mailbox closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Message;
    use memtab_core::record_shape;

    #[derive(Clone, Debug, PartialEq)]
    struct Person {
        email: String,
        name: String,
        age: i64,
    }

    record_shape!(Person { email, name, age });

    fn person(email: &str, age: i64) -> Person {
        Person {
            email: email.into(),
            name: email.to_uppercase(),
            age,
        }
    }

    fn pool(size: usize) -> Pool<Person> {
        Pool::start(PoolSettings::new().pool_size(size)).unwrap()
    }

    #[test]
    fn test_start_defaults() {
        let pool = Pool::<Person>::start(PoolSettings::new()).unwrap();
        assert_eq!(pool.size(), 10);
        assert_eq!(pool.name(), "person");
        assert_eq!(pool.settings().configured_index_field(), Some("email"));
        assert_eq!(pool.settings().target(), Some(("person", "id")));
    }

    #[test]
    fn test_invalid_shapes() {
        #[derive(Clone)]
        struct Empty;
        impl Record for Empty {
            fn shape() -> memtab_core::RecordShape<Self> {
                memtab_core::RecordShape::record("Empty")
            }
        }
        #[derive(Clone)]
        struct Flag;
        impl Record for Flag {
            fn shape() -> memtab_core::RecordShape<Self> {
                memtab_core::RecordShape::opaque("Flag")
            }
        }

        assert!(matches!(
            Pool::<Empty>::start(PoolSettings::new()),
            Err(Error::InvalidShape { .. })
        ));
        assert!(matches!(
            Pool::<Flag>::start(PoolSettings::new()),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_crud_round_trip() {
        let pool = pool(2);
        pool.create(person("a@x.io", 30)).unwrap();
        assert_eq!(*pool.read("a@x.io").unwrap().unwrap(), person("a@x.io", 30));

        pool.update(person("a@x.io", 31)).unwrap();
        assert_eq!(pool.read("a@x.io").unwrap().unwrap().age, 31);

        assert_eq!(pool.delete("a@x.io").unwrap().unwrap().age, 31);
        assert!(pool.read("a@x.io").unwrap().is_none());
        assert!(pool.delete("a@x.io").unwrap().is_none());
    }

    #[test]
    fn test_absent_payloads() {
        let pool = pool(1);
        assert!(matches!(
            pool.request_blocking(Request::Create(None)),
            Ok(Reply::Done)
        ));
        assert!(matches!(
            pool.request_blocking(Request::Read(None)),
            Ok(Reply::Record(None))
        ));
    }

    #[test]
    fn test_errors_do_not_stop_workers() {
        let pool = pool(1);
        assert!(matches!(
            pool.read(42),
            Err(Error::Transaction(memtab_storage::TxnError::KeyKindMismatch { .. }))
        ));
        pool.create(person("a@x.io", 1)).unwrap();
        assert!(pool.read("a@x.io").unwrap().is_some());
    }

    #[test]
    fn test_request_to_worker() {
        let pool = pool(3);
        for worker in 0..3 {
            let reply = pool
                .request_to(worker, Request::Create(Some(person(&format!("{worker}@x.io"), 1))))
                .wait();
            assert!(matches!(reply, Ok(Reply::Done)));
        }
        assert!(matches!(
            pool.request_to(3, Request::Read(None)).wait(),
            Err(Error::UnknownWorker {
                worker_id: 3,
                pool_size: 3
            })
        ));
    }

    #[test]
    fn test_tell_then_read_same_worker() {
        let pool = pool(1);
        pool.tell(Request::Create(Some(person("a@x.io", 5)))).unwrap();
        // One worker: the read is queued behind the create
        assert_eq!(pool.read("a@x.io").unwrap().unwrap().age, 5);
    }

    #[test]
    fn test_other_without_behavior_gets_no_reply() {
        let pool = pool(1);
        let reply = pool.request_blocking(Request::Other(Box::new("ping")));
        assert!(matches!(reply, Err(Error::NoReply)));
    }

    #[test]
    fn test_behavior_replies() {
        let settings = PoolSettings::<Person>::new().pool_size(2).behavior(|_| {
            Box::new(|m: Message| match m.downcast::<&'static str>() {
                Ok(s) if *s == "ping" => Some(Box::new("pong") as Message),
                _ => None,
            })
        });
        let pool = Pool::start(settings).unwrap();

        match pool.request_blocking(Request::Other(Box::new("ping"))) {
            Ok(Reply::Other(m)) => assert_eq!(*m.downcast::<&'static str>().unwrap(), "pong"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            pool.request_blocking(Request::Other(Box::new("other"))),
            Err(Error::NoReply)
        ));
    }

    #[test]
    fn test_custom_handler() {
        struct Refusing;
        impl Handler<Person> for Refusing {
            fn create(&mut self, _: Option<Person>) -> Result<()> {
                Err(Error::StoreClosed)
            }
            fn read(&mut self, _: Option<IndexKey>) -> Result<Option<Arc<Person>>> {
                Ok(None)
            }
            fn update(&mut self, _: Option<Person>) -> Result<()> {
                Err(Error::StoreClosed)
            }
            fn delete(&mut self, _: Option<IndexKey>) -> Result<Option<Arc<Person>>> {
                Ok(None)
            }
            fn filter(&mut self, req: FilterRequest<Person>) -> Result<FilterResult<Person>> {
                Ok(FilterResult {
                    from: req.from,
                    size: req.size,
                    count: 0,
                    records: Vec::new(),
                })
            }
            fn fallback(&mut self, message: Message) -> Option<Message> {
                Some(message)
            }
        }

        let settings = PoolSettings::<Person>::new()
            .pool_size(1)
            .handler(|_, _| Box::new(Refusing));
        let pool = Pool::start(settings).unwrap();
        assert!(pool.settings().target().is_none());
        assert!(matches!(
            pool.create(person("a@x.io", 1)),
            Err(Error::StoreClosed)
        ));
        assert!(matches!(
            pool.request_blocking(Request::Other(Box::new(1u8))),
            Ok(Reply::Other(_))
        ));
    }

    #[test]
    fn test_shutdown() {
        let pool = pool(2);
        for i in 0..20 {
            pool.tell(Request::Create(Some(person(&format!("{i}@x.io"), i))))
                .unwrap();
        }
        let store = pool.settings().store().unwrap();

        pool.shutdown().unwrap();
        // Queued creates were drained before the store closed
        assert_eq!(store.len("person"), 20);
        assert_eq!(pool.settings().state(), "closed");
        assert_eq!(pool.size(), 0);

        pool.shutdown().unwrap();
        assert!(matches!(pool.read("0@x.io"), Err(Error::PoolClosed)));
        assert!(matches!(
            pool.tell(Request::Read(None)),
            Err(Error::PoolClosed)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_await_reply() {
        let pool = pool(2);
        let reply = pool
            .request(Request::Create(Some(person("a@x.io", 7))))
            .await;
        assert!(matches!(reply, Ok(Reply::Done)));

        match pool.request(Request::Read(Some("a@x.io".into()))).await {
            Ok(Reply::Record(Some(p))) => assert_eq!(p.age, 7),
            other => panic!("unexpected {other:?}"),
        }
        pool.shutdown().unwrap();
    }
}
