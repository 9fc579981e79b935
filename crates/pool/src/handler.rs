//! Request handlers
//!
//! Every worker owns one [`Handler`]. The default, [`MemStoreHandler`], turns
//! each request into a single transaction on the shared store:
//!
//! | Request | Transaction |
//! |---------|-------------|
//! | create / update | write: insert, commit (abort on error) |
//! | read | read: first match on the unique index |
//! | delete | read, then write: delete, commit (abort on error) |
//! | filter | read: full scan in unique-index order, then paginate |
//!
//! Read and delete run in two separate transactions, so another worker can
//! remove the record in between. The second delete then fails with
//! `TxnError::NotFound`.

use crate::error::{Error, Result};
use crate::filter::{paginate, FilterRequest, FilterResult};
use crate::request::{Message, Reply, Request};
use memtab_core::{IndexKey, Record};
use memtab_storage::MemStore;
use std::sync::{Arc, Weak};

// ============================================================================
// Behavior
// ============================================================================

/// Per-worker handler for [`Request::Other`] messages
///
/// Returning `None` drops the message; the caller then sees
/// [`Error::NoReply`].
pub trait Behavior: Send {
    /// Handle one message
    fn handle(&mut self, message: Message) -> Option<Message>;
}

impl<F> Behavior for F
where
    F: FnMut(Message) -> Option<Message> + Send,
{
    fn handle(&mut self, message: Message) -> Option<Message> {
        self(message)
    }
}

/// Builds one [`Behavior`] per worker, with the store in scope
pub type BehaviorFactory<R> = Arc<dyn Fn(Weak<MemStore<R>>) -> Box<dyn Behavior> + Send + Sync>;

/// Builds a custom [`Handler`] for a worker, given its index and the store
pub type HandlerFactory<R> =
    Arc<dyn Fn(usize, Weak<MemStore<R>>) -> Box<dyn Handler<R>> + Send + Sync>;

// ============================================================================
// Handler
// ============================================================================

/// Operations a worker performs
pub trait Handler<R: Record>: Send {
    /// Insert or replace `record`; `None` is a no-op
    fn create(&mut self, record: Option<R>) -> Result<()>;

    /// Record with unique key `key`
    fn read(&mut self, key: Option<IndexKey>) -> Result<Option<Arc<R>>>;

    /// Same as `create`
    fn update(&mut self, record: Option<R>) -> Result<()>;

    /// Remove and return the record with unique key `key`
    fn delete(&mut self, key: Option<IndexKey>) -> Result<Option<Arc<R>>>;

    /// Page of records matching the request's condition
    fn filter(&mut self, request: FilterRequest<R>) -> Result<FilterResult<R>>;

    /// Anything that is not a CRUD or filter request
    fn fallback(&mut self, message: Message) -> Option<Message>;

    /// Dispatch a request to the matching operation
    ///
    /// `Ok(None)` means the request was dropped without a reply.
    fn handle(&mut self, request: Request<R>) -> Result<Option<Reply<R>>> {
        match request {
            Request::Create(record) => self.create(record).map(|()| Some(Reply::Done)),
            Request::Read(key) => self.read(key).map(|r| Some(Reply::Record(r))),
            Request::Update(record) => self.update(record).map(|()| Some(Reply::Done)),
            Request::Delete(key) => self.delete(key).map(|r| Some(Reply::Record(r))),
            Request::Filter(req) => self.filter(req).map(|r| Some(Reply::Filtered(r))),
            Request::Other(message) => Ok(self.fallback(message).map(Reply::Other)),
        }
    }
}

/// Default handler over a [`MemStore`]
pub struct MemStoreHandler<R: Record> {
    store: Weak<MemStore<R>>,
    table: String,
    index: String,
    behavior: Option<Box<dyn Behavior>>,
}

impl<R: Record> MemStoreHandler<R> {
    /// Handler for `table`, looking records up through unique index `index`
    pub fn new(
        store: Weak<MemStore<R>>,
        table: impl Into<String>,
        index: impl Into<String>,
        behavior: Option<Box<dyn Behavior>>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            index: index.into(),
            behavior,
        }
    }

    /// Table this handler works on
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Unique index used for lookups and scans
    pub fn index(&self) -> &str {
        &self.index
    }

    fn store(&self) -> Result<Arc<MemStore<R>>> {
        self.store.upgrade().ok_or(Error::StoreClosed)
    }

    fn insert(&self, record: R) -> Result<()> {
        let store = self.store()?;
        let mut txn = store.txn(true);
        if let Err(e) = txn.insert(&self.table, record) {
            txn.abort();
            return Err(e.into());
        }
        txn.commit();
        Ok(())
    }
}

impl<R: Record> Handler<R> for MemStoreHandler<R> {
    fn create(&mut self, record: Option<R>) -> Result<()> {
        match record {
            Some(record) => self.insert(record),
            None => Ok(()),
        }
    }

    fn read(&mut self, key: Option<IndexKey>) -> Result<Option<Arc<R>>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let store = self.store()?;
        let txn = store.txn(false);
        let found = txn.first(&self.table, &self.index, &key)?;
        Ok(found)
    }

    fn update(&mut self, record: Option<R>) -> Result<()> {
        self.create(record)
    }

    fn delete(&mut self, key: Option<IndexKey>) -> Result<Option<Arc<R>>> {
        let Some(existing) = self.read(key)? else {
            return Ok(None);
        };

        let store = self.store()?;
        let mut txn = store.txn(true);
        match txn.delete(&self.table, &existing) {
            Ok(removed) => {
                txn.commit();
                Ok(Some(removed))
            }
            Err(e) => {
                txn.abort();
                Err(e.into())
            }
        }
    }

    fn filter(&mut self, request: FilterRequest<R>) -> Result<FilterResult<R>> {
        let condition =
            request
                .condition
                .compile()
                .map_err(|e| Error::ConditionCompilation {
                    reason: e.to_string(),
                })?;

        let store = self.store()?;
        let txn = store.txn(false);
        let matches: Vec<Arc<R>> = txn
            .get(&self.table, &self.index)?
            .filter(|record| condition.check(record.as_ref()))
            .collect();
        drop(txn);

        let count = matches.len();
        Ok(FilterResult {
            from: request.from,
            size: request.size,
            count,
            records: paginate(matches, request.from, request.size),
        })
    }

    fn fallback(&mut self, message: Message) -> Option<Message> {
        match self.behavior.as_mut() {
            Some(behavior) => behavior.handle(message),
            None => {
                tracing::warn!(table = %self.table, "No behavior configured, dropping message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtab_core::{record_shape, IndexKind};
    use memtab_storage::{DbSchema, IndexSchema, TableSchema, TxnError};

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
            name: format!("name of {email}"),
            age,
        }
    }

    fn store() -> Arc<MemStore<Person>> {
        let schema = DbSchema::new().with_table(
            TableSchema::new("person")
                .with_index(IndexSchema::new("id", "email", IndexKind::String).unique(true))
                .with_index(IndexSchema::new("name", "name", IndexKind::String).unique(true)),
        );
        Arc::new(MemStore::new(schema).unwrap())
    }

    fn handler(store: &Arc<MemStore<Person>>) -> MemStoreHandler<Person> {
        MemStoreHandler::new(Arc::downgrade(store), "person", "id", None)
    }

    #[test]
    fn test_create_then_read() {
        let store = store();
        let mut h = handler(&store);
        h.create(Some(person("a@x.io", 30))).unwrap();

        let found = h.read(Some("a@x.io".into())).unwrap().unwrap();
        assert_eq!(*found, person("a@x.io", 30));
        assert!(h.read(Some("b@x.io".into())).unwrap().is_none());
    }

    #[test]
    fn test_absent_inputs() {
        let store = store();
        let mut h = handler(&store);
        h.create(None).unwrap();
        h.update(None).unwrap();
        assert!(h.read(None).unwrap().is_none());
        assert!(h.delete(None).unwrap().is_none());
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_update_replaces() {
        let store = store();
        let mut h = handler(&store);
        h.create(Some(person("a@x.io", 30))).unwrap();
        h.update(Some(person("a@x.io", 31))).unwrap();

        assert_eq!(h.read(Some("a@x.io".into())).unwrap().unwrap().age, 31);
        assert_eq!(store.len("person"), 1);
    }

    #[test]
    fn test_create_error_is_aborted() {
        let store = store();
        let mut h = handler(&store);
        h.create(Some(person("a@x.io", 30))).unwrap();

        let mut clash = person("b@x.io", 40);
        clash.name = "name of a@x.io".into();
        let err = h.create(Some(clash)).unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TxnError::UniqueViolation { .. })
        ));
        assert_eq!(store.len("person"), 1);
    }

    #[test]
    fn test_delete() {
        let store = store();
        let mut h = handler(&store);
        h.create(Some(person("a@x.io", 30))).unwrap();

        let removed = h.delete(Some("a@x.io".into())).unwrap().unwrap();
        assert_eq!(removed.email, "a@x.io");
        assert!(h.read(Some("a@x.io".into())).unwrap().is_none());
        assert!(h.delete(Some("a@x.io".into())).unwrap().is_none());
    }

    #[test]
    fn test_wrong_key_kind() {
        let store = store();
        let mut h = handler(&store);
        assert!(matches!(
            h.read(Some(IndexKey::from(5))),
            Err(Error::Transaction(TxnError::KeyKindMismatch { .. }))
        ));
    }

    #[test]
    fn test_filter_counts_before_slicing() {
        let store = store();
        let mut h = handler(&store);
        for i in 0..10 {
            h.create(Some(person(&format!("{i:02}@x.io"), i))).unwrap();
        }

        let result = h
            .filter(FilterRequest::new(|p: &Person| p.age % 2 == 0).from(1).size(2))
            .unwrap();
        assert_eq!((result.from, result.size, result.count), (1, 2, 5));
        let ages: Vec<_> = result.records.iter().map(|p| p.age).collect();
        assert_eq!(ages, vec![2, 4]);
    }

    #[test]
    fn test_filter_compile_error() {
        struct Broken;
        impl crate::filter::ConditionSource<Person> for Broken {
            fn compile(
                &self,
            ) -> std::result::Result<
                Box<dyn crate::filter::Condition<Person>>,
                crate::filter::CompileError,
            > {
                Err("bad query".into())
            }
        }

        let store = store();
        let mut h = handler(&store);
        let err = h.filter(FilterRequest::new(Broken)).unwrap_err();
        assert!(matches!(err, Error::ConditionCompilation { reason } if reason == "bad query"));
    }

    #[test]
    fn test_closed_store() {
        let store = store();
        let mut h = handler(&store);
        drop(store);
        assert!(matches!(
            h.create(Some(person("a@x.io", 1))),
            Err(Error::StoreClosed)
        ));
        assert!(matches!(h.read(Some("a".into())), Err(Error::StoreClosed)));
    }

    #[test]
    fn test_dispatch_and_fallback() {
        let store = store();
        let echo = |m: Message| m.downcast::<String>().ok().map(|s| Box::new(s.len()) as Message);
        let mut h = MemStoreHandler::new(Arc::downgrade(&store), "person", "id", Some(Box::new(echo)));

        assert!(matches!(
            h.handle(Request::Create(Some(person("a@x.io", 1)))),
            Ok(Some(Reply::Done))
        ));
        match h.handle(Request::Other(Box::new("four".to_string()))) {
            Ok(Some(Reply::Other(m))) => assert_eq!(*m.downcast::<usize>().unwrap(), 4),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(h.handle(Request::Other(Box::new(1u8))), Ok(None)));

        let mut bare = handler(&store);
        assert!(matches!(bare.handle(Request::Other(Box::new(1u8))), Ok(None)));
    }
}
