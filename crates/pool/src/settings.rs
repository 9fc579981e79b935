//! Pool settings and the store handle
//!
//! [`PoolSettings`] describes a pool and owns its store. The store handle
//! moves through three states:
//!
//! ```text
//! Uninitialized --connect--> Connected --close--> Closed
//! ```
//!
//! Handlers only get a weak reference, so once the handle is closed every
//! later request fails with [`Error::StoreClosed`].

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::handler::{Behavior, BehaviorFactory, Handler, HandlerFactory, MemStoreHandler};
use crate::schema::{infer_single_table_schema, pick_unique_index};
use memtab_core::{canonical_name, Record};
use memtab_storage::{DbSchema, MemStore};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Number of workers when none is configured
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Lifecycle of the store owned by [`PoolSettings`]
pub enum HandleState<R: Record> {
    /// No store yet
    Uninitialized,
    /// Store is live
    Connected(Arc<MemStore<R>>),
    /// Store has been released; the handle cannot reconnect
    Closed,
}

impl<R: Record> HandleState<R> {
    /// State name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            HandleState::Uninitialized => "uninitialized",
            HandleState::Connected(_) => "connected",
            HandleState::Closed => "closed",
        }
    }
}

impl<R: Record> fmt::Debug for HandleState<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for a [`Pool`](crate::Pool)
pub struct PoolSettings<R: Record> {
    name: Option<String>,
    index_field: Option<String>,
    schema: Option<DbSchema>,
    target: Option<(String, String)>,
    pool_size: usize,
    behavior: Option<BehaviorFactory<R>>,
    handler: Option<HandlerFactory<R>>,
    state: Mutex<HandleState<R>>,
}

impl<R: Record> PoolSettings<R> {
    /// Settings that infer the schema from `R`, indexing its first field
    pub fn new() -> Self {
        Self {
            name: None,
            index_field: None,
            schema: None,
            target: None,
            pool_size: 0,
            behavior: None,
            handler: None,
            state: Mutex::new(HandleState::Uninitialized),
        }
    }

    /// Settings over a schema inferred from `R`, indexing `index_field`
    ///
    /// Inference runs immediately, so a bad field is reported here.
    pub fn of(index_field: impl Into<String>) -> Result<Self> {
        let index_field = index_field.into();
        let schema = infer_single_table_schema(&R::shape(), &index_field)?;
        Ok(Self::from_schema(schema)?.index_field(index_field))
    }

    /// Settings over an explicit schema
    ///
    /// The first table and its first unique index serve every request.
    pub fn from_schema(schema: DbSchema) -> Result<Self> {
        let target = pick_unique_index(&schema)?;
        let mut settings = Self::new();
        settings.schema = Some(schema);
        settings.target = Some(target);
        Ok(settings)
    }

    /// Settings taken from a loaded [`PoolConfig`]
    pub fn from_config(config: &PoolConfig) -> Self {
        let mut settings = Self::new().pool_size(config.pool_size);
        settings.name = config.name.clone();
        settings.index_field = config.index_field.clone();
        settings
    }

    // ========================================================================
    // Builder
    // ========================================================================

    /// Canonical name of the field to index
    pub fn index_field(mut self, field: impl Into<String>) -> Self {
        self.index_field = Some(field.into());
        self
    }

    /// Use `schema` instead of inferring one
    pub fn schema(mut self, schema: DbSchema) -> Self {
        self.schema = Some(schema);
        self.target = None;
        self
    }

    /// Number of workers (0 selects [`DEFAULT_POOL_SIZE`])
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Pool name, used for worker thread names and logs
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Give every worker a behavior for [`Request::Other`](crate::Request::Other)
    pub fn behavior<F>(mut self, factory: F) -> Self
    where
        F: Fn(Weak<MemStore<R>>) -> Box<dyn Behavior> + Send + Sync + 'static,
    {
        self.behavior = Some(Arc::new(factory));
        self
    }

    /// Replace the default handler
    pub fn handler<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize, Weak<MemStore<R>>) -> Box<dyn Handler<R>> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(factory));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Pool name; the served table's name unless one was set
    pub fn pool_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some((table, _)) = &self.target {
            return table.clone();
        }
        match self.schema.as_ref().and_then(DbSchema::first_table) {
            Some(table) => table.name.clone(),
            None => canonical_name(R::shape().type_name()),
        }
    }

    /// Effective number of workers
    pub fn size(&self) -> usize {
        if self.pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.pool_size
        }
    }

    /// Configured index field, if any
    pub fn configured_index_field(&self) -> Option<&str> {
        self.index_field.as_deref()
    }

    /// Table and unique index served by the default handler
    pub fn target(&self) -> Option<(&str, &str)> {
        self.target
            .as_ref()
            .map(|(table, index)| (table.as_str(), index.as_str()))
    }

    /// True when a custom handler replaces the default
    pub fn has_custom_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Name of the current handle state
    pub fn state(&self) -> &'static str {
        self.state.lock().name()
    }

    /// The live store, if connected
    pub fn store(&self) -> Option<Arc<MemStore<R>>> {
        match &*self.state.lock() {
            HandleState::Connected(store) => Some(Arc::clone(store)),
            _ => None,
        }
    }

    pub(crate) fn set_default_index_field(&mut self, field: String) {
        if self.index_field.is_none() {
            self.index_field = Some(field);
        }
    }

    pub(crate) fn set_target(&mut self, target: (String, String)) {
        self.target = Some(target);
    }

    /// Explicit schema, or one inferred from `R` and the index field
    pub fn resolve_schema(&self) -> Result<DbSchema> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        let shape = R::shape();
        let field = match &self.index_field {
            Some(field) => field.clone(),
            None => shape
                .first_field()
                .map(|f| canonical_name(f.name()))
                .ok_or_else(|| Error::InvalidShape {
                    type_name: shape.type_name().to_string(),
                    reason: "record has no fields".to_string(),
                })?,
        };
        infer_single_table_schema(&shape, &field)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the store
    ///
    /// Connecting an already connected handle does nothing. A closed handle
    /// cannot reconnect.
    pub fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            HandleState::Connected(_) => {
                tracing::debug!(pool = %self.pool_name(), "Store already connected");
                return Ok(());
            }
            HandleState::Closed => {
                return Err(Error::InvalidState {
                    operation: "connect",
                    state: state.name(),
                })
            }
            HandleState::Uninitialized => {}
        }

        let schema = self.resolve_schema()?;
        let store = MemStore::new(schema).map_err(|e| {
            tracing::error!(pool = %self.pool_name(), error = %e, "Failed to create store");
            Error::StoreCreation(e)
        })?;
        *state = HandleState::Connected(Arc::new(store));

        tracing::info!(pool = %self.pool_name(), "Store created");
        Ok(())
    }

    /// Release the store
    ///
    /// Closing twice is allowed; closing a handle that never connected is not.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            HandleState::Connected(_) => {
                *state = HandleState::Closed;
                tracing::info!(pool = %self.pool_name(), "Store closed");
                Ok(())
            }
            HandleState::Closed => Ok(()),
            HandleState::Uninitialized => Err(Error::InvalidState {
                operation: "close",
                state: state.name(),
            }),
        }
    }

    /// Build the handler for worker `worker_id`
    pub fn create_handler(&self, worker_id: usize) -> Result<Box<dyn Handler<R>>> {
        let store = match &*self.state.lock() {
            HandleState::Connected(store) => Arc::downgrade(store),
            _ => return Err(Error::NotConnected),
        };

        if let Some(factory) = &self.handler {
            return Ok(factory(worker_id, store));
        }

        let (table, index) = match &self.target {
            Some(target) => target.clone(),
            None => {
                let live = store.upgrade().ok_or(Error::StoreClosed)?;
                pick_unique_index(live.schema())?
            }
        };
        let behavior = self.behavior.as_ref().map(|factory| factory(store.clone()));
        Ok(Box::new(MemStoreHandler::new(store, table, index, behavior)))
    }
}

impl<R: Record> Default for PoolSettings<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> fmt::Debug for PoolSettings<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("name", &self.pool_name())
            .field("index_field", &self.index_field)
            .field("pool_size", &self.size())
            .field("has_behavior", &self.behavior.is_some())
            .field("has_handler", &self.handler.is_some())
            .field("state", &self.state())
            .finish()
    }
}
