//! Filtered queries and pagination
//!
//! A filter request carries an opaque [`ConditionSource`]. The handler
//! compiles it once, scans the table in unique-index order, keeps every
//! record the compiled [`Condition`] accepts, then slices the matches with
//! [`paginate`].

use std::fmt;
use std::sync::Arc;

/// Error produced when a condition fails to compile
pub type CompileError = Box<dyn std::error::Error + Send + Sync>;

/// A compiled predicate over records
pub trait Condition<R>: Send {
    /// True when `record` matches
    fn check(&self, record: &R) -> bool;
}

impl<R, F> Condition<R> for F
where
    F: Fn(&R) -> bool + Send,
{
    fn check(&self, record: &R) -> bool {
        self(record)
    }
}

/// Something that compiles into a [`Condition`]
///
/// The query language is up to the caller. Plain closures are sources that
/// always compile.
pub trait ConditionSource<R>: Send + Sync {
    /// Compile into a checkable condition
    fn compile(&self) -> Result<Box<dyn Condition<R>>, CompileError>;
}

impl<R, F> ConditionSource<R> for F
where
    F: Fn(&R) -> bool + Clone + Send + Sync + 'static,
{
    fn compile(&self) -> Result<Box<dyn Condition<R>>, CompileError> {
        Ok(Box::new(self.clone()))
    }
}

/// Request for the records matching a condition
pub struct FilterRequest<R> {
    /// Condition to compile and evaluate
    pub condition: Arc<dyn ConditionSource<R>>,
    /// Number of leading matches to skip
    pub from: usize,
    /// Maximum number of records to return (0 = no limit)
    pub size: usize,
}

impl<R> FilterRequest<R> {
    /// Match with `condition`, returning every match
    pub fn new(condition: impl ConditionSource<R> + 'static) -> Self {
        Self {
            condition: Arc::new(condition),
            from: 0,
            size: 0,
        }
    }

    /// Skip the first `from` matches
    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    /// Return at most `size` records
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

impl<R> Clone for FilterRequest<R> {
    fn clone(&self) -> Self {
        Self {
            condition: Arc::clone(&self.condition),
            from: self.from,
            size: self.size,
        }
    }
}

impl<R> fmt::Debug for FilterRequest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRequest")
            .field("condition", &"<dyn ConditionSource>")
            .field("from", &self.from)
            .field("size", &self.size)
            .finish()
    }
}

/// One page of filter matches
#[derive(Debug, Clone)]
pub struct FilterResult<R> {
    /// `from` of the request
    pub from: usize,
    /// `size` of the request
    pub size: usize,
    /// Number of matches before slicing
    pub count: usize,
    /// The page
    pub records: Vec<Arc<R>>,
}

/// Slice `matches` to the page selected by `from` and `size`
///
/// - `from == 0, size > 0`: the first `size` matches
/// - `from >= len`: nothing
/// - `from > 0, size > 0`: `[from, min(from + size, len))`
/// - `from > 0, size == 0`: `[from, len)`
/// - `from == 0, size == 0`: everything
pub fn paginate<T>(mut matches: Vec<T>, from: usize, size: usize) -> Vec<T> {
    let count = matches.len();
    if from == 0 {
        if size > 0 {
            matches.truncate(size);
        }
        return matches;
    }
    if from >= count {
        return Vec::new();
    }

    let end = if size > 0 {
        from.saturating_add(size).min(count)
    } else {
        count
    };
    matches.truncate(end);
    matches.drain(..from);
    matches
}
