//! Composable wrappers for async service operations.
//!
//! An [`Operation`] is any async call with a stable identity. Wrappers add one
//! concern each and are themselves operations, so they stack:
//!
//! - [`CachedOperation`]: read-through caching in a [`CacheStore`]
//! - [`InvalidatingOperation`]: deletes cache keys after a successful call
//! - [`TimedOperation`]: call timings and slow-call warnings, optionally
//!   recorded with a [`PerformanceMonitor`]
//!
//! Recommended composition on read paths is `op.cached(..).timed(..)`, so cache
//! hits are timed as well. On write paths put `invalidating` outside `cached`.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::cache_key::CacheKeyGenerator;
use super::store::CacheStore;
use crate::core::{AggPipeError, Result};
use crate::monitoring::{PerformanceMonitor, QueryMetrics};

/// Stable identity of an operation, used for cache keys and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    /// Owning service or type name
    pub owner: String,
    /// Method name
    pub name: String,
}

impl OperationId {
    /// Create an identity
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// An async call taking `A` and producing `T`.
#[async_trait]
pub trait Operation<A, T>: Send + Sync {
    /// Invoke the operation
    async fn call(&self, args: A) -> Result<T>;

    /// Identity of the underlying operation
    fn identity(&self) -> &OperationId;
}

/// Adapts a closure returning a future into an [`Operation`].
pub struct FnOperation<F, A, T> {
    id: OperationId,
    f: F,
    _marker: PhantomData<fn(A) -> T>,
}

/// Wrap `f` as an operation named `owner.name`.
pub fn operation<F, Fut, A, T>(
    owner: impl Into<String>,
    name: impl Into<String>,
    f: F,
) -> FnOperation<F, A, T>
where
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    FnOperation {
        id: OperationId::new(owner, name),
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, A, T> Operation<A, T> for FnOperation<F, A, T>
where
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    async fn call(&self, args: A) -> Result<T> {
        (self.f)(args).await
    }

    fn identity(&self) -> &OperationId {
        &self.id
    }
}

/// Computes a cache key from the arguments
pub type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;

/// Per-operation caching options
pub struct MethodCacheOptions<A> {
    /// Entry lifetime; `None` uses the store default
    pub ttl: Option<Duration>,
    /// Custom key function; when set it is the only source of the key
    pub key_fn: Option<KeyFn<A>>,
    /// When false the wrapper calls straight through
    pub enabled: bool,
}

impl<A> MethodCacheOptions<A> {
    /// Options with an explicit lifetime
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Options that bypass the cache entirely
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Use `f` to derive keys
    pub fn key_fn(mut self, f: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Arc::new(f));
        self
    }
}

impl<A> Default for MethodCacheOptions<A> {
    fn default() -> Self {
        Self {
            ttl: None,
            key_fn: None,
            enabled: true,
        }
    }
}

impl<A> Clone for MethodCacheOptions<A> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            key_fn: self.key_fn.clone(),
            enabled: self.enabled,
        }
    }
}

impl<A> fmt::Debug for MethodCacheOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCacheOptions")
            .field("ttl", &self.ttl)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<fn>"))
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Read-through cache around an operation.
///
/// Only successful results are stored; errors propagate unchanged and leave
/// the store untouched.
pub struct CachedOperation<O, A, T> {
    inner: O,
    store: Arc<CacheStore>,
    options: MethodCacheOptions<A>,
    _marker: PhantomData<fn() -> T>,
}

impl<O, A, T> CachedOperation<O, A, T>
where
    O: Operation<A, T>,
    A: Serialize,
{
    /// Wrap `inner`
    pub fn new(inner: O, store: Arc<CacheStore>, options: MethodCacheOptions<A>) -> Self {
        Self {
            inner,
            store,
            options,
            _marker: PhantomData,
        }
    }

    /// Cache key for `args`
    pub fn cache_key(&self, args: &A) -> Result<String> {
        if let Some(key_fn) = &self.options.key_fn {
            return Ok(key_fn(args));
        }
        let id = self.inner.identity();
        CacheKeyGenerator::method_key(&id.owner, &id.name, args).map_err(|e| {
            AggPipeError::CacheKey {
                operation: id.to_string(),
                message: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl<O, A, T> Operation<A, T> for CachedOperation<O, A, T>
where
    O: Operation<A, T>,
    A: Serialize + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    async fn call(&self, args: A) -> Result<T> {
        if !self.options.enabled {
            return self.inner.call(args).await;
        }

        let key = self.cache_key(&args)?;

        if let Some(value) = self.store.get(&key) {
            match serde_json::from_value::<T>(value) {
                Ok(hit) => return Ok(hit),
                Err(e) => {
                    tracing::warn!(
                        operation = %self.inner.identity(),
                        key = %key,
                        error = %e,
                        "discarding cached value of unexpected shape"
                    );
                    self.store.delete(&key);
                },
            }
        }

        let result = self.inner.call(args).await?;

        match serde_json::to_value(&result) {
            Ok(value) => self.store.set(key, value, self.options.ttl),
            Err(e) => tracing::warn!(
                operation = %self.inner.identity(),
                error = %e,
                "result not cached: serialization failed"
            ),
        }

        Ok(result)
    }

    fn identity(&self) -> &OperationId {
        self.inner.identity()
    }
}

/// Computes the keys to invalidate from the arguments
pub type KeysFn<A> = Arc<dyn Fn(&A) -> Vec<String> + Send + Sync>;

/// Keys an [`InvalidatingOperation`] removes
pub enum InvalidationKeys<A> {
    /// Fixed list of keys
    Static(Vec<String>),
    /// Keys derived from the call arguments
    Dynamic(KeysFn<A>),
}

impl<A> InvalidationKeys<A> {
    /// Fixed keys
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Static(keys.into_iter().map(Into::into).collect())
    }

    /// Keys computed per call
    pub fn dynamic(f: impl Fn(&A) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    fn resolve(&self, args: &A) -> Vec<String> {
        match self {
            Self::Static(keys) => keys.clone(),
            Self::Dynamic(f) => f(args),
        }
    }
}

impl<A> Clone for InvalidationKeys<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(keys) => Self::Static(keys.clone()),
            Self::Dynamic(f) => Self::Dynamic(f.clone()),
        }
    }
}

/// Deletes cache keys after the wrapped operation succeeds.
pub struct InvalidatingOperation<O, A, T> {
    inner: O,
    store: Arc<CacheStore>,
    keys: InvalidationKeys<A>,
    _marker: PhantomData<fn() -> T>,
}

impl<O, A, T> InvalidatingOperation<O, A, T> {
    /// Wrap `inner`
    pub fn new(inner: O, store: Arc<CacheStore>, keys: InvalidationKeys<A>) -> Self {
        Self {
            inner,
            store,
            keys,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<O, A, T> Operation<A, T> for InvalidatingOperation<O, A, T>
where
    O: Operation<A, T>,
    A: Send + 'static,
    T: Send + 'static,
{
    async fn call(&self, args: A) -> Result<T> {
        // Derived before the call: the arguments are moved into it.
        let keys = self.keys.resolve(&args);

        let result = self.inner.call(args).await?;

        let removed = keys.iter().filter(|key| self.store.delete(key)).count();
        tracing::debug!(
            operation = %self.inner.identity(),
            requested = keys.len(),
            removed,
            "cache keys invalidated"
        );

        Ok(result)
    }

    fn identity(&self) -> &OperationId {
        self.inner.identity()
    }
}

/// Call counters kept by a [`TimedOperation`]
#[derive(Debug, Default)]
pub struct OperationTimings {
    calls: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl OperationTimings {
    fn record(&self, elapsed: Duration, failed: bool) {
        let micros = elapsed.as_micros() as u64;
        self.calls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Completed calls
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls that returned an error
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Sum of call durations
    pub fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed))
    }

    /// Longest call
    pub fn max(&self) -> Duration {
        Duration::from_micros(self.max_micros.load(Ordering::Relaxed))
    }

    /// Mean call duration
    pub fn average(&self) -> Duration {
        match self.calls() {
            0 => Duration::ZERO,
            n => self.total() / n as u32,
        }
    }
}

/// Measures each call and warns when one exceeds the threshold.
///
/// With a monitor attached every call is also recorded as [`QueryMetrics`]
/// under the operation identity (`Owner.name` as the collection), so slow
/// or failing service methods show up in the monitor's history and alerts.
pub struct TimedOperation<O, A, T> {
    inner: O,
    threshold: Duration,
    timings: Arc<OperationTimings>,
    monitor: Option<Arc<PerformanceMonitor>>,
    _marker: PhantomData<fn(A) -> T>,
}

impl<O, A, T> TimedOperation<O, A, T> {
    /// Wrap `inner`
    pub fn new(inner: O, threshold: Duration) -> Self {
        Self {
            inner,
            threshold,
            timings: Arc::new(OperationTimings::default()),
            monitor: None,
            _marker: PhantomData,
        }
    }

    /// Record every call with `monitor`
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Shared timing counters
    pub fn timings(&self) -> Arc<OperationTimings> {
        Arc::clone(&self.timings)
    }
}

#[async_trait]
impl<O, A, T> Operation<A, T> for TimedOperation<O, A, T>
where
    O: Operation<A, T>,
    A: Send + 'static,
    T: Send + 'static,
{
    async fn call(&self, args: A) -> Result<T> {
        let start = Instant::now();
        let result = self.inner.call(args).await;
        let elapsed = start.elapsed();

        self.timings.record(elapsed, result.is_err());
        if let Some(monitor) = &self.monitor {
            monitor.record_metrics(QueryMetrics {
                execution_time_ms: elapsed.as_millis() as u64,
                error: result.as_ref().err().map(|e| e.to_string()),
                ..QueryMetrics::new(self.inner.identity().to_string(), Vec::new())
            });
        }
        if elapsed > self.threshold {
            tracing::warn!(
                operation = %self.inner.identity(),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                failed = result.is_err(),
                "slow operation"
            );
        }

        result
    }

    fn identity(&self) -> &OperationId {
        self.inner.identity()
    }
}

/// Combinators for wrapping operations
pub trait OperationExt<A, T>: Operation<A, T> + Sized {
    /// Add read-through caching
    fn cached(
        self,
        store: Arc<CacheStore>,
        options: MethodCacheOptions<A>,
    ) -> CachedOperation<Self, A, T>
    where
        A: Serialize,
    {
        CachedOperation::new(self, store, options)
    }

    /// Invalidate `keys` after every successful call
    fn invalidating(
        self,
        store: Arc<CacheStore>,
        keys: InvalidationKeys<A>,
    ) -> InvalidatingOperation<Self, A, T> {
        InvalidatingOperation::new(self, store, keys)
    }

    /// Time calls, warning above `threshold`
    fn timed(self, threshold: Duration) -> TimedOperation<Self, A, T> {
        TimedOperation::new(self, threshold)
    }

    /// Time calls and record each one with `monitor`, warning above its
    /// slow-query threshold
    fn monitored(self, monitor: Arc<PerformanceMonitor>) -> TimedOperation<Self, A, T> {
        let threshold = Duration::from_millis(monitor.config().slow_query_ms);
        TimedOperation::new(self, threshold).with_monitor(monitor)
    }
}

impl<O, A, T> OperationExt<A, T> for O where O: Operation<A, T> {}
