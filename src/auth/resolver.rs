//! Lazy, per-credential scope resolution with single-flight refresh.
//!
//! A [`ScopeResolver`] belongs to one client context. It asks a [`ScopeIntrospector`] which
//! scopes a credential carries, caches the answer keyed by the credential fingerprint, and
//! drops the entry when the executor observes a 401/403 for that credential. Concurrent
//! misses for the same credential queue behind a per-key guard so a burst after an
//! invalidation performs exactly one round trip.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credential, Scope, ScopeSet},
};

/// Boxed future returned by [`ScopeIntrospector::introspect`].
pub type IntrospectFuture<'a> = Pin<Box<dyn Future<Output = Result<ScopeSet>> + 'a + Send>>;

/// Source of truth for the scopes granted to a credential.
pub trait ScopeIntrospector
where
	Self: Send + Sync,
{
	/// Asks the remote which scopes `credential` carries.
	fn introspect<'a>(&'a self, credential: &'a Credential) -> IntrospectFuture<'a>;
}

/// Thread-safe counters describing resolver activity.
#[derive(Debug, Default)]
pub struct ResolverMetrics {
	resolutions: AtomicU64,
	hits: AtomicU64,
	invalidations: AtomicU64,
}
impl ResolverMetrics {
	/// Number of introspection round trips performed.
	pub fn resolutions(&self) -> u64 {
		self.resolutions.load(Ordering::Relaxed)
	}

	/// Number of lookups answered from the cache.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Number of entries dropped through [`ScopeResolver::invalidate`].
	pub fn invalidations(&self) -> u64 {
		self.invalidations.load(Ordering::Relaxed)
	}

	fn record_resolution(&self) {
		self.resolutions.fetch_add(1, Ordering::Relaxed);
	}

	fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	fn record_invalidation(&self) {
		self.invalidations.fetch_add(1, Ordering::Relaxed);
	}
}

type GuardMap = Mutex<HashMap<Arc<str>, Arc<AsyncMutex<()>>>>;

/// Credential → granted-scope cache.
#[derive(Default)]
pub struct ScopeResolver {
	cache: RwLock<HashMap<Arc<str>, ScopeSet>>,
	// Holds an entry only while a resolution for that key is running or queued.
	guards: GuardMap,
	// Bumped under the cache write lock; results resolved across a bump are not cached.
	generation: AtomicU64,
	/// Shared counters for resolutions, hits, and invalidations.
	pub metrics: ResolverMetrics,
}
impl ScopeResolver {
	/// Returns the scopes granted to `credential`, resolving them on a cache miss.
	pub async fn scopes_of(
		&self,
		introspector: &dyn ScopeIntrospector,
		credential: &Credential,
	) -> Result<ScopeSet> {
		if let Some(scopes) = self.cached(credential) {
			self.metrics.record_hit();

			return Ok(scopes);
		}

		let key = credential.fingerprint();
		let lease = self.lease(key);
		let _singleflight = lease.guard.lock().await;

		// Another caller may have resolved while this one waited on the guard.
		if let Some(scopes) = self.cached(credential) {
			self.metrics.record_hit();

			return Ok(scopes);
		}

		let generation = self.generation.load(Ordering::Acquire);

		self.metrics.record_resolution();

		let scopes = introspector.introspect(credential).await?;
		let mut cache = self.cache.write();

		if self.generation.load(Ordering::Acquire) == generation {
			cache.insert(Arc::clone(key), scopes.clone());
		}

		Ok(scopes)
	}

	/// Returns whether `credential` carries `scope`.
	pub async fn require(
		&self,
		introspector: &dyn ScopeIntrospector,
		credential: &Credential,
		scope: Scope,
	) -> Result<bool> {
		Ok(self.scopes_of(introspector, credential).await?.contains_scope(scope))
	}

	/// Returns whether `credential` carries at least one of `scopes`.
	///
	/// An empty `scopes` slice is trivially satisfied.
	pub async fn require_any(
		&self,
		introspector: &dyn ScopeIntrospector,
		credential: &Credential,
		scopes: &[Scope],
	) -> Result<bool> {
		if scopes.is_empty() {
			return Ok(true);
		}

		let granted = self.scopes_of(introspector, credential).await?;

		Ok(scopes.iter().any(|scope| granted.contains_scope(*scope)))
	}

	/// Drops the cached entry for `credential`; the next lookup re-resolves.
	pub fn invalidate(&self, credential: &Credential) {
		let mut cache = self.cache.write();

		self.generation.fetch_add(1, Ordering::AcqRel);

		if cache.remove(credential.fingerprint()).is_some() {
			self.metrics.record_invalidation();
		}
	}

	/// Cached scopes for `credential`, without resolving.
	pub fn cached(&self, credential: &Credential) -> Option<ScopeSet> {
		self.cache.read().get(credential.fingerprint()).cloned()
	}

	fn lease(&self, key: &Arc<str>) -> GuardLease<'_> {
		let mut guards = self.guards.lock();
		let guard =
			guards.entry(Arc::clone(key)).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone();

		GuardLease { guards: &self.guards, key: Arc::clone(key), guard }
	}
}
// Removes the single-flight entry once its last holder is gone, including on cancellation.
struct GuardLease<'a> {
	guards: &'a GuardMap,
	key: Arc<str>,
	guard: Arc<AsyncMutex<()>>,
}
impl Drop for GuardLease<'_> {
	fn drop(&mut self) {
		let mut guards = self.guards.lock();

		// Clones are only taken under this lock; two owners means the map and this lease.
		if Arc::strong_count(&self.guard) == 2 {
			guards.remove(&self.key);
		}
	}
}

impl Debug for ScopeResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ScopeResolver")
			.field("cached", &self.cache.read().len())
			.field("metrics", &self.metrics)
			.finish()
	}
}
