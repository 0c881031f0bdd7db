//! At-most-once installation of generated types.
//!
//! Synthesis itself is pure and may run concurrently for the same key; only installation into
//! a loading context is serialized. The guard follows double-checked locking:
//!
//! 1. **Probing** - consult the record map, then ask the loading context whether the generated
//!    name is already loadable. A hit ends the request.
//! 2. The caller-supplied build runs outside any lock.
//! 3. **Installing** - take the install lock for the key's shard and probe again. A hit means
//!    another caller won; the fresh bytes are discarded. Otherwise install them.
//! 4. A [`crate::Error::DuplicateDefinition`] from the loading context means a definition
//!    slipped past the probe; the guard re-probes and returns the winner.
//!
//! Failures are never recorded, so a later request for the same key retries from scratch.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use dashmap::DashMap;
use strum::Display;

use crate::{
    file::ClassBytes,
    runtime::{ClassRef, ContextId, LoadingContext},
    Error, Result,
};

/// Cache key: original type and the loading context it was requested for.
pub(crate) type CacheKey = (String, ContextId);

/// Life cycle of one synthesis request, as traced by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum GuardState {
    Unrequested,
    Probing,
    Installing,
    Installed,
    Failed,
}

/// A snapshot of the guard's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered by a probe, before or under the lock
    pub probe_hits: usize,
    /// Types installed into a loading context
    pub installs: usize,
    /// Builds thrown away because the re-probe under the lock hit
    pub discarded_builds: usize,
    /// Duplicate-definition failures resolved by re-probing
    pub recovered_races: usize,
}

#[derive(Default)]
struct Counters {
    probe_hits: AtomicUsize,
    installs: AtomicUsize,
    discarded_builds: AtomicUsize,
    recovered_races: AtomicUsize,
}

/// Records of installed generated types and the install locks guarding them.
pub(crate) struct DefinitionCache {
    records: DashMap<CacheKey, ClassRef>,
    install_locks: Vec<Mutex<()>>,
    counters: Counters,
}

impl DefinitionCache {
    pub(crate) fn new(shards: usize) -> Self {
        DefinitionCache {
            records: DashMap::new(),
            install_locks: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
            counters: Counters::default(),
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            probe_hits: self.counters.probe_hits.load(Ordering::Relaxed),
            installs: self.counters.installs.load(Ordering::Relaxed),
            discarded_builds: self.counters.discarded_builds.load(Ordering::Relaxed),
            recovered_races: self.counters.recovered_races.load(Ordering::Relaxed),
        }
    }

    /// Number of recorded generated types.
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Return the generated type recorded for `key`, building and installing it if needed.
    pub(crate) fn get_or_install<F>(
        &self,
        key: CacheKey,
        generated_name: &str,
        context: &dyn LoadingContext,
        build: F,
    ) -> Result<ClassRef>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        transition(&key, GuardState::Unrequested);
        transition(&key, GuardState::Probing);
        let result = self.guarded(&key, generated_name, context, build);
        match &result {
            Ok(_) => transition(&key, GuardState::Installed),
            Err(error) => {
                tracing::trace!(original = %key.0, state = %GuardState::Failed, %error, "guard state");
            }
        }
        result
    }

    fn guarded<F>(
        &self,
        key: &CacheKey,
        generated_name: &str,
        context: &dyn LoadingContext,
        build: F,
    ) -> Result<ClassRef>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if let Some(hit) = self.probe(key, generated_name, context)? {
            self.counters.probe_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(original = %key.0, generated = generated_name, "cache hit");
            return Ok(hit);
        }

        let bytes = build()?;

        let _guard = lock!(self.install_lock(key));
        transition(key, GuardState::Installing);

        if let Some(hit) = self.probe(key, generated_name, context)? {
            self.counters.probe_hits.fetch_add(1, Ordering::Relaxed);
            self.counters.discarded_builds.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(original = %key.0, generated = generated_name, "discarding build, already installed");
            return Ok(hit);
        }

        match context.install(ClassBytes::from_vec(bytes)) {
            Ok(class) => {
                self.counters.installs.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    original = %key.0,
                    generated = generated_name,
                    context = key.1.value(),
                    "installed generated type"
                );
                self.records.insert(key.clone(), class.clone());
                Ok(class)
            }
            Err(Error::DuplicateDefinition(name)) => match context.lookup(generated_name)? {
                Some(class) => {
                    self.counters.recovered_races.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(original = %key.0, generated = generated_name, "recovered install race");
                    self.records.insert(key.clone(), class.clone());
                    Ok(class)
                }
                None => Err(Error::DuplicateDefinition(name)),
            },
            Err(error) => Err(error),
        }
    }

    fn probe(
        &self,
        key: &CacheKey,
        generated_name: &str,
        context: &dyn LoadingContext,
    ) -> Result<Option<ClassRef>> {
        if let Some(record) = self.records.get(key) {
            return Ok(Some(record.clone()));
        }
        let Some(class) = context.lookup(generated_name)? else {
            return Ok(None);
        };
        // keep the first record if another caller got here concurrently
        Ok(Some(self.records.entry(key.clone()).or_insert(class).clone()))
    }

    fn install_lock(&self, key: &CacheKey) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // the modulo keeps the index below the shard count
        #[allow(clippy::cast_possible_truncation)]
        let shard = (hasher.finish() % self.install_locks.len() as u64) as usize;
        &self.install_locks[shard]
    }
}

fn transition(key: &CacheKey, state: GuardState) {
    tracing::trace!(original = %key.0, context = key.1.value(), %state, "guard state");
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicBool, Arc, Barrier};

    use super::*;
    use crate::{
        classfile::ClassFileBuilder,
        runtime::{ClassPool, OBJECT},
    };

    fn generated(name: &str) -> Vec<u8> {
        ClassFileBuilder::new(name)
            .super_class(Some(OBJECT))
            .default_constructor()
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn second_request_is_a_probe_hit() {
        let pool = ClassPool::new().unwrap();
        let cache = DefinitionCache::new(1);
        let key = ("t/A".to_string(), pool.id());

        let first = cache
            .get_or_install(key.clone(), "t/A$$Impl", &pool, || Ok(generated("t/A$$Impl")))
            .unwrap();
        let second = cache
            .get_or_install(key, "t/A$$Impl", &pool, || panic!("must not rebuild"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                probe_hits: 1,
                installs: 1,
                ..CacheStats::default()
            }
        );
    }

    #[test]
    fn failures_are_not_cached() {
        let pool = ClassPool::new().unwrap();
        let cache = DefinitionCache::new(4);
        let key = ("t/B".to_string(), pool.id());

        let failed = cache.get_or_install(key.clone(), "t/B$$Impl", &pool, || {
            Err(Error::CodeGeneration("boom".to_string()))
        });
        assert!(matches!(failed, Err(Error::CodeGeneration(_))));
        assert_eq!(cache.len(), 0);

        cache
            .get_or_install(key, "t/B$$Impl", &pool, || Ok(generated("t/B$$Impl")))
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn preexisting_definitions_are_adopted() {
        let pool = ClassPool::new().unwrap();
        pool.add_class(generated("t/C$$Impl")).unwrap();
        let cache = DefinitionCache::new(1);

        let class = cache
            .get_or_install(("t/C".to_string(), pool.id()), "t/C$$Impl", &pool, || {
                panic!("must not build")
            })
            .unwrap();
        assert_eq!(class.name(), "t/C$$Impl");
        assert_eq!(cache.stats().installs, 0);
        assert_eq!(cache.stats().probe_hits, 1);
    }

    /// Pool whose first `misses` lookups report nothing, as if another context raced ahead.
    struct LaggingLookup<'a> {
        pool: &'a ClassPool,
        misses: AtomicUsize,
    }

    impl LoadingContext for LaggingLookup<'_> {
        fn id(&self) -> ContextId {
            self.pool.id()
        }

        fn read_type_bytes(&self, name: &str) -> Result<ClassBytes> {
            self.pool.read_type_bytes(name)
        }

        fn lookup(&self, name: &str) -> Result<Option<ClassRef>> {
            let hidden = self
                .misses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hidden {
                return Ok(None);
            }
            self.pool.lookup(name)
        }

        fn install(&self, bytes: ClassBytes) -> Result<ClassRef> {
            self.pool.install(bytes)
        }
    }

    #[test]
    fn duplicate_install_recovers_the_winner() {
        let pool = ClassPool::new().unwrap();
        pool.add_class(generated("t/E$$Impl")).unwrap();
        // both probes miss, the install collides, the follow-up lookup sees the winner
        let context = LaggingLookup {
            pool: &pool,
            misses: AtomicUsize::new(2),
        };
        let cache = DefinitionCache::new(1);

        let class = cache
            .get_or_install(("t/E".to_string(), pool.id()), "t/E$$Impl", &context, || {
                Ok(generated("t/E$$Impl"))
            })
            .unwrap();

        assert_eq!(class.name(), "t/E$$Impl");
        let stats = cache.stats();
        assert_eq!(stats.recovered_races, 1);
        assert_eq!(stats.installs, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn duplicate_install_without_winner_fails() {
        let pool = ClassPool::new().unwrap();
        pool.add_class(generated("t/F$$Impl")).unwrap();
        let context = LaggingLookup {
            pool: &pool,
            misses: AtomicUsize::new(usize::MAX),
        };
        let cache = DefinitionCache::new(1);

        let result = cache.get_or_install(("t/F".to_string(), pool.id()), "t/F$$Impl", &context, || {
            Ok(generated("t/F$$Impl"))
        });

        assert!(matches!(result, Err(Error::DuplicateDefinition(name)) if name == "t/F$$Impl"));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().recovered_races, 0);
    }

    #[test]
    fn concurrent_builds_converge() {
        const THREADS: usize = 8;
        let pool = ClassPool::new().unwrap();
        let cache = DefinitionCache::new(1);
        let barrier = Barrier::new(THREADS);
        let built = AtomicBool::new(false);

        let classes: Vec<ClassRef> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_install(("t/D".to_string(), pool.id()), "t/D$$Impl", &pool, || {
                                built.store(true, Ordering::SeqCst);
                                Ok(generated("t/D$$Impl"))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(built.load(Ordering::SeqCst));
        assert!(classes.iter().all(|c| Arc::ptr_eq(c, &classes[0])));
        let stats = cache.stats();
        assert_eq!(stats.installs, 1);
        assert_eq!(stats.installs + stats.probe_hits, THREADS);
    }
}
