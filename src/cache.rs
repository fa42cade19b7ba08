use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::Result;
use crate::reflect::TypeInfo;

/// Memoizes converter resolution per type.
///
/// Both successes and failures are stored, so a type that cannot be handled
/// fails with the same error every time without being resolved again. The
/// cache is safe to share between threads. Two threads racing on the same
/// missing type may both build a converter; the last one stored wins, and
/// both results are equivalent.
#[derive(Debug)]
pub(crate) struct FactoryCache<T> {
    entries: DashMap<TypeId, Result<T>>,
}

impl<T> Default for FactoryCache<T> {
    fn default() -> Self {
        FactoryCache {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> FactoryCache<T> {
    pub(crate) fn get_or_build(
        &self,
        info: &TypeInfo,
        build: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        if let Some(entry) = self.entries.get(&info.type_id()) {
            return entry.value().clone();
        }

        // no shard lock may be held here: building a record resolves the
        // types of its fields through this same cache
        let built = build();
        match &built {
            Ok(_) => tracing::trace!(type_name = info.type_name(), "built converter"),
            Err(err) => tracing::debug!(
                type_name = info.type_name(),
                error = %err,
                "converter resolution failed, caching the error"
            ),
        }
        self.entries.insert(info.type_id(), built.clone());
        built
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A factory decorator answering from a [`FactoryCache`] and delegating
/// misses to the wrapped factory.
pub(crate) struct CachedFactory<F: ?Sized, T> {
    pub(crate) inner: Arc<F>,
    pub(crate) cache: FactoryCache<T>,
}

impl<F: ?Sized, T> CachedFactory<F, T> {
    pub(crate) fn new(inner: Arc<F>) -> Self {
        CachedFactory {
            inner,
            cache: FactoryCache::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;
    use crate::reflect::Reflect;

    #[test]
    fn builds_once_per_type() {
        let cache = FactoryCache::<Arc<str>>::default();
        let calls = AtomicUsize::new(0);
        let build = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::from("converter"))
        };

        let first = cache.get_or_build(&u8::type_info(), build).unwrap();
        let second = cache.get_or_build(&u8::type_info(), build).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.get_or_build(&u16::type_info(), build).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_cached() {
        let cache = FactoryCache::<()>::default();
        let calls = AtomicUsize::new(0);
        let build = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::UnhandledType("i32"))
        };

        let first = cache.get_or_build(&i32::type_info(), build).unwrap_err();
        let second = cache.get_or_build(&i32::type_info(), build).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_builds_do_not_deadlock() {
        let cache = FactoryCache::<u32>::default();
        let outer = cache
            .get_or_build(&Vec::<u8>::type_info(), || {
                let inner = cache.get_or_build(&u8::type_info(), || Ok(1))?;
                Ok(inner + 1)
            })
            .unwrap();
        assert_eq!(outer, 2);
    }
}
