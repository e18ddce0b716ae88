//! Keyed cache of asynchronous values with a suspend-until-ready read.
//!
//! The first request for a [`ResourceKey`] starts the producer and parks a
//! pending entry; every later request for the key gets the same entry.
//! [`Resource::read`] hands out the value once settled, the error once failed,
//! and otherwise a [`Suspender`] the caller's scheduler can wait on before
//! rendering again. Entries settle exactly once and never change afterwards.

use crate::error::PlannerError;
use futures::future::{LocalBoxFuture, Shared};
use futures::{Future, FutureExt};
use log::{debug, error};
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// `"<operation>:<json args>"`, e.g. `fetchIndex:[]` or `route:["A","B",30600,4]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new<A>(operation: &str, args: &A) -> Result<Self, PlannerError>
    where
        A: Serialize + ?Sized,
    {
        Ok(ResourceKey(format!(
            "{}:{}",
            operation,
            serde_json::to_string(args)?
        )))
    }

    /// Key for an operation without arguments.
    pub fn unit(operation: &str) -> Self {
        ResourceKey(format!("{operation}:[]"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completes when the entry it was taken from has settled.
#[derive(Clone)]
pub struct Suspender(Shared<LocalBoxFuture<'static, ()>>);

impl Suspender {
    /// Whether both suspenders wait on the same underlying computation.
    pub fn same_as(&self, other: &Suspender) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }
}

impl Future for Suspender {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_unpin(cx)
    }
}

impl fmt::Debug for Suspender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Suspender")
    }
}

#[derive(Debug, Clone)]
pub enum ReadError {
    /// Not settled yet: wait on the suspender, then read again.
    Suspended(Suspender),
    Failed(PlannerError),
}

enum CacheEntry<T> {
    Pending(Suspender),
    Resolved(T),
    Rejected(PlannerError),
}

/// Handle to one cache entry.
pub struct Resource<T> {
    entry: Rc<RefCell<CacheEntry<T>>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Resource {
            entry: Rc::clone(&self.entry),
        }
    }
}

impl<T: Clone> Resource<T> {
    pub fn read(&self) -> Result<T, ReadError> {
        match &*self.entry.borrow() {
            CacheEntry::Pending(suspender) => Err(ReadError::Suspended(suspender.clone())),
            CacheEntry::Resolved(value) => Ok(value.clone()),
            CacheEntry::Rejected(err) => Err(ReadError::Failed(err.clone())),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.entry.borrow(), CacheEntry::Pending(_))
    }
}

type Spawn = Box<dyn Fn(LocalBoxFuture<'static, ()>)>;

pub struct ResourceCache {
    entries: RefCell<HashMap<ResourceKey, Box<dyn Any>>>,
    spawn: Spawn,
}

impl ResourceCache {
    /// `spawn` runs settle tasks on the caller's executor so producers make
    /// progress even before anyone waits on them.
    pub fn new(spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static) -> Self {
        ResourceCache {
            entries: RefCell::new(HashMap::new()),
            spawn: Box::new(spawn),
        }
    }

    /// Get the entry for `key`, invoking `producer` only if there is none.
    ///
    /// # Panics
    ///
    /// In debug builds, if `key` already holds a value of another type.
    pub fn resource<T, F, Fut>(&self, key: ResourceKey, producer: F) -> Resource<T>
    where
        T: Clone + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PlannerError>> + 'static,
    {
        if let Some(existing) = self.lookup::<T>(&key) {
            return existing;
        }

        debug!("Creating resource {}", key);
        let produced = producer();
        let entry = Rc::new_cyclic(|weak: &std::rc::Weak<RefCell<CacheEntry<T>>>| {
            let weak = weak.clone();
            let settle = async move {
                let outcome = produced.await;
                if let Some(entry) = weak.upgrade() {
                    *entry.borrow_mut() = match outcome {
                        Ok(value) => CacheEntry::Resolved(value),
                        Err(err) => CacheEntry::Rejected(err),
                    };
                }
            }
            .boxed_local()
            .shared();
            RefCell::new(CacheEntry::Pending(Suspender(settle)))
        });

        let resource = Resource { entry };
        if let Err(ReadError::Suspended(suspender)) = resource.read() {
            (self.spawn)(suspender.boxed_local());
        }
        self.entries
            .borrow_mut()
            .insert(key, Box::new(resource.clone()));
        resource
    }

    fn lookup<T: 'static>(&self, key: &ResourceKey) -> Option<Resource<T>> {
        let entries = self.entries.borrow();
        let existing = entries.get(key)?;
        match existing.downcast_ref::<Resource<T>>() {
            Some(resource) => Some(resource.clone()),
            None => {
                error!("Resource key {} reused for a different value type", key);
                if cfg!(debug_assertions) {
                    panic!("resource key {key} reused for a different value type");
                }
                None
            }
        }
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Forget every entry. Handles already given out keep working.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::cell::Cell;

    fn cache_on(pool: &LocalPool) -> ResourceCache {
        let spawner = pool.spawner();
        ResourceCache::new(move |task| spawner.spawn_local(task).expect("spawn settle task"))
    }

    fn suspender_of<T: Clone>(resource: &Resource<T>) -> Suspender {
        match resource.read() {
            Err(ReadError::Suspended(s)) => s,
            _ => panic!("expected a pending resource"),
        }
    }

    #[test]
    fn keys_serialize_operation_and_arguments() {
        assert_eq!(ResourceKey::unit("fetchIndex").as_str(), "fetchIndex:[]");
        let key = ResourceKey::new("route", &("A", "B", 30_600, 4)).unwrap();
        assert_eq!(key.as_str(), r#"route:["A","B",30600,4]"#);
        assert_ne!(key, ResourceKey::new("route", &("A", "B", 30_660, 4)).unwrap());
    }

    #[test]
    fn concurrent_reads_share_one_pending_future() {
        let mut pool = LocalPool::new();
        let cache = cache_on(&pool);
        let calls = Rc::new(Cell::new(0));
        let (tx, rx) = oneshot::channel::<Rc<String>>();
        let rx = RefCell::new(Some(rx));

        let request = || {
            let calls = Rc::clone(&calls);
            let rx = &rx;
            cache.resource(ResourceKey::unit("fetchIndex"), move || {
                calls.set(calls.get() + 1);
                let rx = rx.borrow_mut().take().expect("producer invoked twice");
                async move { rx.await.map_err(|_| PlannerError::ChannelClosed) }
            })
        };

        let first = request();
        let second = request();
        assert_eq!(calls.get(), 1);
        assert!(suspender_of(&first).same_as(&suspender_of(&second)));

        let value = Rc::new("index".to_string());
        tx.send(Rc::clone(&value)).unwrap();
        pool.run_until_stalled();

        let a = first.read().unwrap();
        let b = second.read().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a, &value));
        assert!(Rc::ptr_eq(&request().read().unwrap(), &value));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn suspender_completes_when_entry_settles() {
        let mut pool = LocalPool::new();
        let cache = cache_on(&pool);
        let (tx, rx) = oneshot::channel::<u32>();
        let resource = cache.resource(ResourceKey::unit("answer"), move || async move {
            rx.await.map_err(|_| PlannerError::ChannelClosed)
        });

        let suspender = suspender_of(&resource);
        tx.send(42).unwrap();
        pool.run_until(suspender);
        assert_eq!(resource.read().unwrap(), 42);
        assert!(!resource.is_pending());
    }

    #[test]
    fn failures_stick_without_retry() {
        let mut pool = LocalPool::new();
        let cache = cache_on(&pool);
        let calls = Cell::new(0);
        let request = || {
            cache.resource(ResourceKey::unit("broken"), || {
                calls.set(calls.get() + 1);
                async { Err::<u32, _>(PlannerError::Remote("no route".into())) }
            })
        };

        let resource = request();
        pool.run_until_stalled();
        for _ in 0..2 {
            match request().read() {
                Err(ReadError::Failed(err)) => {
                    assert_eq!(err, PlannerError::Remote("no route".into()))
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
        assert!(matches!(resource.read(), Err(ReadError::Failed(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn distinct_keys_do_not_share_entries() {
        let mut pool = LocalPool::new();
        let cache = cache_on(&pool);
        let a = cache.resource(ResourceKey::new("stop", &["A"]).unwrap(), || async { Ok(1u32) });
        let b = cache.resource(ResourceKey::new("stop", &["B"]).unwrap(), || async { Ok(2u32) });
        pool.run_until_stalled();

        assert_eq!(a.read().unwrap(), 1);
        assert_eq!(b.read().unwrap(), 2);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(a.read().unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "different value type")]
    fn reusing_a_key_for_another_type_fails_fast() {
        let pool = LocalPool::new();
        let cache = cache_on(&pool);
        let key = ResourceKey::unit("shared");
        let _ = cache.resource(key.clone(), || async { Ok(1u32) });
        let _ = cache.resource(key, || async { Ok("text".to_string()) });
    }
}
