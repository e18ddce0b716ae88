//! Exactly-once lazy initialization of an expensive shared value.
//!
//! The first caller runs the factory; everybody arriving before it settles
//! awaits the same [`Shared`] future. A success is kept for good. A failure is
//! handed to every waiter and then forgotten, so the next call retries.

use futures::future::{self, Either, LocalBoxFuture, Ready, Shared};
use futures::{Future, FutureExt};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

type InFlight<T, E> = Shared<LocalBoxFuture<'static, Result<T, E>>>;

/// Future returned by [`SingleFlight::get_or_init`]: ready at once when the
/// value already exists, otherwise the shared in-flight initialization.
pub type InitFuture<T, E> = Either<Ready<Result<T, E>>, InFlight<T, E>>;

enum InitState<T, E> {
    Unset,
    Initializing(InFlight<T, E>),
    Initialized(T),
}

pub struct SingleFlight<T, E> {
    state: Rc<RefCell<InitState<T, E>>>,
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        SingleFlight {
            state: Rc::new(RefCell::new(InitState::Unset)),
        }
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value, starting `factory` only if nothing is initialized or
    /// in flight.
    pub fn get_or_init<F, Fut>(&self, factory: F) -> InitFuture<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        match &*self.state.borrow() {
            InitState::Initialized(value) => return Either::Left(future::ready(Ok(value.clone()))),
            InitState::Initializing(in_flight) => return Either::Right(in_flight.clone()),
            InitState::Unset => {}
        }

        debug!("Starting single-flight initialization");
        let state = Rc::downgrade(&self.state);
        let in_flight = factory()
            .map(move |outcome| {
                if let Some(state) = state.upgrade() {
                    *state.borrow_mut() = match &outcome {
                        Ok(value) => InitState::Initialized(value.clone()),
                        Err(_) => {
                            debug!("Initialization failed, next call will retry");
                            InitState::Unset
                        }
                    };
                }
                outcome
            })
            .boxed_local()
            .shared();

        *self.state.borrow_mut() = InitState::Initializing(in_flight.clone());
        Either::Right(in_flight)
    }

    /// The initialized value, if initialization has completed.
    pub fn get(&self) -> Option<T> {
        match &*self.state.borrow() {
            InitState::Initialized(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_initializing(&self) -> bool {
        matches!(&*self.state.borrow(), InitState::Initializing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool};
    use std::cell::Cell;

    type Engine = Rc<String>;

    #[test]
    fn concurrent_callers_share_one_factory_run() {
        let flight: SingleFlight<Engine, String> = SingleFlight::new();
        let calls = Rc::new(Cell::new(0));
        let (tx, rx) = oneshot::channel::<Engine>();
        let rx = RefCell::new(Some(rx));

        let mut futures = Vec::new();
        for _ in 0..3 {
            let calls = Rc::clone(&calls);
            let rx = &rx;
            futures.push(flight.get_or_init(move || {
                calls.set(calls.get() + 1);
                let rx = rx.borrow_mut().take().expect("factory invoked twice");
                async move { rx.await.map_err(|_| "cancelled".to_string()) }
            }));
        }
        assert_eq!(calls.get(), 1);
        assert!(flight.is_initializing());

        let engine = Rc::new("E".to_string());
        tx.send(Rc::clone(&engine)).unwrap();

        let mut pool = LocalPool::new();
        let results = pool.run_until(future::join_all(futures));
        assert_eq!(results.len(), 3);
        for result in results {
            assert!(Rc::ptr_eq(&result.unwrap(), &engine));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn initialized_value_is_returned_without_suspending() {
        let flight: SingleFlight<Engine, String> = SingleFlight::new();
        let first = block_on(flight.get_or_init(|| async { Ok(Rc::new("E".to_string())) }));
        let first = first.unwrap();
        assert!(Rc::ptr_eq(&flight.get().unwrap(), &first));

        let ran = Cell::new(false);
        let again = flight
            .get_or_init(|| {
                ran.set(true);
                async { Err("factory ran twice".to_string()) }
            })
            .now_or_never()
            .expect("value should be ready immediately")
            .unwrap();
        assert!(Rc::ptr_eq(&again, &first));
        assert!(!ran.get());
    }

    #[test]
    fn failure_reaches_every_waiter_then_retries() {
        let flight: SingleFlight<Engine, String> = SingleFlight::new();
        let calls = Rc::new(Cell::new(0));

        let attempt = |outcome: Result<&'static str, &'static str>| {
            let calls = Rc::clone(&calls);
            flight.get_or_init(move || {
                calls.set(calls.get() + 1);
                async move {
                    outcome
                        .map(|v| Rc::new(v.to_string()))
                        .map_err(str::to_string)
                }
            })
        };

        let a = attempt(Err("fetch failed"));
        let b = attempt(Ok("never used"));
        let (a, b) = block_on(future::join(a, b));
        assert_eq!(a, Err("fetch failed".to_string()));
        assert_eq!(b, Err("fetch failed".to_string()));
        assert_eq!(calls.get(), 1);
        assert!(flight.get().is_none());

        let retried = block_on(attempt(Ok("E"))).unwrap();
        assert_eq!(*retried, "E");
        assert_eq!(calls.get(), 2);
    }
}
