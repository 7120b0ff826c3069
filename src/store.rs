//! Observable state container shared by every UI-state slice of a room.
//!
//! A [`Store`] owns one plain record. Mutations go through [`Store::update`]
//! and are applied atomically under the watch channel's write lock, so
//! subscribers never observe a half-applied update. Each store owns its own
//! channel: two stores never influence each other except through explicit
//! code that reads one and writes the other.

use log::debug;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

type ChangeHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct StoreInner<T> {
    name: &'static str,
    tx: watch::Sender<T>,
    on_change: Option<ChangeHook<T>>,
}

/// Handle to an observable record. Cloning returns another handle to the
/// same store.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Store {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, initial: T) -> Self {
        Self::build(name, initial, None)
    }

    /// Creates a store whose `hook` runs after every mutation, in mutation
    /// order. The hook must not touch the store it is attached to.
    pub fn with_hook(
        name: &'static str,
        initial: T,
        hook: impl Fn(&T) + Send + Sync + 'static,
    ) -> Self {
        Self::build(name, initial, Some(Arc::new(hook)))
    }

    fn build(name: &'static str, initial: T, on_change: Option<ChangeHook<T>>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Store {
            inner: Arc::new(StoreInner {
                name,
                tx,
                on_change,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn get(&self) -> T {
        self.inner.tx.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.tx.borrow())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let hook = self.inner.on_change.as_ref();
        let mut result = None;

        self.inner.tx.send_modify(|state| {
            result = Some(f(state));
            if let Some(hook) = hook {
                hook(state);
            }
        });

        debug!("store {} updated", self.inner.name);

        match result {
            Some(result) => result,
            // send_modify always runs the closure exactly once.
            None => unreachable!("store update closure did not run"),
        }
    }

    /// Applies `f` and notifies only when it returns `true`. The hook runs
    /// for published changes only.
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let hook = self.inner.on_change.as_ref();

        self.inner.tx.send_if_modified(|state| {
            let modified = f(state);
            if modified {
                if let Some(hook) = hook {
                    hook(state);
                }
            }
            modified
        })
    }

    pub fn set(&self, value: T) {
        self.update(|state| *state = value);
    }

    /// Receiver that sees every value published after this call. Dropping it
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.tx.subscribe()
    }

    /// Stream of the current value followed by every later change.
    pub fn changes(&self) -> WatchStream<T> {
        WatchStream::new(self.subscribe())
    }

    /// Runs `f` on each change until the returned guard is dropped.
    pub fn on_change(&self, f: impl Fn(&T) + Send + 'static) -> Subscription {
        let mut rx = self.subscribe();
        let name = self.inner.name;

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                f(&value);
            }
            debug!("store {} closed, dropping subscriber", name);
        });

        Subscription { task }
    }

    pub fn same_store(&self, other: &Store<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Store<T> {
    pub fn with_default(name: &'static str) -> Self {
        Self::new(name, T::default())
    }
}

/// Keeps an [`Store::on_change`] listener alive.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stops the listener now instead of at the end of the scope.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
