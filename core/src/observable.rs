//! Minimal reactive store primitive.
//!
//! A [`Writable`] owns a value and a list of observers. Every committed change
//! is pushed to the observers through a FIFO delivery queue, so a mutation made
//! from inside an observer never overtakes notifications that are already
//! pending: each observer sees states in the order they were committed.
//! Mutations from other threads wait for the running delivery to finish, so
//! every `set`/`update` returns only after its notifications were delivered.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    value: Arc<T>,
    observers: Vec<(u64, Observer<T>)>,
    next_id: u64,
}

struct Delivery<T> {
    pending: VecDeque<(Observer<T>, Arc<T>)>,
    flushing: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    delivery: Mutex<Delivery<T>>,
    // Held by the draining thread. Other threads wait on it, so their own
    // notifications have run by the time their mutation returns.
    dispatch: ReentrantMutex<()>,
}

impl<T> Shared<T> {
    // Called with the slot lock held so queue order matches commit order.
    fn enqueue_all(&self, slot: &Slot<T>) {
        let mut delivery = self.delivery.lock();
        for (_, observer) in &slot.observers {
            delivery
                .pending
                .push_back((observer.clone(), slot.value.clone()));
        }
    }

    fn flush(&self) {
        let _dispatch = self.dispatch.lock();
        {
            let mut delivery = self.delivery.lock();
            if delivery.flushing {
                return;
            }
            delivery.flushing = true;
        }
        let guard = FlushGuard {
            delivery: &self.delivery,
            armed: true,
        };
        loop {
            let next = {
                let mut delivery = self.delivery.lock();
                match delivery.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        // Cleared under the lock that saw the queue empty.
                        delivery.flushing = false;
                        break;
                    }
                }
            };
            let (observer, value) = next;
            observer(&value);
        }
        guard.disarm();
    }

    fn detach(&self, id: u64) {
        self.slot.lock().observers.retain(|(existing, _)| *existing != id);
    }
}

// Resets the flushing flag if an observer panics mid-flush.
struct FlushGuard<'a, T> {
    delivery: &'a Mutex<Delivery<T>>,
    armed: bool,
}

impl<T> FlushGuard<'_, T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for FlushGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.delivery.lock().flushing = false;
        }
    }
}

/// Handle returned by `subscribe`. The observer stays attached until the handle
/// is dropped or [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a Subscription detaches its observer"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// Shared, observable value. Cloning the handle shares the same value.
pub struct Writable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Writable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    value: Arc::new(value),
                    observers: Vec::new(),
                    next_id: 0,
                }),
                delivery: Mutex::new(Delivery {
                    pending: VecDeque::new(),
                    flushing: false,
                }),
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    /// Registers `observer`, calls it right away with the current value and
    /// then after every committed change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let observer: Observer<T> = Arc::new(observer);
        let id = {
            let mut slot = self.shared.slot.lock();
            let id = slot.next_id;
            slot.next_id += 1;
            slot.observers.push((id, observer.clone()));
            self.shared
                .delivery
                .lock()
                .pending
                .push_back((observer, slot.value.clone()));
            id
        };
        self.shared.flush();

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.detach(id);
                }
            })),
        }
    }

    pub fn set(&self, value: T) {
        {
            let mut slot = self.shared.slot.lock();
            slot.value = Arc::new(value);
            self.shared.enqueue_all(&slot);
        }
        self.shared.flush();
    }

    /// Replaces the value with `transform(current)`.
    pub fn update<F>(&self, transform: F)
    where
        F: FnOnce(T) -> T,
    {
        {
            let mut slot = self.shared.slot.lock();
            let current = (*slot.value).clone();
            slot.value = Arc::new(transform(current));
            self.shared.enqueue_all(&slot);
        }
        self.shared.flush();
    }

    /// Applies `mutate` to a copy of the value. The copy is committed and
    /// observers are notified only when `mutate` returns `Ok`.
    pub fn try_update<R, E, F>(&self, mutate: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let output = {
            let mut slot = self.shared.slot.lock();
            let mut draft = (*slot.value).clone();
            let output = mutate(&mut draft)?;
            slot.value = Arc::new(draft);
            self.shared.enqueue_all(&slot);
            output
        };
        self.shared.flush();
        Ok(output)
    }

    pub fn get(&self) -> T {
        (*self.shared.slot.lock().value).clone()
    }

    /// Reads the current value without cloning it.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        let value = self.shared.slot.lock().value.clone();
        read(&value)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.slot.lock().observers.len()
    }

    pub fn readonly(&self) -> Readable<T> {
        Readable {
            inner: self.clone(),
        }
    }
}

/// Read-only view over a [`Writable`].
pub struct Readable<T> {
    inner: Writable<T>,
}

impl<T> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Readable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Writable::new(value).readonly()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.subscribe(observer)
    }

    pub fn get(&self) -> T {
        self.inner.get()
    }

    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        self.inner.with(read)
    }
}
