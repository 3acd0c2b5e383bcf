use std::sync::{Arc, Mutex, MutexGuard};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

/// Listener registry owned by whoever constructs it.
///
/// Listeners are called in subscription order, outside the registry lock, so
/// a listener may subscribe or unsubscribe while handling an event.
pub struct EventEmitter<E> {
    registry: Mutex<Registry<E>>,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let mut reg = self.registry();
        let id = ListenerId(reg.next_id);
        reg.next_id += 1;
        reg.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut reg = self.registry();
        let before = reg.listeners.len();
        reg.listeners.retain(|(lid, _)| *lid != id);
        reg.listeners.len() != before
    }

    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .registry()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listeners.len()
    }
}
