use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerList<E> {
  next_id: u64,
  listeners: Vec<(u64, Listener<E>)>,
}

/// Change listeners for one kind of event.
pub struct Subscribers<E> {
  inner: Arc<Mutex<ListenerList<E>>>,
}

impl<E: 'static> Default for Subscribers<E> {
  fn default() -> Self {
    Self {
      inner: Arc::new(Mutex::new(ListenerList {
        next_id: 0,
        listeners: Vec::new(),
      })),
    }
  }
}

impl<E: 'static> Subscribers<E> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `listener`. It stays registered until the returned handle is dropped.
  pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
    let id = {
      let mut list = self.inner.lock();
      let id = list.next_id;
      list.next_id += 1;
      list.listeners.push((id, Arc::new(listener)));
      id
    };
    let weak: Weak<Mutex<ListenerList<E>>> = Arc::downgrade(&self.inner);
    Subscription {
      detach: Some(Box::new(move || {
        if let Some(inner) = weak.upgrade() {
          inner.lock().listeners.retain(|(l, _)| *l != id);
        }
      })),
    }
  }

  /// Call every listener. The list is copied first, so listeners may subscribe or unsubscribe.
  pub fn notify(&self, event: &E) {
    let listeners: Vec<Listener<E>> = self
      .inner
      .lock()
      .listeners
      .iter()
      .map(|(_, l)| l.clone())
      .collect();
    for l in listeners {
      l(event);
    }
  }

  pub fn len(&self) -> usize {
    self.inner.lock().listeners.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Registration handle; dropping it detaches the listener.
#[must_use = "dropping the subscription detaches the listener"]
pub struct Subscription {
  detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
  /// Keep the listener registered for as long as the source lives.
  pub fn forget(mut self) {
    self.detach = None;
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(detach) = self.detach.take() {
      detach();
    }
  }
}
