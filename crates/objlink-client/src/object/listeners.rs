use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Handle returned when registering a callback; pass it back to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Member name -> callbacks, in registration order.
pub struct ListenerSet<T> {
    map: Mutex<HashMap<String, Vec<(ListenerId, Callback<T>)>>>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, member: &str, f: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.lock()
            .entry(member.to_string())
            .or_default()
            .push((id, Arc::new(f)));
        id
    }

    /// Returns whether a callback was removed.
    pub fn off(&self, member: &str, id: ListenerId) -> bool {
        let mut map = self.lock();
        let Some(list) = map.get_mut(member) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(member);
        }
        removed
    }

    /// Invoke every callback for `member`; returns how many ran.
    /// Callbacks run outside the lock so they may register or remove listeners.
    pub fn emit(&self, member: &str, value: &T) -> usize {
        let callbacks: Vec<Callback<T>> = match self.lock().get(member) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        for cb in &callbacks {
            cb(value);
        }
        callbacks.len()
    }

    pub fn count(&self, member: &str) -> usize {
        self.lock().get(member).map(|l| l.len()).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(ListenerId, Callback<T>)>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_runs_in_registration_order() {
        let set: ListenerSet<i32> = ListenerSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            set.on("total", move |v| seen.lock().unwrap().push(format!("{tag}{v}")));
        }
        assert_eq!(set.emit("total", &7), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["a7", "b7"]);
    }

    #[test]
    fn off_removes_only_that_handle() {
        let set: ListenerSet<()> = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = {
            let hits = Arc::clone(&hits);
            set.on("cleared", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let h2 = {
            let hits = Arc::clone(&hits);
            set.on("cleared", move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };

        assert!(set.off("cleared", h1));
        assert!(!set.off("cleared", h1));
        assert!(!set.off("other", h2));
        set.emit("cleared", &());
        assert_eq!(hits.load(Ordering::SeqCst), 10);

        assert!(set.off("cleared", h2));
        assert_eq!(set.count("cleared"), 0);
        assert_eq!(set.emit("cleared", &()), 0);
    }

    #[test]
    fn callback_may_reenter_set() {
        let set: Arc<ListenerSet<u8>> = Arc::new(ListenerSet::new());
        let inner = Arc::clone(&set);
        set.on("x", move |_| {
            inner.on("y", |_| {});
        });
        set.emit("x", &0);
        assert_eq!(set.count("y"), 1);
    }
}
