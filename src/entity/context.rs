//! Two-phase loading
//!
//! Loading a table only reads raw rows. Every reference found along the way
//! is recorded here and resolved after the rows are in the cache, so that
//! entity types referencing each other load in any order. Target types
//! that are not loaded yet are loaded into the same context, appending their
//! own pending work to the queue.

use crate::persistence::Persistence;
use crate::Result;
use std::collections::VecDeque;
use std::sync::Arc;

/// Deferred write into an instance once its references are known.
pub(crate) type Assign<T> = Box<dyn FnOnce(&mut T)>;

/// Deferred lookup producing an `Assign`.
pub(crate) type Resolve<T> = Box<dyn FnOnce(&Persistence, &mut LoadContext) -> Result<Assign<T>>>;

type Pending = Box<dyn FnOnce(&Persistence, &mut LoadContext) -> Result<()>>;

/// A class taking part in a load.
pub(crate) trait LoadTracked: Send + Sync {
    fn table_name(&self) -> &str;

    /// Every reference is resolved; the class is usable.
    fn finish_load(&self);

    /// The load failed somewhere; drop whatever was cached.
    fn abort_load(&self);
}

/// State of one top-level load.
#[derive(Default)]
pub struct LoadContext {
    pending: VecDeque<Pending>,
    classes: Vec<Arc<dyn LoadTracked>>,
}

impl LoadContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn defer(
        &mut self,
        work: impl FnOnce(&Persistence, &mut LoadContext) -> Result<()> + 'static,
    ) {
        self.pending.push_back(Box::new(work));
    }

    pub(crate) fn track(&mut self, class: Arc<dyn LoadTracked>) {
        self.classes.push(class);
    }

    /// Number of unresolved entries.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Tables loaded in this context so far.
    pub fn tables(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.table_name()).collect()
    }

    /// Drain the queue, including work appended while draining.
    pub(crate) fn resolve(&mut self, persistence: &Persistence) -> Result<usize> {
        let mut resolved = 0;
        while let Some(work) = self.pending.pop_front() {
            work(persistence, self)?;
            resolved += 1;
        }
        Ok(resolved)
    }

    /// Publish or roll back every class loaded in this context.
    pub(crate) fn complete(self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                for class in &self.classes {
                    class.finish_load();
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("Load of {} failed: {}", self.tables().join(", "), e);
                for class in &self.classes {
                    class.abort_load();
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteProvider;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked {
        finished: AtomicUsize,
        aborted: AtomicUsize,
    }

    impl LoadTracked for Tracked {
        fn table_name(&self) -> &str {
            "tracked"
        }

        fn finish_load(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn abort_load(&self) {
            self.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked() -> Arc<Tracked> {
        Arc::new(Tracked {
            finished: AtomicUsize::new(0),
            aborted: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_resolve_drains_appended_work() {
        let persistence = Persistence::new(Arc::new(SqliteProvider::in_memory()));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = LoadContext::new();

        let first = order.clone();
        ctx.defer(move |_, ctx| {
            first.lock().push(1);
            let nested = first.clone();
            ctx.defer(move |_, _| {
                nested.lock().push(3);
                Ok(())
            });
            Ok(())
        });
        let second = order.clone();
        ctx.defer(move |_, _| {
            second.lock().push(2);
            Ok(())
        });

        assert_eq!(ctx.pending(), 2);
        assert_eq!(ctx.resolve(&persistence).unwrap(), 3);
        assert_eq!(*order.lock(), vec![1, 2, 3]);
        assert_eq!(ctx.pending(), 0);
    }

    #[test]
    fn test_complete_publishes_or_rolls_back() {
        let ok = tracked();
        let mut ctx = LoadContext::new();
        ctx.track(ok.clone());
        assert!(ctx.complete(Ok(())).is_ok());
        assert_eq!(ok.finished.load(Ordering::SeqCst), 1);

        let failed = tracked();
        let mut ctx = LoadContext::new();
        ctx.track(failed.clone());
        let err = ctx
            .complete(Err(crate::Error::store("global", "tracked", "load")))
            .unwrap_err();
        assert!(matches!(err, crate::Error::Store { .. }));
        assert_eq!(failed.aborted.load(Ordering::SeqCst), 1);
        assert_eq!(failed.finished.load(Ordering::SeqCst), 0);
    }
}
