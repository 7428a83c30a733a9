use anyhow::Result;
use std::rc::Rc;

use kernel::prelude::{Dn, Entry, EntrySearcher, SearchRequest};

pub trait EntryStorage {
    fn load(&self, dn: &Dn) -> Result<Option<Entry>>;
    /// Fails with `DirectoryError::AlreadyExists` for a taken DN.
    fn add(&self, entry: &Entry) -> Result<()>;
    fn delete(&self, dn: &Dn) -> Result<bool>;
    fn search(
        &self,
        request: &SearchRequest,
        visit: &mut dyn FnMut(&Entry) -> Result<()>,
    ) -> Result<()>;
    fn begin(&self) -> Result<()>;
    fn rollback(&self, benign: bool) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn query_all(&self) -> Result<Vec<Entry>>;
}

pub trait StorageFactory: Send + Sync {
    fn migrate(&self) -> Result<()>;

    fn create_storage(&self) -> Result<Rc<dyn EntryStorage>>;
}

/// Searches straight against storage, beneath any overlays.
pub struct Beneath<'a>(pub &'a dyn EntryStorage);

impl<'a> EntrySearcher for Beneath<'a> {
    fn search(
        &self,
        request: &SearchRequest,
        visit: &mut dyn FnMut(&Entry) -> Result<()>,
    ) -> Result<()> {
        self.0.search(request, visit)
    }
}

pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::*;
    use anyhow::anyhow;
    use kernel::prelude::{DirectoryError, SearchProgress};
    use tracing::*;

    type Entries = BTreeMap<String, Entry>;

    /// Entries kept in process, shared by every storage the factory creates.
    /// Transactions are accepted but provide no isolation.
    pub struct MemoryStorage {
        entries: Arc<Mutex<Entries>>,
    }

    impl MemoryStorage {
        fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
            self.entries
                .lock()
                .map_err(|_| anyhow!("Memory storage poisoned"))
        }
    }

    impl EntryStorage for MemoryStorage {
        fn load(&self, dn: &Dn) -> Result<Option<Entry>> {
            Ok(self.lock()?.get(&dn.normalized()).cloned())
        }

        fn add(&self, entry: &Entry) -> Result<()> {
            let mut entries = self.lock()?;
            let key = entry.dn().normalized();
            if entries.contains_key(&key) {
                return Err(DirectoryError::AlreadyExists(entry.dn().clone()).into());
            }

            debug!(dn = %entry.dn(), "inserting");

            entries.insert(key, entry.clone());

            Ok(())
        }

        fn delete(&self, dn: &Dn) -> Result<bool> {
            debug!(%dn, "deleting");

            Ok(self.lock()?.remove(&dn.normalized()).is_some())
        }

        fn search(
            &self,
            request: &SearchRequest,
            visit: &mut dyn FnMut(&Entry) -> Result<()>,
        ) -> Result<()> {
            trace!(filter = %request.filter, "searching");

            // Copied out so visitors never run under the storage lock.
            let candidates: Vec<Entry> = self
                .lock()?
                .values()
                .filter(|e| request.selects(e))
                .cloned()
                .collect();

            let mut progress = SearchProgress::new(request);
            for candidate in candidates.iter() {
                progress.offer(candidate, visit)?;
            }

            Ok(())
        }

        fn begin(&self) -> Result<()> {
            trace!("tx:begin");

            Ok(())
        }

        /// Logs only. Writes are applied immediately and are not undone, so
        /// callers must write last.
        fn rollback(&self, benign: bool) -> Result<()> {
            if benign {
                trace!("tx:rollback");
            } else {
                warn!("tx:rollback");
            }

            Ok(())
        }

        fn commit(&self) -> Result<()> {
            trace!("tx:commit");

            Ok(())
        }

        fn query_all(&self) -> Result<Vec<Entry>> {
            Ok(self.lock()?.values().cloned().collect())
        }
    }

    #[derive(Default)]
    pub struct Factory {
        entries: Arc<Mutex<Entries>>,
    }

    impl Factory {
        pub fn new() -> Arc<Factory> {
            Arc::new(Factory::default())
        }
    }

    impl StorageFactory for Factory {
        fn migrate(&self) -> Result<()> {
            Ok(())
        }

        fn create_storage(&self) -> Result<Rc<dyn EntryStorage>> {
            Ok(Rc::new(MemoryStorage {
                entries: Arc::clone(&self.entries),
            }))
        }
    }

}
