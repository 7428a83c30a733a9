use anyhow::{anyhow, Context, Result};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tracing::*;

use crate::storage::{Beneath, EntryStorage};
use kernel::prelude::*;

/// One unit of work against a directory: its own storage handle plus the
/// overlay chain of the store it was opened on. Not shared across threads.
pub struct Session {
    storage: Rc<dyn EntryStorage>,
    schema: Arc<Schema>,
    access: Arc<dyn AccessControl>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Session {
    pub(crate) fn new(
        storage: Rc<dyn EntryStorage>,
        attachment: &Attachment,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            storage,
            schema: Arc::clone(&attachment.schema),
            access: Arc::clone(&attachment.access),
            middleware,
        })
    }

    pub fn add(&self, principal: Principal, entry: Entry) -> Result<Entry> {
        match self.perform(Operation::Add(AddRequest::new(principal, entry)))? {
            Effect::Added(entry) => Ok(entry),
            effect => Err(anyhow!("Unexpected effect {:?}", effect)),
        }
    }

    pub fn search(&self, request: SearchRequest) -> Result<Vec<Entry>> {
        match self.perform(Operation::Search(request))? {
            Effect::Entries(entries) => Ok(entries),
            effect => Err(anyhow!("Unexpected effect {:?}", effect)),
        }
    }

    pub fn delete(&self, principal: Principal, dn: Dn) -> Result<()> {
        match self.perform(Operation::Delete(DeleteRequest { principal, dn }))? {
            Effect::Deleted(_) => Ok(()),
            effect => Err(anyhow!("Unexpected effect {:?}", effect)),
        }
    }

    pub fn perform(&self, operation: Operation) -> Result<Effect> {
        let started = Instant::now();
        let _span = span!(Level::INFO, "session", op = operation.name()).entered();

        self.storage.begin()?;

        let beneath = Beneath(self.storage.as_ref());
        let performed = apply_middleware(&self.middleware, &beneath, operation, |operation| {
            self.execute(operation)
        });

        let elapsed = format!("{:?}", started.elapsed());

        match performed {
            Ok(effect) => {
                self.storage.commit()?;

                debug!(%elapsed, "done");

                Ok(effect)
            }
            Err(e) => {
                let benign = e.downcast_ref::<DirectoryError>().is_some();
                self.storage.rollback(benign)?;

                info!(%elapsed, "failed: {}", e);

                Err(e)
            }
        }
    }

    fn execute(&self, operation: Operation) -> Result<Effect> {
        match operation {
            Operation::Add(add) => {
                let AddRequest { principal, entry } = add;

                if !self.access.can_write(&principal, &entry) {
                    return Err(DirectoryError::InsufficientAccess(entry.dn().clone()).into());
                }

                self.schema
                    .check(&entry)
                    .map_err(DirectoryError::ObjectClassViolation)?;

                self.storage
                    .add(&entry)
                    .with_context(|| format!("Adding {}", entry.dn()))?;

                info!(dn = %entry.dn(), "added");

                Ok(Effect::Added(entry))
            }
            Operation::Search(request) => {
                let entries = Beneath(self.storage.as_ref()).search_all(&request)?;

                debug!(filter = %request.filter, found = entries.len(), "searched");

                Ok(Effect::Entries(entries))
            }
            Operation::Delete(delete) => {
                let DeleteRequest { principal, dn } = delete;

                let entry = self
                    .storage
                    .load(&dn)?
                    .ok_or_else(|| DirectoryError::NoSuchEntry(dn.clone()))?;

                if !self.access.can_write(&principal, &entry) {
                    return Err(DirectoryError::InsufficientAccess(dn).into());
                }

                self.storage.delete(&dn)?;

                info!(%dn, "deleted");

                Ok(Effect::Deleted(dn))
            }
        }
    }
}
