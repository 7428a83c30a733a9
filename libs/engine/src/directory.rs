use anyhow::{anyhow, Result};
use std::rc::Rc;
use std::sync::{Arc, RwLock};
use tracing::info;

use super::Session;
use crate::storage::StorageFactory;
use kernel::prelude::*;

pub trait SessionOpener: Send + Sync + Clone {
    fn open_session(&self) -> Result<Rc<Session>>;
}

struct Attached {
    overlays: AttachedOverlays,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// A store with its overlays attached. Cheap to clone, every clone shares
/// the same overlay instances and so the same overlay state.
#[derive(Clone)]
pub struct Directory {
    storage_factory: Arc<dyn StorageFactory>,
    attachment: Attachment,
    attached: Arc<RwLock<Option<Attached>>>,
}

impl Directory {
    pub fn attach(
        storage_factory: Arc<dyn StorageFactory>,
        schema: Arc<Schema>,
        access: Arc<dyn AccessControl>,
        overlays: &RegisteredOverlays,
    ) -> Result<Self> {
        let attachment = Attachment::new(schema, access);
        let overlays = overlays.attach(&attachment)?;
        let middleware = overlays.middleware();

        info!(overlays = ?overlays.keys(), "directory-attach");

        Ok(Self {
            storage_factory,
            attachment,
            attached: Arc::new(RwLock::new(Some(Attached {
                overlays,
                middleware,
            }))),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.attachment.schema
    }

    pub fn overlay_keys(&self) -> Result<Vec<&'static str>> {
        let attached = self
            .attached
            .read()
            .map_err(|_| anyhow!("Directory poisoned"))?;

        Ok(attached
            .as_ref()
            .map(|a| a.overlays.keys())
            .unwrap_or_default())
    }

    pub fn query_all(&self) -> Result<Vec<Entry>> {
        let storage = self.storage_factory.create_storage()?;
        storage.query_all()
    }

    /// Tears the overlays down, last registered first. Sessions opened
    /// afterwards fail with `DirectoryError::Detached`.
    pub fn detach(&self) -> Result<()> {
        let taken = self
            .attached
            .write()
            .map_err(|_| anyhow!("Directory poisoned"))?
            .take();

        match taken {
            Some(attached) => {
                info!("directory-detach");

                attached.overlays.detach()
            }
            None => Ok(()),
        }
    }
}

impl SessionOpener for Directory {
    fn open_session(&self) -> Result<Rc<Session>> {
        let middleware = match self
            .attached
            .read()
            .map_err(|_| anyhow!("Directory poisoned"))?
            .as_ref()
        {
            Some(attached) => attached.middleware.clone(),
            None => return Err(DirectoryError::Detached.into()),
        };

        info!("session-open");

        let storage = self.storage_factory.create_storage()?;

        Ok(Session::new(storage, &self.attachment, middleware))
    }
}
