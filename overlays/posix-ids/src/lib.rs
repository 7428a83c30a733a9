use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::*;

use kernel::prelude::*;

pub mod allocator;
pub mod collector;
pub mod interceptor;

pub use allocator::{AllocationError, IdAllocator};
pub use interceptor::{Assignment, AutoPosixIds, GID_NUMBER, POSIX_ACCOUNT, UID_NUMBER};

#[derive(Default)]
pub struct AutoPosixIdsFactory {}

impl OverlayFactory for AutoPosixIdsFactory {
    fn create_overlay(&self, attachment: &Attachment) -> Result<Box<dyn Overlay>> {
        let posix_account = attachment
            .schema
            .find_object_class(POSIX_ACCOUNT)
            .ok_or_else(|| anyhow!("Unable to find object class '{}'", POSIX_ACCOUNT))?;

        let scanned = attachment
            .schema
            .resolve(UID_NUMBER)
            .with_context(|| format!("Resolving {}", UID_NUMBER))?;

        let allocator = Arc::new(IdAllocator::new(scanned));
        let interceptor = Arc::new(AutoPosixIds::new(
            Arc::clone(&allocator),
            attachment,
            posix_account,
        ));

        Ok(Box::new(AutoPosixIdsOverlay {
            allocator,
            interceptor,
        }))
    }
}

/// Per-store state: the allocator lives exactly as long as the attachment.
pub struct AutoPosixIdsOverlay {
    allocator: Arc<IdAllocator>,
    interceptor: Arc<AutoPosixIds>,
}

impl AutoPosixIdsOverlay {
    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }
}

impl Overlay for AutoPosixIdsOverlay {
    fn overlay_key() -> &'static str
    where
        Self: Sized,
    {
        "autoPosixIds"
    }

    fn key(&self) -> &'static str {
        Self::overlay_key()
    }

    fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        vec![self.interceptor.clone()]
    }

    fn detach(&self) -> Result<()> {
        info!(
            high_water_mark = self.allocator.high_water_mark(),
            "detaching"
        );

        self.allocator.reset();

        Ok(())
    }
}

#[cfg(test)]
mod tests;
