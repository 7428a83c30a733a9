use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::*;

use crate::perms::AccessControl;
use crate::schema::Schema;

mod mw;

pub use mw::*;

/// Per-store context handed to overlays when they are attached.
#[derive(Clone)]
pub struct Attachment {
    pub schema: Arc<Schema>,
    pub access: Arc<dyn AccessControl>,
}

impl Attachment {
    pub fn new(schema: Arc<Schema>, access: Arc<dyn AccessControl>) -> Self {
        Self { schema, access }
    }
}

pub trait OverlayFactory: Send + Sync {
    /// Creates the overlay's state for one store. Failing here refuses the
    /// attachment.
    fn create_overlay(&self, attachment: &Attachment) -> Result<Box<dyn Overlay>>;
}

pub trait Overlay: Send + Sync {
    fn overlay_key() -> &'static str
    where
        Self: Sized;

    fn key(&self) -> &'static str;

    fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        vec![]
    }

    fn detach(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RegisteredOverlays {
    factories: Vec<Box<dyn OverlayFactory>>,
}

impl RegisteredOverlays {
    pub fn register<P>(&mut self, factory: P)
    where
        P: OverlayFactory + 'static,
    {
        self.factories.push(Box::new(factory))
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn attach(&self, attachment: &Attachment) -> Result<AttachedOverlays> {
        let mut overlays = Vec::new();
        for factory in self.factories.iter() {
            let started = Instant::now();
            let overlay = factory.create_overlay(attachment)?;
            let _span = span!(Level::INFO, "attach", overlay = overlay.key()).entered();
            let elapsed = Instant::now() - started;
            if elapsed.as_millis() > 200 {
                warn!("overlay:{} attached {:?}", overlay.key(), elapsed);
            } else {
                debug!("overlay:{} attached {:?}", overlay.key(), elapsed);
            }
            overlays.push(overlay);
        }

        Ok(AttachedOverlays { overlays })
    }
}

/// Overlays attached to one store, in registration order. The first
/// registered overlay sees operations first.
pub struct AttachedOverlays {
    overlays: Vec<Box<dyn Overlay>>,
}

impl AttachedOverlays {
    pub fn keys(&self) -> Vec<&'static str> {
        self.overlays.iter().map(|o| o.key()).collect()
    }

    pub fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        self.overlays
            .iter()
            .flat_map(|overlay| overlay.middleware())
            .collect()
    }

    pub fn detach(self) -> Result<()> {
        for overlay in self.overlays.iter().rev() {
            info!("overlay:{} detaching", overlay.key());
            overlay
                .detach()
                .with_context(|| format!("Detaching {}", overlay.key()))?;
        }
        Ok(())
    }
}
