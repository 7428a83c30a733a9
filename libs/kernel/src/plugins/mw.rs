// This started by copying from https://docs.rs/ureq/latest/src/ureq/middleware.rs.html#135-146

use std::sync::Arc;

use crate::model::EntrySearcher;
use crate::operations::{Effect, Operation};
use anyhow::Result;

pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, value: Operation, next: MiddlewareNext) -> Result<Effect, anyhow::Error>;
}

pub struct MiddlewareNext<'a> {
    pub chain: &'a mut (dyn Iterator<Item = &'a dyn Middleware>),
    // The store beneath every overlay. Searching through it never re-enters
    // the chain.
    pub searcher: &'a dyn EntrySearcher,
    // Since request_fn consumes the Operation, we must have an FnOnce.
    pub request_fn: Box<dyn FnOnce(Operation) -> Result<Effect, anyhow::Error> + 'a>,
}

impl<'a> MiddlewareNext<'a> {
    /// Continue the middleware chain by providing (a possibly amended) [`Operation`].
    pub fn handle(self, request: Operation) -> Result<Effect, anyhow::Error> {
        if let Some(step) = self.chain.next() {
            step.handle(request, self)
        } else {
            (self.request_fn)(request)
        }
    }

    pub fn searcher(&self) -> &'a dyn EntrySearcher {
        self.searcher
    }
}

pub fn apply_middleware<F>(
    all: &[Arc<dyn Middleware>],
    searcher: &dyn EntrySearcher,
    value: Operation,
    request_fn: F,
) -> Result<Effect>
where
    F: FnOnce(Operation) -> Result<Effect>,
{
    let chain = &mut all.iter().map(|mw| mw.as_ref());
    let next = MiddlewareNext {
        chain,
        searcher,
        request_fn: Box::new(request_fn),
    };

    next.handle(value)
}
