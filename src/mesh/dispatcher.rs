//! Model handler table.
//!
//! Requests, state changes and scene recalls arrive tagged with a
//! (model, element) pair.  Each pair registered here owns a request
//! handler and optional change / recall handlers.  Handlers are plain
//! function pointers over a context `C` and the hardware `H`, so the
//! table is `Copy`-cheap and holds no borrows.

use heapless::Vec;
use log::{debug, info};

use super::models::{ModelId, ServerRequest, StateChange, StateRecall};
use crate::app::ports::MeshPort;
use crate::error::MeshError;

/// Handler table capacity.
pub const MAX_HANDLERS: usize = 16;

pub type RequestFn<C, H> = fn(&mut C, &mut H, &ServerRequest);
pub type ChangeFn<C, H> = fn(&mut C, &mut H, &StateChange);
pub type RecallFn<C, H> = fn(&mut C, &mut H, &StateRecall);

/// The callbacks of one registered server model.
pub struct ModelHandlers<C, H> {
    pub request: RequestFn<C, H>,
    pub change: Option<ChangeFn<C, H>>,
    pub recall: Option<RecallFn<C, H>>,
}

impl<C, H> ModelHandlers<C, H> {
    pub fn new(request: RequestFn<C, H>) -> Self {
        Self {
            request,
            change: None,
            recall: None,
        }
    }

    pub fn with_change(mut self, change: ChangeFn<C, H>) -> Self {
        self.change = Some(change);
        self
    }

    pub fn with_recall(mut self, recall: RecallFn<C, H>) -> Self {
        self.recall = Some(recall);
        self
    }
}

impl<C, H> Clone for ModelHandlers<C, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, H> Copy for ModelHandlers<C, H> {}

struct Entry<C, H> {
    model: ModelId,
    element: u16,
    handlers: ModelHandlers<C, H>,
}

pub struct Dispatcher<C, H> {
    entries: Vec<Entry<C, H>, MAX_HANDLERS>,
}

impl<C, H: MeshPort> Dispatcher<C, H> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register (or replace) the handlers of a (model, element) pair and
    /// announce it to the mesh library.
    pub fn register(
        &mut self,
        hw: &mut H,
        model: ModelId,
        element: u16,
        handlers: ModelHandlers<C, H>,
    ) -> Result<(), MeshError> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.model == model && e.element == element)
        {
            entry.handlers = handlers;
        } else {
            self.entries
                .push(Entry {
                    model,
                    element,
                    handlers,
                })
                .map_err(|_| MeshError::TableFull)?;
        }
        hw.register_model(model, element)?;
        info!("MESH | registered model {} on element {}", model, element);
        Ok(())
    }

    fn find(&self, model: ModelId, element: u16) -> Result<ModelHandlers<C, H>, MeshError> {
        self.entries
            .iter()
            .find(|e| e.model == model && e.element == element)
            .map(|e| e.handlers)
            .ok_or(MeshError::NoHandler)
    }

    pub fn is_registered(&self, model: ModelId, element: u16) -> bool {
        self.find(model, element).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn dispatch_request(
        &self,
        ctx: &mut C,
        hw: &mut H,
        req: &ServerRequest,
    ) -> Result<(), MeshError> {
        let handlers = self.find(req.model, req.element)?;
        debug!("MESH | request {} [{}] from 0x{:04x}", req.model, req.element, req.client);
        (handlers.request)(ctx, hw, req);
        Ok(())
    }

    /// Route a library-driven change.  A model without a change handler
    /// accepts the change silently.
    pub fn dispatch_change(
        &self,
        ctx: &mut C,
        hw: &mut H,
        change: &StateChange,
    ) -> Result<(), MeshError> {
        if let Some(change_fn) = self.find(change.model, change.element)?.change {
            change_fn(ctx, hw, change);
        }
        Ok(())
    }

    pub fn dispatch_recall(
        &self,
        ctx: &mut C,
        hw: &mut H,
        recall: &StateRecall,
    ) -> Result<(), MeshError> {
        if let Some(recall_fn) = self.find(recall.model, recall.element)?.recall {
            recall_fn(ctx, hw, recall);
        }
        Ok(())
    }
}

impl<C, H: MeshPort> Default for Dispatcher<C, H> {
    fn default() -> Self {
        Self::new()
    }
}
