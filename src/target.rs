//! Read-only copy of a trainable module.
//!
//! The copy lives on the inner (non-autodiff) backend, so no gradient path
//! can reach it. It is refreshed by copying the trainable twin's weights
//! every `sync_interval` optimizer steps.

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use log::debug;
use std::marker::PhantomData;

pub struct FrozenTwin<B: AutodiffBackend, M: AutodiffModule<B>> {
    view: M::InnerModule,
    sync_interval: usize,
    updates_since_sync: usize,
    syncs: usize,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> FrozenTwin<B, M> {
    pub fn new(online: &M, sync_interval: usize) -> Self {
        assert!(sync_interval > 0, "sync_interval must be > 0");
        Self {
            view: online.valid(),
            sync_interval,
            updates_since_sync: 0,
            syncs: 1,
            _backend: PhantomData,
        }
    }

    pub fn view(&self) -> &M::InnerModule {
        &self.view
    }

    /// Overwrites the copy with the current weights of `online`.
    pub fn sync(&mut self, online: &M) {
        self.view = online.valid();
        self.updates_since_sync = 0;
        self.syncs += 1;
        debug!("FrozenTwin: synced (total syncs {})", self.syncs);
    }

    /// Counts one optimizer update; syncs when the interval is reached.
    /// Returns whether a sync happened.
    pub fn on_update(&mut self, online: &M) -> bool {
        self.updates_since_sync += 1;
        if self.updates_since_sync >= self.sync_interval {
            self.sync(online);
            true
        } else {
            false
        }
    }

    pub fn syncs(&self) -> usize {
        self.syncs
    }

    pub fn updates_since_sync(&self) -> usize {
        self.updates_since_sync
    }
}
