//! Shared screen-capture loop over handler-registered regions
//!
//! Handlers register at most one region each. A single loop thread captures
//! every registered region in turn and hands the pixels back to the owning
//! handler. The registry is copy-on-write so a pass always iterates a
//! consistent snapshot while handlers add and remove regions concurrently.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::dispatch::{ControllerServices, HandlerContext, HandlerId, ObjectHandler};
use crate::error::{panic_message, CaptureError};
use crate::host::{Rect, ScreenCapture};

/// A region being watched on behalf of a handler
#[derive(Clone)]
pub struct CaptureRegion {
    pub owner: Arc<dyn ObjectHandler>,
    pub bounds: Rect,
}

type RegionMap = BTreeMap<HandlerId, CaptureRegion>;

/// Handler id to region map, shared between handlers and the capture loop
#[derive(Clone, Default)]
pub struct CaptureRegistry {
    regions: Arc<Mutex<Arc<RegionMap>>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arc<RegionMap>> {
        self.regions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register or replace the region for `id`
    pub fn add(&self, id: HandlerId, owner: Arc<dyn ObjectHandler>, bounds: Rect) {
        let mut current = self.lock();
        let mut next = RegionMap::clone(&current);
        next.insert(id, CaptureRegion { owner, bounds });
        *current = Arc::new(next);
        log::debug!("Capture region for {} set to {:?}", id, bounds);
    }

    /// Returns whether a region was registered
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut current = self.lock();
        if !current.contains_key(&id) {
            return false;
        }
        let mut next = RegionMap::clone(&current);
        next.remove(&id);
        *current = Arc::new(next);
        log::debug!("Capture region for {} removed", id);
        true
    }

    /// Point-in-time view; later changes do not affect it
    pub fn snapshot(&self) -> Arc<RegionMap> {
        Arc::clone(&self.lock())
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn bounds_of(&self, id: HandlerId) -> Option<Rect> {
        self.lock().get(&id).map(|r| r.bounds)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        *self.lock() = Arc::new(RegionMap::new());
    }
}

/// Outcome of one capture pass
#[derive(Debug, Default)]
pub struct CapturePass {
    /// Handlers whose callback ran
    pub serviced: Vec<HandlerId>,
    /// Handlers unregistered between snapshot and callback
    pub skipped: Vec<HandlerId>,
    pub errors: Vec<CaptureError>,
}

/// Drives captures for every registered region
pub struct CaptureScheduler {
    services: ControllerServices,
    capture: Arc<dyn ScreenCapture>,
}

impl CaptureScheduler {
    pub fn new(services: ControllerServices, capture: Arc<dyn ScreenCapture>) -> Self {
        Self { services, capture }
    }

    /// Capture each region in the current snapshot once, in handler-id order
    pub fn run_pass(&self) -> CapturePass {
        let mut pass = CapturePass::default();
        let snapshot = self.services.regions.snapshot();

        for (&id, region) in snapshot.iter() {
            let bounds = region.bounds;
            let buffer = match catch_unwind(AssertUnwindSafe(|| self.capture.capture_region(bounds))) {
                Ok(Some(buffer)) => buffer,
                Ok(None) => {
                    log::debug!("Capture for {} returned nothing", id);
                    pass.errors.push(CaptureError::Empty(bounds));
                    continue;
                }
                Err(payload) => {
                    let error = CaptureError::Panicked {
                        region: bounds,
                        message: panic_message(payload.as_ref()),
                    };
                    log::error!("{}", error);
                    pass.errors.push(error);
                    continue;
                }
            };

            // The handler may have left its object while we were capturing
            if !self.services.regions.contains(id) {
                pass.skipped.push(id);
                continue;
            }

            let ctx = HandlerContext::for_object(id, &self.services, &region.owner);
            let result = catch_unwind(AssertUnwindSafe(|| region.owner.on_capture(&ctx, bounds, &buffer)));
            match result {
                Ok(()) => pass.serviced.push(id),
                Err(payload) => {
                    let error = CaptureError::Panicked {
                        region: bounds,
                        message: panic_message(payload.as_ref()),
                    };
                    log::error!("Capture callback of {} ({}): {}", id, region.owner.name(), error);
                    pass.errors.push(error);
                }
            }
        }
        pass
    }

    /// Run passes until `running` is cleared
    pub fn spawn(self, running: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("touchpoint-capture".to_string())
            .spawn(move || {
                let timing = self.services.settings.timing.clone();
                log::info!("Capture loop started");
                while running.load(Ordering::SeqCst) {
                    if self.services.regions.is_empty() {
                        thread::sleep(timing.capture_idle_interval());
                        continue;
                    }
                    self.run_pass();
                    thread::sleep(timing.capture_active_interval());
                }
                log::info!("Capture loop stopped");
            })
    }
}
