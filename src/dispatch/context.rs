//! What a handler may touch while it runs

use std::fmt;
use std::sync::Arc;

use super::handler::ObjectHandler;
use crate::capture::CaptureRegistry;
use crate::config::Settings;
use crate::hardware::HardwareDriver;
use crate::host::{Point, Rect, ScreenReaderHost};

/// Stable identity of a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub u32);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared controller pieces handed to every handler
#[derive(Clone)]
pub struct ControllerServices {
    pub host: Arc<dyn ScreenReaderHost>,
    pub driver: HardwareDriver,
    pub regions: CaptureRegistry,
    pub settings: Arc<Settings>,
}

/// Per-invocation view of the controller for one handler
pub struct HandlerContext<'a> {
    id: HandlerId,
    services: &'a ControllerServices,
    owner: Option<&'a Arc<dyn ObjectHandler>>,
}

impl<'a> HandlerContext<'a> {
    /// Context for an object handler, which may own a capture region
    pub fn for_object(id: HandlerId, services: &'a ControllerServices, owner: &'a Arc<dyn ObjectHandler>) -> Self {
        Self {
            id,
            services,
            owner: Some(owner),
        }
    }

    /// Context for a global handler
    pub fn for_global(id: HandlerId, services: &'a ControllerServices) -> Self {
        Self {
            id,
            services,
            owner: None,
        }
    }

    pub fn handler_id(&self) -> HandlerId {
        self.id
    }

    pub fn pointer_position(&self) -> Point {
        self.services.host.current_pointer_position()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.services.host.screen_size()
    }

    pub fn driver(&self) -> &HardwareDriver {
        &self.services.driver
    }

    pub fn settings(&self) -> &Settings {
        &self.services.settings
    }

    /// Start capturing `bounds` for this handler, replacing any region it
    /// already had. Returns false when the region cannot be registered.
    pub fn add_capture_region(&self, bounds: Rect) -> bool {
        let Some(owner) = self.owner else {
            log::warn!("Handler {} has no capture callback; region ignored", self.id);
            return false;
        };
        if bounds.is_empty() {
            log::debug!("Handler {} asked to capture empty region {:?}", self.id, bounds);
            return false;
        }
        self.services.regions.add(self.id, Arc::clone(owner), bounds);
        true
    }

    /// Stop capturing for this handler
    pub fn remove_capture_region(&self) {
        self.services.regions.remove(self.id);
    }
}
