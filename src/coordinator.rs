//! Pointer polling and enter/leave detection
//!
//! Each tick resolves the object under the pointer and compares its identity
//! with the previous tick's. A change fires `leave` on the old object, then
//! `enter` on the new one, before global handlers get their turn.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::dispatch::{ControllerServices, EventName, EventParams, HandlerManager};
use crate::error::panic_message;
use crate::host::{ObjectIdentity, UiObject};

pub(crate) fn lock_manager(manager: &Mutex<HandlerManager>) -> MutexGuard<'_, HandlerManager> {
    manager.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Coordinator {
    services: ControllerServices,
    manager: Arc<Mutex<HandlerManager>>,
    current_object: Option<UiObject>,
    current_id: Option<ObjectIdentity>,
}

impl Coordinator {
    pub fn new(services: ControllerServices, manager: Arc<Mutex<HandlerManager>>) -> Self {
        Self {
            services,
            manager,
            current_object: None,
            current_id: None,
        }
    }

    /// Object the pointer was over at the last tick
    pub fn current_object(&self) -> Option<&UiObject> {
        self.current_object.as_ref()
    }

    pub fn tick(&mut self) {
        let pointer = self.services.host.current_pointer_position();
        let mouse_object = self.services.host.object_under_point(pointer);
        let mouse_id = mouse_object.as_ref().map(ObjectIdentity::of);
        let params = EventParams::at(pointer);

        let mut manager = lock_manager(&self.manager);
        if mouse_id != self.current_id {
            if let Some(previous) = &self.current_object {
                manager.dispatch_object_event(&EventName::Leave, Some(previous), &params);
            }
            if let Some(next) = &mouse_object {
                manager.dispatch_object_event(&EventName::Enter, Some(next), &params);
            }
        }
        self.current_object = mouse_object;
        self.current_id = mouse_id;

        manager.dispatch_tick();
    }

    /// Tick until `running` is cleared
    pub fn spawn(mut self, running: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        let interval = self.services.settings.timing.tick_interval();
        thread::Builder::new()
            .name("touchpoint-tick".to_string())
            .spawn(move || {
                log::info!("Event loop started ({:?} tick)", interval);
                while running.load(Ordering::SeqCst) {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.tick())) {
                        log::error!("Tick panicked: {}", panic_message(payload.as_ref()));
                    }
                    thread::sleep(interval);
                }
                log::info!("Event loop stopped");
            })
    }
}
