//! Registry of handlers and the event fan-out over them

use std::sync::Arc;

use super::context::{ControllerServices, HandlerContext, HandlerId};
use super::event::{EventName, EventParams};
use super::handler::{GlobalHandler, ObjectHandler};
use crate::host::UiObject;

struct RegisteredObject {
    id: HandlerId,
    handler: Arc<dyn ObjectHandler>,
}

struct RegisteredGlobal {
    id: HandlerId,
    handler: Box<dyn GlobalHandler>,
}

/// Owns every handler for the controller's lifetime, in registration order
pub struct HandlerManager {
    services: ControllerServices,
    objects: Vec<RegisteredObject>,
    globals: Vec<RegisteredGlobal>,
    next_id: u32,
}

impl HandlerManager {
    pub fn new(services: ControllerServices) -> Self {
        Self {
            services,
            objects: Vec::new(),
            globals: Vec::new(),
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_object_handler(&mut self, handler: Arc<dyn ObjectHandler>) -> HandlerId {
        let id = self.allocate_id();
        log::debug!("Registered object handler {} ({})", id, handler.name());
        self.objects.push(RegisteredObject { id, handler });
        id
    }

    pub fn add_global_handler(&mut self, handler: Box<dyn GlobalHandler>) -> HandlerId {
        let id = self.allocate_id();
        log::debug!("Registered global handler {} ({})", id, handler.name());
        self.globals.push(RegisteredGlobal { id, handler });
        id
    }

    /// Register a batch of handlers in order
    pub fn populate(
        &mut self,
        objects: impl IntoIterator<Item = Arc<dyn ObjectHandler>>,
        globals: impl IntoIterator<Item = Box<dyn GlobalHandler>>,
    ) {
        for handler in objects {
            self.add_object_handler(handler);
        }
        for handler in globals {
            self.add_global_handler(handler);
        }
    }

    pub fn object_handler_count(&self) -> usize {
        self.objects.len()
    }

    pub fn global_handler_count(&self) -> usize {
        self.globals.len()
    }

    /// Deliver `event` to every object handler whose filter accepts `obj`
    pub fn dispatch_object_event(&self, event: &EventName, obj: Option<&UiObject>, params: &EventParams) {
        for entry in &self.objects {
            if !entry.handler.matches(obj) {
                continue;
            }
            let ctx = HandlerContext::for_object(entry.id, &self.services, &entry.handler);
            entry.handler.handle_event(&ctx, event, obj, params);
        }
    }

    /// Give every global handler its turn for this tick
    pub fn dispatch_tick(&mut self) {
        for entry in &mut self.globals {
            let ctx = HandlerContext::for_global(entry.id, &self.services);
            entry.handler.tick(&ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{BasicObjectHandler, Effect, EffectMap, GlobalFilter, ObjectFilter};
    use crate::error::EffectError;
    use crate::host::{Point, Rect, Role};
    use crate::testing::Harness;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, label: &str) -> Effect {
        let log = Arc::clone(log);
        let label = label.to_string();
        Effect::custom(move |_, _, _| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_in_registration_order_to_matching_only() {
        let harness = Harness::new();
        let log: Log = Arc::default();
        let mut manager = HandlerManager::new(harness.services.clone());

        manager.add_object_handler(Arc::new(
            BasicObjectHandler::new("all", ObjectFilter::MatchAll).on(EventName::Enter, recording(&log, "all")),
        ));
        manager.add_object_handler(Arc::new(
            BasicObjectHandler::new("graphic", ObjectFilter::graphic()).on(EventName::Enter, recording(&log, "graphic")),
        ));
        manager.add_object_handler(Arc::new(
            BasicObjectHandler::new("all-2", ObjectFilter::MatchAll).on(EventName::Enter, recording(&log, "all-2")),
        ));

        let button = UiObject::new(1).with_role(Role::Button);
        manager.dispatch_object_event(&EventName::Enter, Some(&button), &EventParams::default());
        assert_eq!(*log.lock().unwrap(), vec!["all", "all-2"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_next() {
        let harness = Harness::new();
        let log: Log = Arc::default();
        let mut manager = HandlerManager::new(harness.services.clone());
        manager.add_object_handler(Arc::new(BasicObjectHandler::new("bad", ObjectFilter::MatchAll).on(
            EventName::Leave,
            Effect::custom(|_, _, _| Err(EffectError::Failed("bad".to_string()))),
        )));
        manager.add_object_handler(Arc::new(
            BasicObjectHandler::new("good", ObjectFilter::MatchAll).on(EventName::Leave, recording(&log, "good")),
        ));

        let obj = UiObject::new(1);
        manager.dispatch_object_event(&EventName::Leave, Some(&obj), &EventParams::default());
        assert_eq!(*log.lock().unwrap(), vec!["good"]);
    }

    #[test]
    fn test_no_object_reaches_no_handler() {
        let harness = Harness::new();
        let log: Log = Arc::default();
        let mut manager = HandlerManager::new(harness.services.clone());
        manager.add_object_handler(Arc::new(
            BasicObjectHandler::new("all", ObjectFilter::MatchAll).on(EventName::Enter, recording(&log, "all")),
        ));
        manager.dispatch_object_event(&EventName::Enter, None, &EventParams::default());
        assert!(log.lock().unwrap().is_empty());
    }

    struct CountingGlobal {
        filter: GlobalFilter,
        effects: EffectMap,
        runs: Arc<Mutex<u32>>,
    }

    impl GlobalHandler for CountingGlobal {
        fn name(&self) -> &str {
            "counting"
        }
        fn filter(&self) -> &GlobalFilter {
            &self.filter
        }
        fn effects(&self) -> &EffectMap {
            &self.effects
        }
        fn run(&mut self, _ctx: &HandlerContext<'_>) {
            *self.runs.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_global_filter_gates_run() {
        let harness = Harness::new();
        let runs = Arc::new(Mutex::new(0));
        let mut manager = HandlerManager::new(harness.services.clone());
        manager.add_global_handler(Box::new(CountingGlobal {
            filter: GlobalFilter::PointerWithin(Rect::new(0, 0, 10, 10)),
            effects: EffectMap::new(),
            runs: Arc::clone(&runs),
        }));

        harness.host.set_pointer(Point::new(5, 5));
        manager.dispatch_tick();
        harness.host.set_pointer(Point::new(50, 5));
        manager.dispatch_tick();
        assert_eq!(*runs.lock().unwrap(), 1);
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let harness = Harness::new();
        let mut manager = HandlerManager::new(harness.services.clone());
        let a = manager.add_object_handler(Arc::new(BasicObjectHandler::new("a", ObjectFilter::MatchAll)));
        let b = manager.add_global_handler(Box::new(CountingGlobal {
            filter: GlobalFilter::MatchAll,
            effects: EffectMap::new(),
            runs: Arc::default(),
        }));
        assert_ne!(a, b);
        assert_eq!(manager.object_handler_count(), 1);
        assert_eq!(manager.global_handler_count(), 1);
    }
}
