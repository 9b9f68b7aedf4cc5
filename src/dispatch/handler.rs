//! Handler traits binding filters to effects

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::context::HandlerContext;
use super::effect::Effect;
use super::event::{EventName, EventParams};
use super::filter::{GlobalFilter, ObjectFilter};
use crate::error::panic_message;
use crate::host::{PixelBuffer, Rect, UiObject};

pub type EffectMap = HashMap<EventName, Effect>;

/// Reacts to events on individual UI objects.
///
/// Object handlers are shared with the capture loop, so they take `&self`
/// and keep any state behind their own synchronization.
pub trait ObjectHandler: Send + Sync {
    fn name(&self) -> &str;

    fn filter(&self) -> &ObjectFilter;

    fn effects(&self) -> &EffectMap;

    fn matches(&self, obj: Option<&UiObject>) -> bool {
        self.filter().matches(obj)
    }

    /// Fire the effect bound to `event`, if any
    fn handle_event(
        &self,
        ctx: &HandlerContext<'_>,
        event: &EventName,
        obj: Option<&UiObject>,
        params: &EventParams,
    ) {
        fire_effect(self.name(), self.effects(), ctx, event, obj, params);
    }

    /// Fresh pixels for the region this handler registered
    fn on_capture(&self, _ctx: &HandlerContext<'_>, _region: Rect, _buffer: &PixelBuffer) {}
}

/// Watches environment-wide conditions and fires its own events
pub trait GlobalHandler: Send {
    fn name(&self) -> &str;

    fn filter(&self) -> &GlobalFilter;

    fn effects(&self) -> &EffectMap;

    /// Check conditions and fire events; called once per tick while the filter matches
    fn run(&mut self, ctx: &HandlerContext<'_>);

    fn tick(&mut self, ctx: &HandlerContext<'_>) {
        if self.filter().matches(ctx.pointer_position()) {
            self.run(ctx);
        }
    }

    fn trigger_event(&self, ctx: &HandlerContext<'_>, event: &EventName, params: &EventParams) {
        fire_effect(self.name(), self.effects(), ctx, event, None, params);
    }
}

/// Run the effect bound to `event`. Failures and panics are logged here and
/// go no further.
pub fn fire_effect(
    handler_name: &str,
    effects: &EffectMap,
    ctx: &HandlerContext<'_>,
    event: &EventName,
    obj: Option<&UiObject>,
    params: &EventParams,
) {
    let Some(effect) = effects.get(event) else {
        return;
    };

    match catch_unwind(AssertUnwindSafe(|| effect.apply(ctx, obj, params))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("Effect '{}' failed in {} ({}): {}", event, handler_name, ctx.handler_id(), e);
        }
        Err(payload) => {
            log::error!(
                "Effect '{}' panicked in {} ({}): {}",
                event,
                handler_name,
                ctx.handler_id(),
                panic_message(payload.as_ref())
            );
        }
    }
}

/// Object handler with no behaviour beyond its effect table
pub struct BasicObjectHandler {
    name: String,
    filter: ObjectFilter,
    effects: EffectMap,
}

impl BasicObjectHandler {
    pub fn new(name: impl Into<String>, filter: ObjectFilter) -> Self {
        Self {
            name: name.into(),
            filter,
            effects: EffectMap::new(),
        }
    }

    pub fn on(mut self, event: EventName, effect: Effect) -> Self {
        self.effects.insert(event, effect);
        self
    }
}

impl ObjectHandler for BasicObjectHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self) -> &ObjectFilter {
        &self.filter
    }

    fn effects(&self) -> &EffectMap {
        &self.effects
    }
}
