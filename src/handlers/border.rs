use crate::dispatch::{EffectMap, EventName, EventParams, GlobalFilter, GlobalHandler, HandlerContext};
use crate::host::Point;

/// Fires `border_enter` when the pointer reaches a screen edge and
/// `border_leave` when it moves off
pub struct ScreenBorderHandler {
    filter: GlobalFilter,
    effects: EffectMap,
    on_border: bool,
}

impl ScreenBorderHandler {
    pub fn new(effects: EffectMap) -> Self {
        Self::with_filter(GlobalFilter::MatchAll, effects)
    }

    pub fn with_filter(filter: GlobalFilter, effects: EffectMap) -> Self {
        Self {
            filter,
            effects,
            on_border: false,
        }
    }

    pub fn is_on_border(&self) -> bool {
        self.on_border
    }
}

fn touches_edge(pointer: Point, (width, height): (u32, u32)) -> bool {
    let (max_x, max_y) = (width as i64 - 1, height as i64 - 1);
    let (x, y) = (pointer.x as i64, pointer.y as i64);
    x <= 0 || x >= max_x || y <= 0 || y >= max_y
}

impl GlobalHandler for ScreenBorderHandler {
    fn name(&self) -> &str {
        "ScreenBorderHandler"
    }

    fn filter(&self) -> &GlobalFilter {
        &self.filter
    }

    fn effects(&self) -> &EffectMap {
        &self.effects
    }

    fn run(&mut self, ctx: &HandlerContext<'_>) {
        let pointer = ctx.pointer_position();
        let on_border = touches_edge(pointer, ctx.screen_size());
        if on_border == self.on_border {
            return;
        }

        let event = if on_border {
            EventName::BorderEnter
        } else {
            EventName::BorderLeave
        };
        self.trigger_event(ctx, &event, &EventParams::at(pointer));
        self.on_border = on_border;
    }
}
