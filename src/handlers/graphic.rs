//! Elevation feedback over images

use crate::depth::{elevation_for_depth, DepthMap};
use crate::dispatch::{fire_effect, EffectMap, EventName, EventParams, HandlerContext, ObjectFilter, ObjectHandler};
use crate::host::{PixelBuffer, Rect, UiObject};

/// Watches the image under the pointer and turns its brightness into
/// elevation while the pointer stays on it
pub struct GraphicHandler {
    filter: ObjectFilter,
    effects: EffectMap,
}

impl GraphicHandler {
    pub fn new(effects: EffectMap) -> Self {
        Self::with_filter(ObjectFilter::graphic(), effects)
    }

    pub fn with_filter(filter: ObjectFilter, effects: EffectMap) -> Self {
        Self { filter, effects }
    }
}

impl ObjectHandler for GraphicHandler {
    fn name(&self) -> &str {
        "GraphicHandler"
    }

    fn filter(&self) -> &ObjectFilter {
        &self.filter
    }

    fn effects(&self) -> &EffectMap {
        &self.effects
    }

    fn handle_event(
        &self,
        ctx: &HandlerContext<'_>,
        event: &EventName,
        obj: Option<&UiObject>,
        params: &EventParams,
    ) {
        match event {
            EventName::Enter => {
                // Nothing to feel without a location; skip the enter effect too
                let Some(bounds) = obj.and_then(UiObject::capture_bounds) else {
                    return;
                };
                ctx.add_capture_region(bounds);
            }
            EventName::Leave => ctx.remove_capture_region(),
            _ => {}
        }
        fire_effect(self.name(), &self.effects, ctx, event, obj, params);
    }

    fn on_capture(&self, ctx: &HandlerContext<'_>, region: Rect, buffer: &PixelBuffer) {
        let depth = &ctx.settings().depth;
        let Some(map) = DepthMap::from_buffer(buffer, depth.blur_kernel, depth.invert) else {
            log::debug!("Empty capture for {:?}", region);
            return;
        };

        let value = map.sample_screen(region, ctx.pointer_position());
        ctx.driver().send_elevation(elevation_for_depth(value, depth.elevation_scale));
    }
}
