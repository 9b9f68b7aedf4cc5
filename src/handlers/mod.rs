//! Concrete handlers and the stock handler table

mod border;
mod graphic;

use std::sync::Arc;

pub use border::ScreenBorderHandler;
pub use graphic::GraphicHandler;

use crate::dispatch::{Effect, EffectMap, EventName, GlobalHandler, ObjectHandler};

/// Graphic handler: a short buzz on entering an image, a softer one and a
/// return to neutral height on leaving
pub fn default_object_handlers() -> Vec<Arc<dyn ObjectHandler>> {
    let mut effects = EffectMap::new();
    effects.insert(
        EventName::Enter,
        Effect::Combo(vec![
            Effect::vibration(0.1, 180.0, 1),
            Effect::log("Mouse entered image"),
        ]),
    );
    effects.insert(
        EventName::Leave,
        Effect::Combo(vec![
            Effect::SetGlobalElevation(0.0),
            Effect::vibration(0.05, 80.0, 1),
            Effect::log("Mouse left image"),
        ]),
    );
    vec![Arc::new(GraphicHandler::new(effects))]
}

/// Screen border handler: continuous vibration while on an edge
pub fn default_global_handlers() -> Vec<Box<dyn GlobalHandler>> {
    let mut effects = EffectMap::new();
    effects.insert(
        EventName::BorderEnter,
        Effect::Combo(vec![
            Effect::vibration(0.1, 200.0, 0),
            Effect::log("Mouse entered screen border"),
        ]),
    );
    effects.insert(
        EventName::BorderLeave,
        Effect::Combo(vec![Effect::stop_vibration(), Effect::log("Mouse left screen border")]),
    );
    vec![Box::new(ScreenBorderHandler::new(effects))]
}
