//! Handler, filter and effect dispatch
//!
//! Filters decide whether a handler cares about the current object or
//! environment. Handlers map event names to effects. Effects turn into
//! hardware commands.

pub mod context;
pub mod effect;
pub mod event;
pub mod filter;
pub mod handler;
pub mod manager;

pub use context::{ControllerServices, HandlerContext, HandlerId};
pub use effect::{CustomEffect, Effect};
pub use event::{EventName, EventParams};
pub use filter::{GlobalFilter, ObjectFilter, RoleFilter};
pub use handler::{fire_effect, BasicObjectHandler, EffectMap, GlobalHandler, ObjectHandler};
pub use manager::HandlerManager;
