//! Haptic actions bound to events
//!
//! Effects are fire-and-forget commands into the hardware driver. They never
//! wait on the device; the driver drops what it cannot deliver.

use std::fmt;
use std::sync::Arc;

use super::event::EventParams;
use super::context::HandlerContext;
use crate::error::EffectError;
use crate::host::UiObject;

/// User-supplied effect body
pub type CustomEffect =
    Arc<dyn Fn(&HandlerContext<'_>, Option<&UiObject>, &EventParams) -> Result<(), EffectError> + Send + Sync>;

#[derive(Clone)]
pub enum Effect {
    /// `duration_pulses == 0` vibrates until replaced; all zeros stops
    Vibration {
        amplitude: f32,
        frequency_hz: f32,
        duration_pulses: i16,
    },
    /// Replace the current elevation
    SetGlobalElevation(f32),
    /// Shift the current elevation
    AddElevationOffset(f32),
    /// Run in order, stopping at the first failure
    Combo(Vec<Effect>),
    /// Log a line about the subject
    Log(String),
    Custom(CustomEffect),
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Vibration {
                amplitude,
                frequency_hz,
                duration_pulses,
            } => write!(f, "Vibration({}, {}Hz, {})", amplitude, frequency_hz, duration_pulses),
            Effect::SetGlobalElevation(v) => write!(f, "SetGlobalElevation({})", v),
            Effect::AddElevationOffset(d) => write!(f, "AddElevationOffset({})", d),
            Effect::Combo(effects) => f.debug_tuple("Combo").field(effects).finish(),
            Effect::Log(message) => write!(f, "Log({:?})", message),
            Effect::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Effect {
    pub fn vibration(amplitude: f32, frequency_hz: f32, duration_pulses: i16) -> Self {
        Effect::Vibration {
            amplitude,
            frequency_hz,
            duration_pulses,
        }
    }

    /// Explicit zero vibration, always transmitted
    pub fn stop_vibration() -> Self {
        Self::vibration(0.0, 0.0, 0)
    }

    pub fn log(message: impl Into<String>) -> Self {
        Effect::Log(message.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&HandlerContext<'_>, Option<&UiObject>, &EventParams) -> Result<(), EffectError> + Send + Sync + 'static,
    {
        Effect::Custom(Arc::new(f))
    }

    pub fn apply(
        &self,
        ctx: &HandlerContext<'_>,
        obj: Option<&UiObject>,
        params: &EventParams,
    ) -> Result<(), EffectError> {
        match self {
            Effect::Vibration {
                amplitude,
                frequency_hz,
                duration_pulses,
            } => {
                validate_vibration(*amplitude, *frequency_hz, *duration_pulses)?;
                ctx.driver().send_vibration(*amplitude, *frequency_hz, *duration_pulses);
                Ok(())
            }
            Effect::SetGlobalElevation(value) => {
                finite("elevation", *value)?;
                ctx.driver().send_elevation(*value);
                Ok(())
            }
            Effect::AddElevationOffset(delta) => {
                finite("elevation offset", *delta)?;
                ctx.driver().add_elevation_offset(*delta);
                Ok(())
            }
            Effect::Combo(effects) => {
                for effect in effects {
                    effect.apply(ctx, obj, params)?;
                }
                Ok(())
            }
            Effect::Log(message) => {
                match obj {
                    Some(obj) => log::info!("{}", describe_subject(message, obj)),
                    None => log::info!("{}", message),
                }
                Ok(())
            }
            Effect::Custom(f) => f(ctx, obj, params),
        }
    }
}

fn finite(what: &str, value: f32) -> Result<(), EffectError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EffectError::InvalidParameter(format!("{} must be finite, got {}", what, value)))
    }
}

fn validate_vibration(amplitude: f32, frequency_hz: f32, duration_pulses: i16) -> Result<(), EffectError> {
    if !(0.0..=1.0).contains(&amplitude) {
        return Err(EffectError::InvalidParameter(format!(
            "amplitude {} outside [0, 1]",
            amplitude
        )));
    }
    finite("frequency", frequency_hz)?;
    if frequency_hz < 0.0 {
        return Err(EffectError::InvalidParameter(format!(
            "negative frequency {}",
            frequency_hz
        )));
    }
    if frequency_hz == 0.0 && amplitude != 0.0 {
        return Err(EffectError::InvalidParameter(
            "zero frequency with nonzero amplitude".to_string(),
        ));
    }
    if duration_pulses < 0 {
        return Err(EffectError::InvalidParameter(format!(
            "negative duration {}",
            duration_pulses
        )));
    }
    Ok(())
}

fn describe_subject(message: &str, obj: &UiObject) -> String {
    let role = obj.role.map(|r| r.display_name()).unwrap_or_else(|| "unknown".to_string());
    match obj.bounds {
        Some(b) => format!(
            "{}: {} ({}) at ({}, {}, {}x{})",
            message,
            obj.display_name(),
            role,
            b.left,
            b.top,
            b.width,
            b.height
        ),
        None => format!("{}: {} ({})", message, obj.display_name(), role),
    }
}
