mod depth;
mod hardware;
mod settings;

pub use depth::{DepthSettings, TimingSettings};
pub use hardware::{EmulatorSettings, SerialSettings};
pub use settings::Settings;
