//! Touchpoint haptic controller
//!
//! Turns screen-reader state into commands for the Touchpoint device: the
//! brightness of the image under the pointer becomes elevation, and UI
//! events become vibration pulses. The embedding screen reader supplies a
//! [`host::ScreenReaderHost`] and a [`host::ScreenCapture`]; everything else
//! runs on the controller's own threads.

pub mod capture;
pub mod config;
pub mod coordinator;
pub mod depth;
pub mod dispatch;
pub mod emulator;
pub mod error;
pub mod handlers;
pub mod hardware;
pub mod host;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use capture::{CaptureRegistry, CaptureScheduler};
use config::Settings;
use coordinator::{lock_manager, Coordinator};
use dispatch::{ControllerServices, EventName, EventParams, GlobalHandler, HandlerId, HandlerManager, ObjectHandler};
use hardware::{HardwareDriver, StartupReport};
use host::{ScreenCapture, ScreenReaderHost, UiObject};

static LOG_FILE: OnceLock<Mutex<std::fs::File>> = OnceLock::new();

/// Install the logger, mirroring every line to the configured log file.
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging(settings: &Settings) {
    if let Some(path) = settings.log_path() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
            Ok(file) => {
                LOG_FILE.set(Mutex::new(file)).ok();
            }
            Err(e) => eprintln!("touchpoint: cannot open log file {}: {}", path.display(), e),
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let line = format!("[{}] {} - {}\n", timestamp, record.level(), record.args());

            if let Some(file_mutex) = LOG_FILE.get() {
                if let Ok(mut file) = file_mutex.lock() {
                    let _ = file.write_all(line.as_bytes());
                    let _ = file.flush();
                }
            }

            write!(buf, "{}", line)
        })
        .try_init();
}

/// One controller session: handlers, loops and the hardware driver
pub struct Controller {
    services: ControllerServices,
    capture: Arc<dyn ScreenCapture>,
    manager: Arc<Mutex<HandlerManager>>,
    running: Arc<AtomicBool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(settings: Settings, host: Arc<dyn ScreenReaderHost>, capture: Arc<dyn ScreenCapture>) -> Self {
        let settings = Arc::new(settings);
        let services = ControllerServices {
            host,
            driver: HardwareDriver::new(settings.max_elevation_speed),
            regions: CaptureRegistry::new(),
            settings,
        };
        let manager = Arc::new(Mutex::new(HandlerManager::new(services.clone())));
        Self {
            services,
            capture,
            manager,
            running: Arc::new(AtomicBool::new(false)),
            loops: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.services.settings
    }

    pub fn driver(&self) -> &HardwareDriver {
        &self.services.driver
    }

    pub fn capture_regions(&self) -> &CaptureRegistry {
        &self.services.regions
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn add_object_handler(&self, handler: Arc<dyn ObjectHandler>) -> HandlerId {
        lock_manager(&self.manager).add_object_handler(handler)
    }

    pub fn add_global_handler(&self, handler: Box<dyn GlobalHandler>) -> HandlerId {
        lock_manager(&self.manager).add_global_handler(handler)
    }

    /// Install the stock graphic and screen border handlers
    pub fn register_default_handlers(&self) {
        lock_manager(&self.manager).populate(
            handlers::default_object_handlers(),
            handlers::default_global_handlers(),
        );
    }

    /// Start the event and capture loops and bring the channels up.
    ///
    /// Returns immediately; the receiver resolves once the device handshake
    /// has finished one way or the other. Commands issued before then reach
    /// whichever channel is already connected.
    pub fn start(&self) -> std::io::Result<oneshot::Receiver<StartupReport>> {
        let (tx, rx) = oneshot::channel();
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("Controller already started");
            drop(tx);
            return Ok(rx);
        }
        log::info!("Touchpoint controller starting");

        let coordinator = Coordinator::new(self.services.clone(), Arc::clone(&self.manager));
        let scheduler = CaptureScheduler::new(self.services.clone(), Arc::clone(&self.capture));
        {
            let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
            loops.push(coordinator.spawn(Arc::clone(&self.running))?);
            loops.push(scheduler.spawn(Arc::clone(&self.running))?);
        }

        let driver = self.services.driver.clone();
        let settings = Arc::clone(&self.services.settings);
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name("touchpoint-startup".to_string())
            .spawn(move || {
                let report = driver.initialize(&settings);
                log::info!(
                    "Startup finished: device {:?}, emulator {:?}",
                    report.uart,
                    report.emulator
                );
                // Shutdown raced the handshake; nothing else will close these
                if !running.load(Ordering::SeqCst) {
                    driver.close();
                }
                let _ = tx.send(report);
            })?;

        Ok(rx)
    }

    /// Deliver a screen-reader event (focus, caret, alert, ...) to the object handlers.
    ///
    /// `enter` and `leave` come from pointer tracking and are refused here.
    pub fn host_event(&self, event: EventName, obj: Option<&UiObject>, params: &EventParams) {
        if !event.is_host_event() && !matches!(event, EventName::Custom(_)) {
            log::warn!("Ignoring host event '{}': raised by the controller itself", event);
            return;
        }
        lock_manager(&self.manager).dispatch_object_event(&event, obj, params);
    }

    /// Stop the loops and close both channels
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let loops: Vec<_> = self.loops.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect();
        for handle in loops {
            let _ = handle.join();
        }
        self.services.regions.clear();
        self.services.driver.close();
        log::info!("Touchpoint controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
