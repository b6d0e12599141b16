//! Process-wide runtime initialization.

use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::info;

use crate::api::NativeApi;
use crate::error::MediapipeError;
use crate::status::Status;

static ACTIVE: Lazy<Mutex<Weak<Environment>>> = Lazy::new(|| Mutex::new(Weak::new()));

/// Live native runtime.
///
/// [`Environment::init`] runs the runtime's global setup once and hands out
/// shared references; dropping the last reference runs the matching
/// shutdown. Graphs and frames keep the environment alive, so shutdown
/// always happens after every native object built on it is gone.
pub struct Environment {
    api: Arc<dyn NativeApi>,
    log_name: String,
}

impl Environment {
    /// Initializes the runtime, or returns the environment already running.
    ///
    /// While an environment is alive, later calls return it and ignore their
    /// arguments.
    pub fn init(api: Arc<dyn NativeApi>, log_name: &str) -> Result<Arc<Self>, MediapipeError> {
        let mut active = ACTIVE.lock();
        if let Some(env) = active.upgrade() {
            return Ok(env);
        }

        let status = Status::consume(&api, api.glog_initialize(log_name))?;
        if !status.is_ok() {
            return Err(MediapipeError::Init(status));
        }
        info!(log_name, "mediapipe: runtime initialized");

        let env = Arc::new(Self {
            api,
            log_name: log_name.to_string(),
        });
        *active = Arc::downgrade(&env);
        Ok(env)
    }

    /// Returns the running environment, if any.
    pub fn current() -> Option<Arc<Self>> {
        ACTIVE.lock().upgrade()
    }

    pub fn api(&self) -> Arc<dyn NativeApi> {
        self.api.clone()
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        // Held so a concurrent init cannot start before shutdown finishes.
        let _active = ACTIVE.lock();
        self.api.glog_shutdown();
        info!(log_name = %self.log_name, "mediapipe: runtime shut down");
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("log_name", &self.log_name)
            .finish()
    }
}

/// Serializes tests that touch the process-wide environment.
#[cfg(any(test, feature = "mock"))]
pub fn test_lock() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = parking_lot::const_mutex(());
    LOCK.lock()
}
