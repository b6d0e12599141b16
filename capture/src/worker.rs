//! Background producer thread with a bounded shutdown.
//!
//! Capture backends that block in a driver call run that call on a
//! [`ProducerThread`]. Stopping raises a [`CancelFlag`] the body polls,
//! closes the channel, then waits at most a fixed time for the thread to
//! finish. A thread still stuck after that is detached so teardown can go on.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::pipeline::CancelFlag;

pub struct ProducerThread<T> {
    name: String,
    receiver: Option<Receiver<T>>,
    stop_flag: CancelFlag,
    // Disconnects when the thread body returns or unwinds.
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl<T> std::fmt::Debug for ProducerThread<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerThread")
            .field("name", &self.name)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl<T: Send + 'static> ProducerThread<T> {
    /// Spawns `body` with a stop flag and the sending half of a channel
    /// holding up to `capacity` items.
    pub fn spawn<F>(name: impl Into<String>, capacity: usize, body: F) -> Result<Self, CaptureError>
    where
        F: FnOnce(CancelFlag, SyncSender<T>) + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::sync_channel(capacity);
        let (exited_tx, exited_rx) = mpsc::channel::<()>();
        let stop_flag = CancelFlag::new();
        let flag = stop_flag.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _exited = exited_tx;
                body(flag, tx);
            })
            .map_err(|e| CaptureError::Device(format!("spawn {name}: {e}")))?;

        Ok(Self {
            name,
            receiver: Some(rx),
            stop_flag,
            exited: exited_rx,
            handle: Some(handle),
        })
    }

    /// Blocks for the next item.
    pub fn recv(&self) -> Result<T, CaptureError> {
        let receiver = self.receiver.as_ref().ok_or(CaptureError::Closed)?;
        receiver
            .recv()
            .map_err(|_| CaptureError::Device(format!("{} exited", self.name)))
    }

    /// Asks the thread to finish and waits up to `timeout` for it.
    ///
    /// Calls after the first return `Ok(())`.
    ///
    /// # Errors
    ///
    /// `CaptureError::Device` if the thread panicked, or if it is still
    /// running when `timeout` expires. In the second case it is detached.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        self.stop_flag.cancel();
        // Unblocks a body waiting for channel space.
        drop(self.receiver.take());
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(thread = %self.name, ?timeout, "capture: thread did not stop, detaching");
                Err(CaptureError::Device(format!(
                    "{} did not stop within {timeout:?}",
                    self.name
                )))
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let joined = handle
                    .join()
                    .map_err(|_| CaptureError::Device(format!("{} panicked", self.name)));
                debug!(thread = %self.name, "capture: thread joined");
                joined
            }
        }
    }
}
