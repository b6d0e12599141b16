//! Safe wrapper for a native `CalculatorGraph`.

use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{NativeApi, SidePacket};
use crate::error::MediapipeError;
use crate::handle::{kind, NativeHandle};
use crate::packet::Packet;
use crate::status::Status;

/// One native calculator graph and its output pollers.
///
/// A graph must be driven from a single thread.
#[derive(Debug)]
pub struct CalculatorGraph {
    api: Arc<dyn NativeApi>,
    handle: NativeHandle<kind::Graph>,
}

impl CalculatorGraph {
    /// Parses a text-format `CalculatorGraphConfig` and initializes a graph.
    pub fn new(api: Arc<dyn NativeApi>, config_text: &str) -> Result<Self, MediapipeError> {
        let mut out = ptr::null_mut();
        let status = api.graph_new(config_text, &mut out);
        let handle = NativeHandle::acquire(api.clone(), out);
        Status::consume(&api, status)?.check("parse graph config")?;
        Ok(Self {
            handle: handle?,
            api,
        })
    }

    /// Makes `data` available to calculators that open `name`.
    pub fn register_asset(&mut self, name: &str, data: &[u8]) -> Result<(), MediapipeError> {
        let raw = self.handle.borrow()?;
        // SAFETY: `raw` is live while the handle is.
        let status = unsafe { self.api.graph_register_asset(raw, name, data) };
        Status::consume(&self.api, status)?.check("register asset")
    }

    /// Attaches a poller to `stream`. Must happen before [`Self::start_run`].
    pub fn observe_output(&mut self, stream: &str) -> Result<(), MediapipeError> {
        let raw = self.handle.borrow()?;
        // SAFETY: `raw` is live while the handle is.
        let status = unsafe { self.api.graph_observe_output(raw, stream) };
        Status::consume(&self.api, status)?.check("observe output stream")
    }

    pub fn start_run(&mut self, side_packets: &[SidePacket]) -> Result<(), MediapipeError> {
        let raw = self.handle.borrow()?;
        // SAFETY: `raw` is live while the handle is.
        let status = unsafe { self.api.graph_start_run(raw, side_packets) };
        Status::consume(&self.api, status)?.check("start run")
    }

    /// Sends `packet` into `stream`; the graph takes ownership of it.
    ///
    /// Returns the raw status so callers can attach their own context.
    pub fn add_packet(&mut self, stream: &str, packet: Packet) -> Result<Status, MediapipeError> {
        let raw = self.handle.borrow()?;
        let raw_packet = packet.into_raw()?;
        // SAFETY: both pointers are live; the shim consumes `raw_packet`.
        let status = unsafe { self.api.graph_add_packet(raw, stream, raw_packet) };
        Status::consume(&self.api, status)
    }

    /// Waits up to `timeout` for the next packet on an observed stream.
    pub fn poll_output(
        &mut self,
        stream: &str,
        timeout: Duration,
    ) -> Result<Option<Packet>, MediapipeError> {
        let raw = self.handle.borrow()?;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let mut out = ptr::null_mut();
        // SAFETY: `raw` is live; a packet written to `out` is owned by us.
        let status = unsafe { self.api.graph_poll_output(raw, stream, timeout_ms, &mut out) };
        let packet = if out.is_null() {
            None
        } else {
            Some(Packet::adopt(self.api.clone(), out)?)
        };
        Status::consume(&self.api, status)?.check("poll output")?;
        Ok(packet)
    }

    /// Closes the input streams, waits for the graph and deletes it.
    ///
    /// Returns the close status on the first call and `None` afterwards.
    pub fn close(&mut self) -> Option<Status> {
        self.handle.release()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_released()
    }
}
