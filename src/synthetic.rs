// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera driver
//!
//! A `CameraProvider` that behaves like real hardware at the boundary:
//! open and configure complete asynchronously through the callback channel,
//! and a repeating request produces paced test-pattern frames until stopped.
//! Used by the demo binary and anywhere a real camera is unavailable.

use crate::bridge::FrameSink;
use crate::constants::timing::SYNTHETIC_FRAME_INTERVAL;
use crate::errors::{StreamError, StreamResult};
use crate::session::{
    CameraHandle, CameraProvider, CaptureRequest, DeviceEvent, DeviceEventSender,
};
use crate::threading::{EventLoopController, LoopAction};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Synthetic camera provider
pub struct SyntheticProvider {
    frame_interval: Duration,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self {
            frame_interval: SYNTHETIC_FRAME_INTERVAL,
        }
    }

    /// Override the frame pacing (tests use short intervals)
    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraProvider for SyntheticProvider {
    fn open_device(
        &self,
        device_id: &str,
        generation: u64,
        events: DeviceEventSender,
    ) -> StreamResult<()> {
        debug!(device = %device_id, generation, "Synthetic device claim started");
        // Completion is delivered through the callback channel, like real
        // hardware: the caller sees Opened on the camera-callback thread.
        events.send(DeviceEvent::Opened {
            generation,
            handle: Box::new(SyntheticHandle {
                device_id: device_id.to_string(),
                frame_interval: self.frame_interval,
                sink: None,
                pacer: None,
            }),
        });
        Ok(())
    }
}

/// An opened synthetic device
struct SyntheticHandle {
    device_id: String,
    frame_interval: Duration,
    sink: Option<FrameSink>,
    pacer: Option<EventLoopController>,
}

impl CameraHandle for SyntheticHandle {
    fn configure_session(
        &mut self,
        sink: FrameSink,
        generation: u64,
        events: DeviceEventSender,
    ) -> StreamResult<()> {
        debug!(device = %self.device_id, "Synthetic capture session configured");
        self.sink = Some(sink);
        events.send(DeviceEvent::SessionConfigured { generation });
        Ok(())
    }

    fn submit_repeating(&mut self, request: &CaptureRequest) -> StreamResult<()> {
        let Some(sink) = self.sink.clone() else {
            return Err(StreamError::ConfigurationRejected(
                "repeating request submitted without a configured session".to_string(),
            ));
        };

        // A new repeating request replaces the previous one
        self.pacer = None;

        let interval = self.frame_interval;
        let mut sequence = 0u64;
        info!(device = %self.device_id, ?request, "Synthetic repeating request started");
        self.pacer = Some(EventLoopController::start("synthetic-capture", move || {
            thread::sleep(interval);
            sequence += 1;
            let (width, height) = sink.dimensions();
            let data = test_pattern(width, height, sequence);
            if sink.publish(data, width * 4) {
                LoopAction::Continue
            } else {
                // Binding released under us: the session is gone
                LoopAction::Stop
            }
        }));
        Ok(())
    }

    fn stop_repeating(&mut self) {
        if let Some(mut pacer) = self.pacer.take() {
            debug!(device = %self.device_id, "Stopping synthetic repeating request");
            pacer.stop();
        }
    }

    fn close(&mut self) {
        self.stop_repeating();
        self.sink = None;
        info!(device = %self.device_id, "Synthetic device released");
    }
}

impl Drop for SyntheticHandle {
    fn drop(&mut self) {
        self.stop_repeating();
    }
}

/// RGBA gradient with a scanline that moves one row per frame
fn test_pattern(width: u32, height: u32, frame: u64) -> Arc<[u8]> {
    let mut data = vec![0u8; (width as usize) * (height as usize) * 4];
    let band = (frame % height.max(1) as u64) as u32;
    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 4) as usize;
            data[i] = (x * 255 / width.max(1)) as u8;
            data[i + 1] = (y * 255 / height.max(1)) as u8;
            data[i + 2] = if y == band { 255 } else { 64 };
            data[i + 3] = 255;
        }
    }
    Arc::from(data.into_boxed_slice())
}
