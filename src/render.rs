// SPDX-License-Identifier: GPL-3.0-only

//! Render loop coordination
//!
//! The render loop runs on its own thread, parked between signals. A
//! frame-available notification from the bridge (raised on the producer's
//! context) is re-dispatched here as a coalesced message: at most one
//! frame signal is queued at a time, so a slow consumer never builds a
//! backlog, it just reads a newer frame when it wakes. Each wake pulls
//! the latest frame, pushes it into the GPU texture and requests a redraw.
//!
//! Surface lifecycle events share the same ordered message channel, so a
//! texture update that races a resize or destroy observes the surface's
//! newest state and is discarded instead of applied stale.

use crate::bridge::{FrameBridge, FrameBuffer};
use crate::constants::logging::FRAME_LOG_INTERVAL;
use crate::errors::StreamResult;
use crate::threading::LoopAction;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

/// Platform texture-update primitive, implemented by the GPU-draw collaborator
///
/// The pipeline's contract ends at "the texture contains the latest camera
/// image"; what the host draws with it is its own business.
pub trait GpuSurface: Send {
    /// Copy the frame into the GPU-sampled texture
    fn update_texture(&mut self, frame: &FrameBuffer) -> StreamResult<()>;

    /// Ask the host to redraw with the updated texture
    fn request_redraw(&mut self);
}

/// Messages processed on the render thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderMessage {
    /// A new frame is readable from the bridge (coalesced)
    FrameAvailable,
    /// The GPU surface was created or resized
    SurfaceResized { width: u32, height: u32 },
    /// The GPU surface is gone; discard in-flight updates
    SurfaceDestroyed,
    Shutdown,
}

/// Coalescing notifier registered as the bridge's frame listener
///
/// `frame_available` is called on the producer's context and never blocks:
/// it enqueues a render message only when none is pending, so rapid
/// successive frames collapse into a single latest-wins wakeup.
#[derive(Clone)]
pub(crate) struct RenderSignal {
    tx: tokio::sync::mpsc::UnboundedSender<RenderMessage>,
    pending: Arc<AtomicBool>,
}

impl RenderSignal {
    pub(crate) fn new(
        tx: tokio::sync::mpsc::UnboundedSender<RenderMessage>,
        pending: Arc<AtomicBool>,
    ) -> Self {
        Self { tx, pending }
    }

    pub(crate) fn frame_available(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(RenderMessage::FrameAvailable);
        }
    }
}

/// State driven by the render thread's message loop
pub(crate) struct RenderCoordinator {
    bridge: FrameBridge,
    surface: Box<dyn GpuSurface>,
    pending: Arc<AtomicBool>,
    /// Dimensions the surface expects, once the host has reported them
    expected: Option<(u32, u32)>,
    /// Bumped on every resize/destroy; diagnostic only, the guard itself
    /// reads `alive` and `expected`
    surface_generation: u64,
    alive: bool,
    frames_presented: u64,
    frames_discarded: u64,
}

impl RenderCoordinator {
    pub(crate) fn new(
        bridge: FrameBridge,
        surface: Box<dyn GpuSurface>,
        pending: Arc<AtomicBool>,
    ) -> Self {
        Self {
            bridge,
            surface,
            pending,
            expected: None,
            surface_generation: 0,
            alive: true,
            frames_presented: 0,
            frames_discarded: 0,
        }
    }

    pub(crate) fn handle_message(&mut self, message: RenderMessage) -> LoopAction {
        match message {
            RenderMessage::FrameAvailable => {
                // Clear before reading: a frame published from here on
                // re-signals, and at worst we redraw the same frame once.
                self.pending.store(false, Ordering::Release);
                self.present_latest();
                LoopAction::Continue
            }
            RenderMessage::SurfaceResized { width, height } => {
                self.surface_generation += 1;
                self.expected = Some((width, height));
                self.alive = true;
                debug!(
                    width,
                    height,
                    generation = self.surface_generation,
                    "GPU surface resized"
                );
                LoopAction::Continue
            }
            RenderMessage::SurfaceDestroyed => {
                self.surface_generation += 1;
                self.alive = false;
                info!(
                    generation = self.surface_generation,
                    presented = self.frames_presented,
                    "GPU surface destroyed"
                );
                LoopAction::Continue
            }
            RenderMessage::Shutdown => LoopAction::Stop,
        }
    }

    /// Pull the newest frame and push it into the texture
    ///
    /// Guarded: a destroyed surface or a frame whose dimensions no longer
    /// match the surface's expectation discards the update.
    fn present_latest(&mut self) {
        let Some(frame) = self.bridge.acquire_latest() else {
            trace!("Frame signal without a readable frame");
            return;
        };

        if !self.alive {
            self.frames_discarded += 1;
            debug!(
                sequence = frame.sequence,
                "Surface destroyed, discarding texture update"
            );
            return;
        }
        if let Some((width, height)) = self.expected
            && (frame.width != width || frame.height != height)
        {
            self.frames_discarded += 1;
            debug!(
                sequence = frame.sequence,
                frame_width = frame.width,
                frame_height = frame.height,
                width,
                height,
                "Frame does not match surface dimensions, discarding"
            );
            return;
        }

        match self.surface.update_texture(&frame) {
            Ok(()) => {
                self.frames_presented += 1;
                if self.frames_presented.is_multiple_of(FRAME_LOG_INTERVAL) {
                    info!(
                        presented = self.frames_presented,
                        sequence = frame.sequence,
                        "Texture updated"
                    );
                }
                self.surface.request_redraw();
            }
            Err(e) => {
                warn!(sequence = frame.sequence, error = %e, "Texture update failed");
            }
        }
    }

    #[cfg(test)]
    fn presented(&self) -> u64 {
        self.frames_presented
    }

    #[cfg(test)]
    fn discarded(&self) -> u64 {
        self.frames_discarded
    }
}

/// GPU surface that only logs texture updates
///
/// Stands in for a real swapchain in the demo binary.
pub struct LoggingGpuSurface {
    updates: u64,
}

impl LoggingGpuSurface {
    pub fn new() -> Self {
        Self { updates: 0 }
    }
}

impl Default for LoggingGpuSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuSurface for LoggingGpuSurface {
    fn update_texture(&mut self, frame: &FrameBuffer) -> StreamResult<()> {
        self.updates += 1;
        if self.updates.is_multiple_of(FRAME_LOG_INTERVAL) {
            info!(
                updates = self.updates,
                sequence = frame.sequence,
                width = frame.width,
                height = frame.height,
                bytes = frame.data.len(),
                "Sampled camera frame into texture"
            );
        }
        Ok(())
    }

    fn request_redraw(&mut self) {
        trace!("Redraw requested");
    }
}
