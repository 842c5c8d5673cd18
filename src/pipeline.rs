// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline lifecycle facade
//!
//! `PreviewPipeline` wires the frame bridge, the session state machine, the
//! render coordinator and the threading coordinator together, and is the
//! only surface the host touches:
//!
//! ```text
//! ┌──────────────────────┐
//! │        Host          │  ← lifecycle, permission, surface signals
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │   PreviewPipeline    │  ← facade, host event stream
//! └───┬───────┬──────┬───┘
//!     │       │      │
//!     ▼       ▼      ▼
//!  bridge  session  render   (threads owned by ThreadingCoordinator)
//! ```
//!
//! Host-visible outcomes (state changes, surfaced errors) arrive on a
//! `futures` channel so the host can poll or stream them from any runtime.

use crate::bridge::{CaptureTarget, FrameBridge, FrameBuffer};
use crate::config::PreviewParameters;
use crate::errors::{StreamError, StreamResult};
use crate::render::{GpuSurface, RenderCoordinator, RenderMessage, RenderSignal};
use crate::session::{
    CameraProvider, CaptureRequest, DeviceEventSender, SessionController, SessionState,
};
use crate::threading::ThreadingCoordinator;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

/// Host-visible pipeline events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The camera session changed state
    StateChanged(SessionState),
    /// A fatal error was surfaced; the host decides whether to retry
    Error(StreamError),
}

/// Receiver half of the host event stream
pub type PipelineEvents = futures::channel::mpsc::UnboundedReceiver<PipelineEvent>;

/// Sender used internally to emit host events
pub(crate) type HostEventSender = futures::channel::mpsc::UnboundedSender<PipelineEvent>;

/// The capture-to-texture streaming pipeline
///
/// Create one per camera preview. All methods are callable from the host's
/// thread; none of them block on hardware.
pub struct PreviewPipeline {
    bridge: FrameBridge,
    session: Arc<SessionController>,
    threading: ThreadingCoordinator,
    render_tx: tokio::sync::mpsc::UnboundedSender<RenderMessage>,
}

impl PreviewPipeline {
    /// Build the pipeline and spawn its execution contexts
    ///
    /// `provider` is the camera hardware boundary; `gpu_surface` the
    /// texture-update primitive. Returns the pipeline and the host event
    /// stream.
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        gpu_surface: Box<dyn GpuSurface>,
        template: PreviewParameters,
    ) -> (Self, PipelineEvents) {
        let bridge = FrameBridge::new();
        let (host_tx, host_rx) = futures::channel::mpsc::unbounded();
        let (camera_tx, camera_rx) = tokio::sync::mpsc::unbounded_channel();
        let (render_tx, render_rx) = tokio::sync::mpsc::unbounded_channel();

        let session = Arc::new(SessionController::new(
            provider,
            DeviceEventSender::new(camera_tx.clone()),
            host_tx,
            template,
        ));

        // Frame notifications arrive on the producer's context; re-dispatch
        // them, coalesced, onto the render thread.
        let pending = Arc::new(AtomicBool::new(false));
        let signal = RenderSignal::new(render_tx.clone(), Arc::clone(&pending));
        bridge.set_frame_listener(Box::new(move |_target, _sequence| {
            signal.frame_available();
        }));

        let render = RenderCoordinator::new(bridge.clone(), gpu_surface, pending);
        let threading = ThreadingCoordinator::spawn(
            camera_tx,
            camera_rx,
            Arc::clone(&session),
            render_tx.clone(),
            render_rx,
            render,
        );

        info!("Preview pipeline created");
        (
            Self {
                bridge,
                session,
                threading,
                render_tx,
            },
            host_rx,
        )
    }

    /// Allocate or reconfigure the capture target; must precede `open()`
    pub fn bind_capture_target(&self, width: u32, height: u32) -> StreamResult<CaptureTarget> {
        self.bridge.bind_capture_target(width, height)
    }

    /// Record the permission collaborator's decision
    pub fn set_permission(&self, granted: bool) {
        self.session.set_permission(granted);
    }

    /// Begin opening the camera device against the bound target
    pub fn open(&self, device_id: &str, target: CaptureTarget) -> StreamResult<()> {
        self.session.open(device_id, target)
    }

    /// Close the camera session; safe from any state, idempotent
    pub fn close(&self) {
        self.session.close();
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Snapshot of the repeating request currently streaming
    pub fn current_request(&self) -> Option<CaptureRequest> {
        self.session.current_request()
    }

    /// Diagnostic: callbacks discarded by the session's generation guard
    pub fn stale_callback_count(&self) -> u64 {
        self.session.stale_callback_count()
    }

    /// Peek at the latest completed frame without consuming it
    pub fn acquire_latest(&self) -> Option<Arc<FrameBuffer>> {
        self.bridge.acquire_latest()
    }

    /// Display-surface collaborator signal: surface created or resized
    pub fn surface_resized(&self, width: u32, height: u32) {
        let _ = self
            .render_tx
            .send(RenderMessage::SurfaceResized { width, height });
    }

    /// Display-surface collaborator signal: surface destroyed
    pub fn surface_destroyed(&self) {
        let _ = self.render_tx.send(RenderMessage::SurfaceDestroyed);
    }

    /// Close the session and stop both execution contexts
    pub fn shutdown(mut self) {
        info!("Shutting down preview pipeline");
        self.session.close();
        self.bridge.clear_frame_listener();
        self.threading.shutdown();
    }
}

impl Drop for PreviewPipeline {
    fn drop(&mut self) {
        // Idempotent: a prior shutdown() already closed everything
        self.session.close();
        self.bridge.clear_frame_listener();
        self.threading.shutdown();
    }
}

impl std::fmt::Debug for PreviewPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewPipeline")
            .field("state", &self.state())
            .field("bridge", &self.bridge)
            .finish()
    }
}
