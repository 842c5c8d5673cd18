// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for the pipeline's execution contexts
//!
//! The pipeline runs on three contexts: the host's own thread for control
//! calls, a camera-callback thread draining device completions, and the
//! render thread. [`EventLoopController`] is the crate's single
//! thread-creation primitive; [`ThreadingCoordinator`] owns the two
//! dedicated threads and the shutdown sequence. No other component spawns
//! threads, which keeps every handoff on the two notification channels.

use crate::render::{RenderCoordinator, RenderMessage};
use crate::session::{CameraThreadMessage, SessionController};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by a loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for an event loop running in a dedicated thread
///
/// Provides a standardized interface for starting, stopping, and joining
/// the pipeline's long-lived threads.
pub struct EventLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl EventLoopController {
    /// Start a new event loop in a dedicated thread
    ///
    /// The closure is called repeatedly until it returns `LoopAction::Stop`
    /// or the controller's stop signal is raised. Loops that park in a
    /// blocking receive should rely on a shutdown message rather than the
    /// stop signal alone, which is only checked between iterations.
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting event loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Event loop thread started");

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                match loop_fn() {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Event loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting event loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without raising the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for event loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Event loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Event loop thread finished");
            }
        }
    }
}

impl Drop for EventLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "EventLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

/// Owns the camera-callback thread and the render thread
///
/// The camera thread drains device completions into the session state
/// machine; the render thread drains render messages into the render
/// coordinator. Both park in a blocking receive between messages, so
/// neither thread spins and neither producer ever blocks on them.
pub struct ThreadingCoordinator {
    camera_tx: tokio::sync::mpsc::UnboundedSender<CameraThreadMessage>,
    render_tx: tokio::sync::mpsc::UnboundedSender<RenderMessage>,
    camera_loop: Option<EventLoopController>,
    render_loop: Option<EventLoopController>,
}

impl ThreadingCoordinator {
    pub(crate) fn spawn(
        camera_tx: tokio::sync::mpsc::UnboundedSender<CameraThreadMessage>,
        mut camera_rx: tokio::sync::mpsc::UnboundedReceiver<CameraThreadMessage>,
        controller: Arc<SessionController>,
        render_tx: tokio::sync::mpsc::UnboundedSender<RenderMessage>,
        mut render_rx: tokio::sync::mpsc::UnboundedReceiver<RenderMessage>,
        mut render: RenderCoordinator,
    ) -> Self {
        let camera_loop = EventLoopController::start("camera-callbacks", move || {
            match camera_rx.blocking_recv() {
                Some(CameraThreadMessage::Event(event)) => {
                    controller.handle_event(event);
                    LoopAction::Continue
                }
                Some(CameraThreadMessage::Shutdown) | None => LoopAction::Stop,
            }
        });

        let render_loop = EventLoopController::start("render-loop", move || {
            match render_rx.blocking_recv() {
                Some(message) => render.handle_message(message),
                None => LoopAction::Stop,
            }
        });

        Self {
            camera_tx,
            render_tx,
            camera_loop: Some(camera_loop),
            render_loop: Some(render_loop),
        }
    }

    /// Stop both threads and wait for them to finish
    ///
    /// Safe to call more than once. Queued messages ahead of the shutdown
    /// marker are still processed, so a close() issued before shutdown
    /// completes its teardown.
    pub fn shutdown(&mut self) {
        let _ = self.camera_tx.send(CameraThreadMessage::Shutdown);
        let _ = self.render_tx.send(RenderMessage::Shutdown);
        if let Some(mut camera_loop) = self.camera_loop.take() {
            camera_loop.join();
        }
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.join();
        }
    }
}

impl Drop for ThreadingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadingCoordinator")
            .field(
                "camera_running",
                &self.camera_loop.as_ref().map(|l| l.is_running()),
            )
            .field(
                "render_running",
                &self.render_loop.as_ref().map(|l| l.is_running()),
            )
            .finish()
    }
}
