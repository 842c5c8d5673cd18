// SPDX-License-Identifier: GPL-3.0-only

//! Camera session management
//!
//! The camera subsystem is an asynchronous, fallible hardware resource: a
//! device is claimed, a capture session is negotiated against an output
//! target, and completions arrive as callbacks on a background context.
//! This module models that boundary with a trait pair and an explicit
//! completion-event channel:
//!
//! ```text
//! ┌────────────────────┐
//! │  PreviewPipeline   │  ← host-facing facade
//! └─────────┬──────────┘
//!           │
//!           ▼
//! ┌────────────────────┐
//! │ SessionController  │  ← state machine, generation-guarded callbacks
//! └─────────┬──────────┘
//!           │
//!           ▼
//! ┌────────────────────┐
//! │CameraProvider trait│  ← hardware boundary (synthetic or real)
//! └────────────────────┘
//! ```
//!
//! Completions are delivered as [`DeviceEvent`]s through a
//! [`DeviceEventSender`] and drained on the dedicated camera-callback
//! thread, so hardware latency never stalls the control path.

pub mod controller;

pub use controller::SessionController;

use crate::bridge::{FrameSink, TargetId};
use crate::config::{AntiBandingMode, AutofocusMode, ExposureMode, PreviewParameters};
use crate::errors::StreamResult;
use std::fmt;

/// Lifecycle states of a camera session
///
/// `Failed` is absorbing for the attempt: only a fresh `open()` (new
/// generation) or `close()` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Configuring,
    Active,
    Closing,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Configuring => "configuring",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Immutable capture parameters submitted as a repeating request
///
/// Built from the session's [`PreviewParameters`] template with the capture
/// target attached as the sole output. Must be rebuilt if the target's
/// dimensions change (a new target after re-binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub autofocus: AutofocusMode,
    pub auto_exposure: ExposureMode,
    pub anti_banding: AntiBandingMode,
    /// Sole output target of this request
    pub target: TargetId,
}

impl CaptureRequest {
    pub fn from_template(template: &PreviewParameters, target: TargetId) -> Self {
        Self {
            autofocus: template.autofocus,
            auto_exposure: template.auto_exposure,
            anti_banding: template.anti_banding,
            target,
        }
    }
}

/// Asynchronous completion events from the camera subsystem
///
/// Every event carries the session generation captured when the operation
/// was issued; the state machine discards events whose generation no longer
/// matches (stale callbacks after `close()`).
pub enum DeviceEvent {
    /// Device claim succeeded; the handle delivered here is the one to retain
    Opened {
        generation: u64,
        handle: Box<dyn CameraHandle>,
    },
    /// Device claim failed (busy, disconnected, policy-denied)
    OpenFailed { generation: u64, reason: String },
    /// Capture session negotiated successfully
    SessionConfigured { generation: u64 },
    /// Capture session could not be configured for the target
    SessionConfigureFailed { generation: u64, reason: String },
    /// Device vanished (unplugged, claimed by higher-priority client)
    Disconnected { generation: u64 },
    /// Device reported an asynchronous error
    DeviceError { generation: u64, reason: String },
}

impl DeviceEvent {
    pub fn generation(&self) -> u64 {
        match self {
            DeviceEvent::Opened { generation, .. }
            | DeviceEvent::OpenFailed { generation, .. }
            | DeviceEvent::SessionConfigured { generation }
            | DeviceEvent::SessionConfigureFailed { generation, .. }
            | DeviceEvent::Disconnected { generation }
            | DeviceEvent::DeviceError { generation, .. } => *generation,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DeviceEvent::Opened { .. } => "opened",
            DeviceEvent::OpenFailed { .. } => "open-failed",
            DeviceEvent::SessionConfigured { .. } => "session-configured",
            DeviceEvent::SessionConfigureFailed { .. } => "session-configure-failed",
            DeviceEvent::Disconnected { .. } => "disconnected",
            DeviceEvent::DeviceError { .. } => "device-error",
        }
    }
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEvent")
            .field("kind", &self.name())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Messages drained by the camera-callback thread
pub(crate) enum CameraThreadMessage {
    Event(DeviceEvent),
    Shutdown,
}

/// Sender through which the camera subsystem delivers completions
///
/// Cheap to clone; sends never block. Events sent after the pipeline shut
/// down are discarded, consistent with stale-callback handling.
#[derive(Clone)]
pub struct DeviceEventSender {
    tx: tokio::sync::mpsc::UnboundedSender<CameraThreadMessage>,
}

impl DeviceEventSender {
    pub(crate) fn new(tx: tokio::sync::mpsc::UnboundedSender<CameraThreadMessage>) -> Self {
        Self { tx }
    }

    /// Deliver a completion to the camera-callback thread
    pub fn send(&self, event: DeviceEvent) {
        let _ = self.tx.send(CameraThreadMessage::Event(event));
    }
}

impl fmt::Debug for DeviceEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEventSender").finish()
    }
}

/// Hardware boundary: claims camera devices asynchronously
///
/// `open_device` returns as soon as the claim is underway; the outcome
/// arrives later as [`DeviceEvent::Opened`] or [`DeviceEvent::OpenFailed`]
/// tagged with `generation`. A synchronous `Err` means the claim could not
/// even be started.
pub trait CameraProvider: Send + Sync {
    fn open_device(
        &self,
        device_id: &str,
        generation: u64,
        events: DeviceEventSender,
    ) -> StreamResult<()>;
}

/// An opened camera device
///
/// Owned exclusively by the session state machine. Session negotiation is
/// asynchronous like `open_device`; the teardown methods are infallible by
/// design: implementations swallow and log their own cleanup errors so a
/// failing close never interrupts the caller's cleanup chain.
pub trait CameraHandle: Send {
    /// Negotiate a capture session writing into `sink`
    fn configure_session(
        &mut self,
        sink: FrameSink,
        generation: u64,
        events: DeviceEventSender,
    ) -> StreamResult<()>;

    /// Submit a repeating request: the hardware re-issues it every frame
    /// interval until replaced or stopped
    fn submit_repeating(&mut self, request: &CaptureRequest) -> StreamResult<()>;

    /// Stop the repeating request (best effort)
    fn stop_repeating(&mut self);

    /// Release the device claim (best effort)
    fn close(&mut self);
}
