// SPDX-License-Identifier: GPL-3.0-only

//! Camera session state machine
//!
//! Owns the device handle, the capture target and the transient surface
//! binding. All asynchronous completions funnel through [`handle_event`] on
//! the camera-callback thread and are guarded by a monotonically increasing
//! generation counter: `close()` bumps the generation, so callbacks issued
//! before it are discarded instead of acting on torn-down resources.
//!
//! [`handle_event`]: SessionController::handle_event

use super::{
    CameraHandle, CameraProvider, CaptureRequest, DeviceEvent, DeviceEventSender, SessionState,
};
use crate::bridge::{CaptureTarget, Surface};
use crate::config::PreviewParameters;
use crate::errors::{StreamError, StreamResult};
use crate::pipeline::{HostEventSender, PipelineEvent};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Mutable session record, mutated only by the state machine
struct CameraSession {
    device_id: String,
    state: SessionState,
    request_template: PreviewParameters,
    generation: u64,
    handle: Option<Box<dyn CameraHandle>>,
    surface: Option<Surface>,
    target: Option<CaptureTarget>,
    current_request: Option<CaptureRequest>,
    stale_callbacks: u64,
}

/// Camera session state machine
///
/// Thread-safe: the control path calls `open`/`close` from the host's
/// thread while `handle_event` runs on the camera-callback thread; a single
/// mutex serialises them.
pub struct SessionController {
    session: Mutex<CameraSession>,
    provider: Arc<dyn CameraProvider>,
    events_tx: DeviceEventSender,
    host_tx: HostEventSender,
    permission_granted: AtomicBool,
}

impl SessionController {
    pub(crate) fn new(
        provider: Arc<dyn CameraProvider>,
        events_tx: DeviceEventSender,
        host_tx: HostEventSender,
        request_template: PreviewParameters,
    ) -> Self {
        Self {
            session: Mutex::new(CameraSession {
                device_id: String::new(),
                state: SessionState::Closed,
                request_template,
                generation: 0,
                handle: None,
                surface: None,
                target: None,
                current_request: None,
                stale_callbacks: 0,
            }),
            provider,
            events_tx,
            host_tx,
            permission_granted: AtomicBool::new(false),
        }
    }

    /// Record the permission collaborator's decision
    ///
    /// `open()` refuses to touch the provider until access is granted.
    pub fn set_permission(&self, granted: bool) {
        info!(granted, "Camera permission updated");
        self.permission_granted.store(granted, Ordering::Release);
    }

    /// Begin opening the device, binding the session to `target`
    ///
    /// Asynchronous: success here only means the claim is underway; the
    /// session becomes `Active` once the open and configure completions
    /// arrive. Claim failures are surfaced, never retried internally;
    /// resource contention is a host policy decision.
    ///
    /// Calling while a session is already underway (`Opening`,
    /// `Configuring` or `Active`) is a no-op, so overlapping host triggers
    /// (visibility return, texture-ready, permission-granted) cannot claim
    /// the device twice.
    pub fn open(&self, device_id: &str, target: CaptureTarget) -> StreamResult<()> {
        if !self.permission_granted.load(Ordering::Acquire) {
            return Err(StreamError::DeviceUnavailable(
                "camera permission not granted".to_string(),
            ));
        }

        let mut session = self.session.lock().unwrap();
        match session.state {
            SessionState::Opening | SessionState::Configuring | SessionState::Active => {
                debug!(state = %session.state, "open() ignored, session already in progress");
                return Ok(());
            }
            SessionState::Closed | SessionState::Closing | SessionState::Failed => {}
        }

        session.generation += 1;
        let generation = session.generation;
        session.device_id = device_id.to_string();
        session.target = Some(target);
        session.current_request = None;
        self.set_state(&mut session, SessionState::Opening);
        info!(device = %device_id, generation, "Opening camera device");

        if let Err(e) = self
            .provider
            .open_device(device_id, generation, self.events_tx.clone())
        {
            let error = match e {
                StreamError::DeviceUnavailable(_) => e,
                other => StreamError::DeviceUnavailable(other.to_string()),
            };
            self.fail(&mut session, error.clone());
            return Err(error);
        }
        Ok(())
    }

    /// Close the session from any state
    ///
    /// Idempotent and best-effort: the whole teardown chain always runs,
    /// and a second close is a no-op. Bumping the generation first
    /// guarantees no callback-driven action happens after close begins.
    pub fn close(&self) {
        let mut session = self.session.lock().unwrap();
        if session.state == SessionState::Closed {
            debug!("close() ignored, session already closed");
            return;
        }

        session.generation += 1;
        let from = session.state;
        self.set_state(&mut session, SessionState::Closing);
        Self::teardown(&mut session);
        self.set_state(&mut session, SessionState::Closed);
        info!(device = %session.device_id, from = %from, "Camera session closed");
    }

    /// Process one completion from the camera subsystem
    ///
    /// Runs on the camera-callback thread. The generation guard comes
    /// first: events issued before a `close()` or a failure are stale and
    /// are discarded without touching the session.
    pub fn handle_event(&self, event: DeviceEvent) {
        let mut session = self.session.lock().unwrap();
        if event.generation() != session.generation {
            session.stale_callbacks += 1;
            debug!(
                event = ?event,
                current = session.generation,
                "Discarding stale device callback"
            );
            // A stale open completion still carries a live device claim;
            // release it so a close() during Opening cannot leak the device.
            if let DeviceEvent::Opened { mut handle, .. } = event {
                handle.close();
            }
            return;
        }

        match event {
            DeviceEvent::Opened { handle, .. } => self.on_opened(&mut session, handle),
            DeviceEvent::OpenFailed { reason, .. } => {
                self.fail(&mut session, StreamError::DeviceUnavailable(reason));
            }
            DeviceEvent::SessionConfigured { .. } => self.on_configured(&mut session),
            DeviceEvent::SessionConfigureFailed { reason, .. } => {
                self.fail(&mut session, StreamError::ConfigurationRejected(reason));
            }
            DeviceEvent::Disconnected { .. } => {
                let error = if session.state == SessionState::Active {
                    StreamError::RuntimeDevice("device disconnected".to_string())
                } else {
                    StreamError::DeviceUnavailable("device disconnected".to_string())
                };
                self.fail(&mut session, error);
            }
            DeviceEvent::DeviceError { reason, .. } => {
                let error = if session.state == SessionState::Active {
                    StreamError::RuntimeDevice(reason)
                } else {
                    StreamError::DeviceUnavailable(reason)
                };
                self.fail(&mut session, error);
            }
        }
    }

    /// Device claim completed: build the capture request, bind the write
    /// surface and open the capture session against it
    fn on_opened(&self, session: &mut CameraSession, handle: Box<dyn CameraHandle>) {
        if session.state != SessionState::Opening {
            warn!(state = %session.state, "Unexpected open completion, discarding");
            return;
        }
        session.handle = Some(handle);
        self.set_state(session, SessionState::Configuring);

        let (target_id, bind_result) = match session.target.as_ref() {
            Some(target) => (target.id(), target.bind_surface()),
            None => {
                self.fail(
                    session,
                    StreamError::InvalidTarget("no capture target bound to session".to_string()),
                );
                return;
            }
        };
        let surface = match bind_result {
            Ok(surface) => surface,
            Err(e) => {
                self.fail(session, StreamError::ConfigurationRejected(e.to_string()));
                return;
            }
        };

        session.current_request = Some(CaptureRequest::from_template(
            &session.request_template,
            target_id,
        ));
        let sink = surface.sink();
        session.surface = Some(surface);
        let generation = session.generation;
        debug!(device = %session.device_id, %target_id, "Device opened, configuring capture session");

        let result = session
            .handle
            .as_mut()
            .map(|handle| handle.configure_session(sink, generation, self.events_tx.clone()));
        if let Some(Err(e)) = result {
            self.fail(session, StreamError::ConfigurationRejected(e.to_string()));
        }
    }

    /// Capture session negotiated: submit the repeating request and go Active
    fn on_configured(&self, session: &mut CameraSession) {
        if session.state != SessionState::Configuring {
            warn!(state = %session.state, "Unexpected configure completion, discarding");
            return;
        }
        let Some(request) = session.current_request else {
            self.fail(
                session,
                StreamError::ConfigurationRejected(
                    "session configured without a capture request".to_string(),
                ),
            );
            return;
        };

        let result = session
            .handle
            .as_mut()
            .map(|handle| handle.submit_repeating(&request));
        match result {
            Some(Ok(())) => {
                self.set_state(session, SessionState::Active);
                info!(
                    device = %session.device_id,
                    ?request,
                    "Repeating capture request submitted, session active"
                );
            }
            Some(Err(e)) => {
                self.fail(session, StreamError::ConfigurationRejected(e.to_string()));
            }
            None => {
                self.fail(
                    session,
                    StreamError::ConfigurationRejected(
                        "session configured without a device handle".to_string(),
                    ),
                );
            }
        }
    }

    /// Fatal failure: tear everything down and absorb into `Failed`
    fn fail(&self, session: &mut CameraSession, error: StreamError) {
        warn!(device = %session.device_id, error = %error, "Camera session failed");
        session.generation += 1;
        Self::teardown(session);
        self.set_state(session, SessionState::Failed);
        let _ = self.host_tx.unbounded_send(PipelineEvent::Error(error));
    }

    /// Best-effort resource release: stop streaming, drop the device claim,
    /// release the surface binding, unbind the target. The chain always
    /// runs to the end; nothing here can fail observably.
    fn teardown(session: &mut CameraSession) {
        if let Some(mut handle) = session.handle.take() {
            handle.stop_repeating();
            handle.close();
        }
        if let Some(mut surface) = session.surface.take() {
            surface.release();
        }
        session.target = None;
        session.current_request = None;
    }

    fn set_state(&self, session: &mut CameraSession, state: SessionState) {
        session.state = state;
        let _ = self
            .host_tx
            .unbounded_send(PipelineEvent::StateChanged(state));
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().unwrap().state
    }

    /// Snapshot of the request currently streaming (None unless configured)
    pub fn current_request(&self) -> Option<CaptureRequest> {
        self.session.lock().unwrap().current_request
    }

    /// Number of callbacks discarded by the generation guard
    pub fn stale_callback_count(&self) -> u64 {
        self.session.lock().unwrap().stale_callbacks
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session.lock().unwrap();
        f.debug_struct("SessionController")
            .field("device_id", &session.device_id)
            .field("state", &session.state)
            .field("generation", &session.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::FrameBridge;
    use crate::session::CameraThreadMessage;
    use std::sync::atomic::AtomicU32;

    /// Provider that hands control of completions to the test
    struct ManualProvider {
        opens: AtomicU32,
        fail_open: bool,
    }

    impl ManualProvider {
        fn new() -> Self {
            Self {
                opens: AtomicU32::new(0),
                fail_open: false,
            }
        }
    }

    impl CameraProvider for ManualProvider {
        fn open_device(
            &self,
            _device_id: &str,
            _generation: u64,
            _events: DeviceEventSender,
        ) -> StreamResult<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                Err(StreamError::DeviceUnavailable("device busy".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct HandleCounters {
        configures: AtomicU32,
        submits: AtomicU32,
        stops: AtomicU32,
        closes: AtomicU32,
    }

    struct FakeHandle {
        counters: Arc<HandleCounters>,
        configure_ok: bool,
    }

    impl CameraHandle for FakeHandle {
        fn configure_session(
            &mut self,
            _sink: crate::bridge::FrameSink,
            generation: u64,
            events: DeviceEventSender,
        ) -> StreamResult<()> {
            self.counters.configures.fetch_add(1, Ordering::SeqCst);
            if self.configure_ok {
                events.send(DeviceEvent::SessionConfigured { generation });
            } else {
                events.send(DeviceEvent::SessionConfigureFailed {
                    generation,
                    reason: "unsupported stream combination".to_string(),
                });
            }
            Ok(())
        }

        fn submit_repeating(&mut self, _request: &CaptureRequest) -> StreamResult<()> {
            self.counters.submits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop_repeating(&mut self) {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        controller: SessionController,
        provider: Arc<ManualProvider>,
        events_rx: tokio::sync::mpsc::UnboundedReceiver<CameraThreadMessage>,
        _host_rx: futures::channel::mpsc::UnboundedReceiver<PipelineEvent>,
        bridge: FrameBridge,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_provider(Arc::new(ManualProvider::new()))
        }

        fn with_provider(provider: Arc<ManualProvider>) -> Self {
            let (camera_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
            let (host_tx, host_rx) = futures::channel::mpsc::unbounded();
            let controller = SessionController::new(
                provider.clone(),
                DeviceEventSender::new(camera_tx),
                host_tx,
                PreviewParameters::default(),
            );
            controller.set_permission(true);
            Self {
                controller,
                provider,
                events_rx,
                _host_rx: host_rx,
                bridge: FrameBridge::new(),
            }
        }

        /// Drive queued completions synchronously, as the camera thread would
        fn drain_events(&mut self) {
            while let Ok(msg) = self.events_rx.try_recv() {
                if let CameraThreadMessage::Event(event) = msg {
                    self.controller.handle_event(event);
                }
            }
        }

        fn deliver_opened(&self, counters: &Arc<HandleCounters>, configure_ok: bool) {
            // Tests open once, so the live generation is 1
            self.controller.handle_event(DeviceEvent::Opened {
                generation: 1,
                handle: Box::new(FakeHandle {
                    counters: Arc::clone(counters),
                    configure_ok,
                }),
            });
        }
    }

    #[test]
    fn test_open_without_permission_fails() {
        let harness = Harness::new();
        harness.controller.set_permission(false);
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        assert!(matches!(
            harness.controller.open("0", target),
            Err(StreamError::DeviceUnavailable(_))
        ));
        assert_eq!(harness.controller.state(), SessionState::Closed);
        assert_eq!(harness.provider.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_configure_activates_session() {
        let mut harness = Harness::new();
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        harness.controller.open("0", target).unwrap();
        assert_eq!(harness.controller.state(), SessionState::Opening);

        let counters = Arc::new(HandleCounters::default());
        harness.deliver_opened(&counters, true);
        harness.drain_events();

        assert_eq!(harness.controller.state(), SessionState::Active);
        assert_eq!(counters.configures.load(Ordering::SeqCst), 1);
        assert_eq!(counters.submits.load(Ordering::SeqCst), 1);

        let request = harness.controller.current_request().unwrap();
        assert_eq!(
            request.autofocus,
            crate::config::AutofocusMode::ContinuousPicture
        );
        assert_eq!(request.auto_exposure, crate::config::ExposureMode::On);
        assert_eq!(request.anti_banding, crate::config::AntiBandingMode::Auto);
    }

    #[test]
    fn test_reopen_while_active_is_noop() {
        let mut harness = Harness::new();
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        let target_again = target.clone();
        harness.controller.open("0", target).unwrap();
        let counters = Arc::new(HandleCounters::default());
        harness.deliver_opened(&counters, true);
        harness.drain_events();
        assert_eq!(harness.controller.state(), SessionState::Active);

        harness.controller.open("0", target_again).unwrap();

        assert_eq!(harness.controller.state(), SessionState::Active);
        assert_eq!(
            harness.provider.opens.load(Ordering::SeqCst),
            1,
            "no duplicate device claim"
        );
        assert_eq!(
            counters.configures.load(Ordering::SeqCst),
            1,
            "no second capture session"
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut harness = Harness::new();
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        harness.controller.open("0", target).unwrap();
        let counters = Arc::new(HandleCounters::default());
        harness.deliver_opened(&counters, true);
        harness.drain_events();

        harness.controller.close();
        harness.controller.close();

        assert_eq!(harness.controller.state(), SessionState::Closed);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1, "no double-release");
    }

    #[test]
    fn test_close_while_opening_discards_late_completion() {
        let mut harness = Harness::new();
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        harness.controller.open("0", target).unwrap();
        assert_eq!(harness.controller.state(), SessionState::Opening);

        harness.controller.close();
        assert_eq!(harness.controller.state(), SessionState::Closed);

        // The open completion arrives after close: stale, discarded
        let counters = Arc::new(HandleCounters::default());
        harness.deliver_opened(&counters, true);
        harness.drain_events();

        assert_eq!(harness.controller.state(), SessionState::Closed);
        assert_eq!(harness.controller.stale_callback_count(), 1);
        assert_eq!(counters.configures.load(Ordering::SeqCst), 0);
        assert_eq!(
            counters.closes.load(Ordering::SeqCst),
            1,
            "late device claim released, not leaked"
        );
    }

    #[test]
    fn test_configure_failure_is_fatal() {
        let mut harness = Harness::new();
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        harness.controller.open("0", target).unwrap();
        let counters = Arc::new(HandleCounters::default());
        harness.deliver_opened(&counters, false);
        harness.drain_events();

        assert_eq!(harness.controller.state(), SessionState::Failed);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1, "resources torn down");
        assert!(harness.controller.current_request().is_none());
    }

    #[test]
    fn test_device_error_while_active_fails_session() {
        let mut harness = Harness::new();
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        harness.controller.open("0", target).unwrap();
        let counters = Arc::new(HandleCounters::default());
        harness.deliver_opened(&counters, true);
        harness.drain_events();
        assert_eq!(harness.controller.state(), SessionState::Active);

        harness.controller.handle_event(DeviceEvent::DeviceError {
            generation: 1,
            reason: "sensor fault".to_string(),
        });

        assert_eq!(harness.controller.state(), SessionState::Failed);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

        // Late frame/device callbacks for the failed generation are stale
        harness.controller.handle_event(DeviceEvent::SessionConfigured { generation: 1 });
        assert_eq!(harness.controller.stale_callback_count(), 1);
        assert_eq!(harness.controller.state(), SessionState::Failed);
    }

    #[test]
    fn test_synchronous_open_failure_maps_to_device_unavailable() {
        let provider = Arc::new(ManualProvider {
            opens: AtomicU32::new(0),
            fail_open: true,
        });
        let harness = Harness::with_provider(provider);
        let target = harness.bridge.bind_capture_target(1280, 720).unwrap();
        assert!(matches!(
            harness.controller.open("0", target),
            Err(StreamError::DeviceUnavailable(_))
        ));
        assert_eq!(harness.controller.state(), SessionState::Failed);
    }
}
