// SPDX-License-Identifier: GPL-3.0-only

//! camera-stream - a capture-to-texture streaming pipeline
//!
//! Streams frames from a camera device into a GPU-sampled texture in real
//! time, coordinating three execution contexts: the camera subsystem's
//! asynchronous callback-driven capture lifecycle, a latest-wins frame
//! buffer bridge, and a signal-driven render loop.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`pipeline`]: Host-facing facade wiring everything together
//! - [`session`]: Camera device/session state machine and hardware traits
//! - [`bridge`]: Frame buffer bridge between producer and GPU consumer
//! - [`render`]: Render loop coordination and the GPU surface trait
//! - [`threading`]: Execution contexts and their lifecycle
//! - [`synthetic`]: Synthetic camera driver for demos and tests
//! - [`config`]: Capture request template and host configuration
//!
//! # Example
//!
//! ```no_run
//! use camera_stream::{PreviewPipeline, PreviewParameters, SyntheticProvider, LoggingGpuSurface};
//! use std::sync::Arc;
//!
//! let (pipeline, _events) = PreviewPipeline::new(
//!     Arc::new(SyntheticProvider::new()),
//!     Box::new(LoggingGpuSurface::new()),
//!     PreviewParameters::default(),
//! );
//! pipeline.set_permission(true);
//! let target = pipeline.bind_capture_target(1280, 720).unwrap();
//! pipeline.open("0", target).unwrap();
//! // ... frames now stream into the GPU surface ...
//! pipeline.close();
//! ```

pub mod bridge;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod synthetic;
pub mod threading;

// Re-export commonly used types
pub use bridge::{CaptureTarget, FrameBridge, FrameBuffer, FrameSink, Surface, TargetId};
pub use config::{
    AntiBandingMode, AutofocusMode, ExposureMode, PipelineConfig, PreviewParameters,
};
pub use errors::{StreamError, StreamResult};
pub use pipeline::{PipelineEvent, PipelineEvents, PreviewPipeline};
pub use render::{GpuSurface, LoggingGpuSurface};
pub use session::{
    CameraHandle, CameraProvider, CaptureRequest, DeviceEvent, DeviceEventSender,
    SessionController, SessionState,
};
pub use synthetic::SyntheticProvider;
