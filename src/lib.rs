//! Unified media input kernel.
//!
//! This crate abstracts two interchangeable frame origins — a live
//! capture device and a seekable video file — behind one control
//! surface, streams frames continuously to subscribers, records the
//! live stream to disk concurrently with display, and exposes
//! transport control (pause/resume/seek) for seekable sources.
//!
//! # Architecture
//!
//! - `source`: frame origins (`CameraSource`, `FileSource`) behind the
//!   `InputSource` adapter with an explicit seekability capability
//! - `frame`: the frame value type fanned out to consumers
//! - `producer`: one worker thread per open source; cooperative
//!   pause/record flags, synchronous recording writes, blocking stop
//! - `sink`: the recording writer, bound to one output file
//! - `controller`: the public command API and lifecycle owner
//! - `events`: bounded pub/sub fan-out of frame and status events
//! - `metadata`: dual-write (JSON + SQLite) record store with the
//!   append-only recording index
//! - `config`: file + environment configuration loading
//! - `remote`: the boundary handed to remote inference collaborators
//!
//! Exactly one source is open at a time and at most one recording
//! session is active; opening a new source fully tears down the old
//! producer (blocking join) before the new one starts.

pub mod config;
pub mod controller;
pub mod events;
pub mod frame;
pub mod metadata;
pub mod producer;
pub mod remote;
pub mod sink;
pub mod source;

pub use config::{CaptureConfig, RecordingSettings};
pub use controller::{format_elapsed, ControllerState, InputController};
pub use events::{EventBus, PipelineEvent};
pub use frame::{Frame, SharedFrame};
pub use metadata::{IndexEntry, MetadataRecord, MetadataStore, RecordingIndex, RecordingParams};
pub use producer::FrameProducer;
pub use remote::{FrameAnalyzer, NullAnalyzer};
pub use sink::RecordingSink;
pub use source::{
    CameraConfig, CameraSource, FileOpenError, FileSource, InputSource, InputType,
    SUPPORTED_EXTENSIONS,
};
