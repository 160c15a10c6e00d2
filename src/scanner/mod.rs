pub mod camera;
pub mod controller;
pub mod decoder;
pub mod loop_worker;
pub mod state;

pub use camera::{CameraDevice, CameraError, Frame, SpoolCamera};
pub use controller::{DecoderDriver, DriverOptions};
pub use decoder::{DecodeError, FrameDecoder, QrFrameDecoder};
pub use loop_worker::{DecoderEvent, LoopFault};
pub use state::{DecoderState, DriverStatus, FacingMode, PermissionState};
