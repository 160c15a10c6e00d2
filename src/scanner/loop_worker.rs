use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;

use super::camera::{CameraDevice, CameraError};
use super::decoder::{DecodeError, FrameDecoder};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const FRAME_TIMEOUT_SECS: u64 = 5;

pub type SharedCamera = Arc<Mutex<Box<dyn CameraDevice>>>;

/// What the decode loop reports to the session. Everything carries the
/// epoch of the `start()` that spawned the loop.
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    Decoded { epoch: u64, payload: String },
    Fault { epoch: u64, fault: LoopFault },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopFault {
    Camera(CameraError),
    Decoder(String),
    Stalled,
}

impl LoopFault {
    pub fn into_scan_error(self) -> ScanError {
        match self {
            LoopFault::Camera(err) => err.into(),
            LoopFault::Decoder(detail) => ScanError::UnexpectedDriverFailure(detail),
            LoopFault::Stalled => ScanError::UnexpectedDriverFailure(format!(
                "no frame processed within {FRAME_TIMEOUT_SECS}s"
            )),
        }
    }
}

pub(crate) struct LoopContext {
    pub epoch: u64,
    pub camera: SharedCamera,
    pub decoder: Arc<dyn FrameDecoder>,
    pub events: mpsc::UnboundedSender<DecoderEvent>,
    pub poll_interval: Duration,
    /// Frames that reached the decoder, found a code or not.
    pub frames_seen: Arc<AtomicU64>,
}

enum FrameOutcome {
    NoFrame,
    Noise,
    Decoded(String),
    Fault(LoopFault),
}

pub(crate) async fn decode_loop(ctx: LoopContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_debug!("decode loop epoch {} shutting down", ctx.epoch);
                break;
            }
            _ = ticker.tick() => {
                let attempt = tokio::task::spawn_blocking({
                    let camera = Arc::clone(&ctx.camera);
                    let decoder = Arc::clone(&ctx.decoder);
                    move || capture_and_decode(&camera, decoder.as_ref())
                });

                let outcome = match tokio::time::timeout(Duration::from_secs(FRAME_TIMEOUT_SECS), attempt).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(join_err)) => FrameOutcome::Fault(LoopFault::Decoder(format!("decode worker failed: {join_err}"))),
                    Err(_) => FrameOutcome::Fault(LoopFault::Stalled),
                };

                // Stopped while the frame was in flight: whatever it held is stale.
                if cancel_token.is_cancelled() {
                    break;
                }

                match outcome {
                    FrameOutcome::NoFrame => {}
                    FrameOutcome::Noise => {
                        ctx.frames_seen.fetch_add(1, Ordering::Relaxed);
                    }
                    FrameOutcome::Decoded(payload) => {
                        ctx.frames_seen.fetch_add(1, Ordering::Relaxed);
                        log_debug!("decoded {} bytes (epoch {})", payload.len(), ctx.epoch);
                        if ctx.events.send(DecoderEvent::Decoded { epoch: ctx.epoch, payload }).is_err() {
                            break;
                        }
                    }
                    FrameOutcome::Fault(fault) => {
                        log_warn!("decode loop epoch {} faulted: {fault:?}", ctx.epoch);
                        let _ = ctx.events.send(DecoderEvent::Fault { epoch: ctx.epoch, fault });
                        break;
                    }
                }
            }
        }
    }
}

fn capture_and_decode(camera: &SharedCamera, decoder: &dyn FrameDecoder) -> FrameOutcome {
    let frame = {
        let mut guard = match camera.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return FrameOutcome::NoFrame,
            Err(err) => return FrameOutcome::Fault(LoopFault::Camera(err)),
        }
    };

    match decoder.decode(&frame) {
        Ok(payload) => FrameOutcome::Decoded(payload),
        Err(DecodeError::NothingFound) => {
            log::trace!("no code in frame");
            FrameOutcome::Noise
        }
        Err(DecodeError::Driver(detail)) => FrameOutcome::Fault(LoopFault::Decoder(detail)),
    }
}
