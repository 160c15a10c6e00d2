use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::events::{EventBus, ScanEvent};

use super::camera::{CameraDevice, CameraError};
use super::decoder::FrameDecoder;
use super::loop_worker::{decode_loop, DecoderEvent, LoopContext, LoopFault, SharedCamera};
use super::state::{DecoderState, DriverStatus, FacingMode, PermissionState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const RESTART_BACKOFF_MS: u64 = 100;
const RESTART_JITTER_MS: u64 = 50;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub poll_interval: Duration,
    pub max_restart_attempts: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(150),
            max_restart_attempts: 3,
        }
    }
}

/// Owns the capture device and the decode loop of one scan session.
pub struct DecoderDriver {
    camera: SharedCamera,
    decoder: Arc<dyn FrameDecoder>,
    events_tx: mpsc::UnboundedSender<DecoderEvent>,
    bus: EventBus,
    options: DriverOptions,
    status: DriverStatus,
    facing: FacingMode,
    frames_seen: Arc<AtomicU64>,
    frames_at_restart: u64,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DecoderDriver {
    pub fn new(
        camera: Box<dyn CameraDevice>,
        decoder: Arc<dyn FrameDecoder>,
        events_tx: mpsc::UnboundedSender<DecoderEvent>,
        bus: EventBus,
        options: DriverOptions,
    ) -> Self {
        Self {
            camera: Arc::new(Mutex::new(camera)),
            decoder,
            events_tx,
            bus,
            options,
            status: DriverStatus::default(),
            facing: FacingMode::default(),
            frames_seen: Arc::new(AtomicU64::new(0)),
            frames_at_restart: 0,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn status(&self) -> &DriverStatus {
        &self.status
    }

    pub fn state(&self) -> DecoderState {
        self.status.decoder_state
    }

    /// Acquire the camera if needed and begin decoding from the live frame.
    /// Frames captured while paused are dropped. Calling it while `Active` is
    /// a no-op.
    pub async fn start(&mut self, facing: FacingMode) -> Result<(), ScanError> {
        if self.status.decoder_state == DecoderState::Active {
            return Ok(());
        }

        self.facing = facing;
        self.set_state(DecoderState::Starting);

        let prepared = self
            .with_camera(move |camera| {
                if !camera.is_acquired() {
                    camera.acquire(facing)?;
                }
                Ok::<_, CameraError>(camera.discard_backlog())
            })
            .await
            .and_then(|result| result.map_err(ScanError::from));
        let dropped = match prepared {
            Ok(dropped) => dropped,
            Err(err) => {
                self.fail(err.clone());
                return Err(err);
            }
        };
        if dropped > 0 {
            log_debug!("dropped {dropped} frame(s) captured while paused");
        }

        self.status.permission_state = PermissionState::Granted;
        self.status.last_error = None;
        self.status.epoch += 1;

        let cancel_token = CancellationToken::new();
        let ctx = LoopContext {
            epoch: self.status.epoch,
            camera: Arc::clone(&self.camera),
            decoder: Arc::clone(&self.decoder),
            events: self.events_tx.clone(),
            poll_interval: self.options.poll_interval,
            frames_seen: Arc::clone(&self.frames_seen),
        };
        self.handle = Some(tokio::spawn(decode_loop(ctx, cancel_token.clone())));
        self.cancel_token = Some(cancel_token);

        log_info!("decoder active (epoch {})", self.status.epoch);
        self.set_state(DecoderState::Active);
        Ok(())
    }

    /// Halt decoding but keep the camera for a fast restart. Takes effect
    /// before returning: nothing from the current epoch is accepted after.
    pub fn stop(&mut self) {
        self.halt_loop();
        if matches!(
            self.status.decoder_state,
            DecoderState::Active | DecoderState::Starting
        ) {
            self.set_state(DecoderState::Paused);
        }
    }

    /// Accept a decode event if it belongs to the running epoch, stopping
    /// the decoder before anything else happens.
    pub fn accept_decode(&mut self, epoch: u64) -> bool {
        if epoch != self.status.epoch || self.status.decoder_state != DecoderState::Active {
            log_debug!(
                "discarding decode from epoch {epoch} (current {}, {:?})",
                self.status.epoch,
                self.status.decoder_state
            );
            return false;
        }
        self.stop();
        self.status.restart_attempts = 0;
        true
    }

    /// Recover from a loop fault with a bounded soft restart. Returns an
    /// error only once the decoder has entered `Error`.
    pub async fn handle_fault(&mut self, epoch: u64, fault: LoopFault) -> Result<(), ScanError> {
        if epoch != self.status.epoch || self.status.decoder_state != DecoderState::Active {
            return Ok(());
        }

        let err = fault.into_scan_error();
        if err.requires_device_retry() {
            self.halt_loop();
            self.release_camera().await;
            self.fail(err.clone());
            return Err(err);
        }

        // Frames processed since the last restart prove the loop recovered.
        if self.frames_seen.load(Ordering::Relaxed) > self.frames_at_restart {
            self.status.restart_attempts = 0;
        }
        self.status.restart_attempts += 1;

        if self.status.restart_attempts > self.options.max_restart_attempts {
            let terminal = ScanError::UnexpectedDriverFailure(format!(
                "gave up after {} restarts: {err}",
                self.options.max_restart_attempts
            ));
            self.halt_loop();
            self.release_camera().await;
            self.fail(terminal.clone());
            return Err(terminal);
        }

        log_warn!(
            "restarting decoder (attempt {}/{}) after: {err}",
            self.status.restart_attempts,
            self.options.max_restart_attempts
        );
        self.stop();
        tokio::time::sleep(restart_backoff(self.status.restart_attempts)).await;
        self.release_camera().await;
        self.frames_at_restart = self.frames_seen.load(Ordering::Relaxed);
        self.start(self.facing).await
    }

    /// Release the camera. After this the driver needs a full
    /// re-acquisition to scan again.
    pub async fn destroy(&mut self) {
        if self.status.decoder_state == DecoderState::Closed {
            return;
        }
        self.halt_loop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.release_camera().await;
        self.status.permission_state = PermissionState::Unknown;
        self.set_state(DecoderState::Closed);
    }

    fn halt_loop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }

    async fn release_camera(&self) {
        if let Err(err) = self.with_camera(|camera| camera.release()).await {
            log_warn!("camera release failed: {err}");
        }
    }

    /// Camera I/O runs on a blocking thread; a frame read from the previous
    /// epoch may still hold the lock.
    async fn with_camera<T, F>(&self, f: F) -> Result<T, ScanError>
    where
        F: FnOnce(&mut dyn CameraDevice) -> T + Send + 'static,
        T: Send + 'static,
    {
        let camera = Arc::clone(&self.camera);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_camera(&camera);
            f(&mut **guard)
        })
        .await
        .map_err(|err| ScanError::UnexpectedDriverFailure(format!("camera worker failed: {err}")))
    }

    fn fail(&mut self, err: ScanError) {
        self.status.permission_state = match err {
            ScanError::CameraPermissionDenied(_) => PermissionState::Denied,
            ScanError::NoCameraFound(_) => PermissionState::Unknown,
            _ => self.status.permission_state,
        };
        log_warn!("decoder entering error state: {err}");
        self.status.last_error = Some(err);
        self.set_state(DecoderState::Error);
    }

    fn set_state(&mut self, next: DecoderState) {
        let current = self.status.decoder_state;
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            log_warn!("unexpected decoder transition {current:?} -> {next:?}");
        }
        self.status.decoder_state = next;
        self.bus.publish(ScanEvent::DecoderStateChanged {
            state: next,
            permission: self.status.permission_state,
        });
    }
}

impl Drop for DecoderDriver {
    fn drop(&mut self) {
        self.halt_loop();
    }
}

fn lock_camera(camera: &SharedCamera) -> std::sync::MutexGuard<'_, Box<dyn CameraDevice>> {
    match camera.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn restart_backoff(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=RESTART_JITTER_MS);
    Duration::from_millis(RESTART_BACKOFF_MS * u64::from(attempt) + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::camera::{CameraError, Frame};
    use crate::scanner::decoder::DecodeError;
    use std::sync::atomic::AtomicUsize;

    struct FakeCamera {
        acquire_result: Result<(), CameraError>,
        acquired: bool,
        acquisitions: Arc<AtomicUsize>,
    }

    impl FakeCamera {
        fn working(acquisitions: Arc<AtomicUsize>) -> Self {
            Self {
                acquire_result: Ok(()),
                acquired: false,
                acquisitions,
            }
        }

        fn failing(err: CameraError) -> Self {
            Self {
                acquire_result: Err(err),
                acquired: false,
                acquisitions: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CameraDevice for FakeCamera {
        fn acquire(&mut self, _facing: FacingMode) -> Result<(), CameraError> {
            self.acquire_result.clone()?;
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            self.acquired = true;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            Ok(None)
        }

        fn release(&mut self) {
            self.acquired = false;
        }

        fn is_acquired(&self) -> bool {
            self.acquired
        }
    }

    struct NeverDecodes;

    impl FrameDecoder for NeverDecodes {
        fn decode(&self, _frame: &Frame) -> Result<String, DecodeError> {
            Err(DecodeError::NothingFound)
        }
    }

    fn driver(camera: FakeCamera, max_restart_attempts: u32) -> DecoderDriver {
        let (tx, _rx) = mpsc::unbounded_channel();
        DecoderDriver::new(
            Box::new(camera),
            Arc::new(NeverDecodes),
            tx,
            EventBus::default(),
            DriverOptions {
                poll_interval: Duration::from_millis(5),
                max_restart_attempts,
            },
        )
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_active() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut driver = driver(FakeCamera::working(acquisitions.clone()), 3);

        driver.start(FacingMode::Environment).await.unwrap();
        let epoch = driver.status().epoch;
        driver.start(FacingMode::Environment).await.unwrap();

        assert_eq!(driver.state(), DecoderState::Active);
        assert_eq!(driver.status().epoch, epoch);
        assert_eq!(acquisitions.load(Ordering::SeqCst), 1);
        assert_eq!(driver.status().permission_state, PermissionState::Granted);
    }

    #[tokio::test]
    async fn test_stop_keeps_camera_and_restart_skips_acquire() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut driver = driver(FakeCamera::working(acquisitions.clone()), 3);

        driver.start(FacingMode::Environment).await.unwrap();
        driver.stop();
        driver.stop();
        assert_eq!(driver.state(), DecoderState::Paused);

        driver.start(FacingMode::Environment).await.unwrap();
        assert_eq!(driver.state(), DecoderState::Active);
        assert_eq!(driver.status().epoch, 2);
        assert_eq!(acquisitions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accept_decode_only_once_per_epoch() {
        let mut driver = driver(FakeCamera::working(Arc::new(AtomicUsize::new(0))), 3);
        driver.start(FacingMode::Environment).await.unwrap();
        let epoch = driver.status().epoch;

        assert!(driver.accept_decode(epoch));
        assert_eq!(driver.state(), DecoderState::Paused);
        assert!(!driver.accept_decode(epoch));

        driver.start(FacingMode::Environment).await.unwrap();
        assert!(!driver.accept_decode(epoch));
        assert!(driver.accept_decode(epoch + 1));
    }

    #[tokio::test]
    async fn test_permission_denied_enters_error() {
        let mut driver = driver(
            FakeCamera::failing(CameraError::PermissionDenied("blocked".into())),
            3,
        );

        let err = driver.start(FacingMode::Environment).await.unwrap_err();
        assert!(matches!(err, ScanError::CameraPermissionDenied(_)));
        assert_eq!(driver.state(), DecoderState::Error);
        assert_eq!(driver.status().permission_state, PermissionState::Denied);
        assert_eq!(driver.status().last_error, Some(err));
    }

    #[tokio::test]
    async fn test_no_camera_enters_error() {
        let mut driver = driver(
            FakeCamera::failing(CameraError::NoCameraAvailable("none".into())),
            3,
        );
        assert!(matches!(
            driver.start(FacingMode::Environment).await,
            Err(ScanError::NoCameraFound(_))
        ));
        assert_eq!(driver.state(), DecoderState::Error);
    }

    #[tokio::test]
    async fn test_driver_faults_restart_then_give_up() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut driver = driver(FakeCamera::working(acquisitions.clone()), 2);
        driver.start(FacingMode::Environment).await.unwrap();

        for _ in 0..2 {
            let epoch = driver.status().epoch;
            driver
                .handle_fault(epoch, LoopFault::Decoder("glitch".into()))
                .await
                .unwrap();
            assert_eq!(driver.state(), DecoderState::Active);
        }
        assert_eq!(acquisitions.load(Ordering::SeqCst), 3);

        let epoch = driver.status().epoch;
        let err = driver
            .handle_fault(epoch, LoopFault::Decoder("glitch".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::UnexpectedDriverFailure(_)));
        assert_eq!(driver.state(), DecoderState::Error);

        // explicit retry recovers
        driver.start(FacingMode::Environment).await.unwrap();
        assert_eq!(driver.state(), DecoderState::Active);
    }

    #[tokio::test]
    async fn test_stale_faults_are_ignored() {
        let mut driver = driver(FakeCamera::working(Arc::new(AtomicUsize::new(0))), 0);
        driver.start(FacingMode::Environment).await.unwrap();
        let stale = driver.status().epoch;
        driver.stop();
        driver.start(FacingMode::Environment).await.unwrap();

        driver
            .handle_fault(stale, LoopFault::Decoder("old".into()))
            .await
            .unwrap();
        assert_eq!(driver.state(), DecoderState::Active);
    }

    #[tokio::test]
    async fn test_start_waits_for_camera_off_the_runtime() {
        let mut driver = driver(FakeCamera::working(Arc::new(AtomicUsize::new(0))), 3);

        let camera = Arc::clone(&driver.camera);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = lock_camera(&camera);
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(200));
        });
        locked_rx.recv().unwrap();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        driver.start(FacingMode::Environment).await.unwrap();
        ticker.abort();
        holder.join().unwrap();

        assert_eq!(driver.state(), DecoderState::Active);
        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_destroy_releases_and_closes() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut driver = driver(FakeCamera::working(acquisitions.clone()), 3);
        driver.start(FacingMode::Environment).await.unwrap();

        driver.destroy().await;
        assert_eq!(driver.state(), DecoderState::Closed);
        assert_eq!(driver.status().permission_state, PermissionState::Unknown);

        driver.start(FacingMode::Environment).await.unwrap();
        assert_eq!(acquisitions.load(Ordering::SeqCst), 2);
    }
}
