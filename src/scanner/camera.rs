//! Capture devices.
//!
//! `SpoolCamera` reads frames that an external capture process drops into a
//! directory. Ownership is exclusive through a lock file in the spool root
//! that records the holder's pid; a lock whose process is gone is reclaimed.
//!
//! The spool behaves like a live feed, not a queue: each read serves the
//! newest frame and deletes everything older. Producers should write frames
//! under a temporary name and rename them into place.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;

use crate::error::ScanError;

use super::state::FacingMode;

const LOCK_FILE: &str = ".scanner.lock";
const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("no camera available: {0}")]
    NoCameraAvailable(String),

    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera held by {0}")]
    DeviceBusy(String),

    #[error("camera read failed: {0}")]
    Io(String),
}

impl From<CameraError> for ScanError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::NoCameraAvailable(detail) => ScanError::NoCameraFound(detail),
            CameraError::PermissionDenied(detail) => ScanError::CameraPermissionDenied(detail),
            CameraError::DeviceBusy(holder) => ScanError::DeviceBusy(holder),
            CameraError::Io(detail) => ScanError::UnexpectedDriverFailure(detail),
        }
    }
}

pub trait CameraDevice: Send {
    /// No-op when already acquired.
    fn acquire(&mut self, facing: FacingMode) -> Result<(), CameraError>;

    /// The most recent frame, or `Ok(None)` when nothing new arrived.
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Drop frames captured while decoding was paused. Returns how many were
    /// dropped.
    fn discard_backlog(&mut self) -> usize {
        0
    }

    fn release(&mut self);

    fn is_acquired(&self) -> bool;
}

pub struct SpoolCamera {
    root: PathBuf,
    owner: String,
    frames_dir: Option<PathBuf>,
    lock_path: Option<PathBuf>,
}

impl SpoolCamera {
    pub fn new(root: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            owner: owner.into(),
            frames_dir: None,
            lock_path: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn spool_dir_for(&self, facing: FacingMode) -> PathBuf {
        let subdir = match facing {
            FacingMode::Environment => "rear",
            FacingMode::User => "front",
        };
        let candidate = self.root.join(subdir);
        if candidate.is_dir() {
            candidate
        } else {
            self.root.clone()
        }
    }
}

fn map_io(path: &Path, err: io::Error) -> CameraError {
    match err.kind() {
        io::ErrorKind::NotFound => {
            CameraError::NoCameraAvailable(format!("{} does not exist", path.display()))
        }
        io::ErrorKind::PermissionDenied => {
            CameraError::PermissionDenied(format!("cannot read {}", path.display()))
        }
        _ => CameraError::Io(format!("{}: {err}", path.display())),
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                FRAME_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
}

/// Frame files in `dir`, oldest first.
fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let entries = fs::read_dir(dir).map_err(|err| map_io(dir, err))?;
    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| map_io(dir, err))?;
        let path = entry.path();
        if !is_frame_file(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, path));
    }
    candidates.sort();
    Ok(candidates.into_iter().map(|(_, path)| path).collect())
}

fn remove_frames(frames: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in frames {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("failed to drop frame {}: {err}", path.display()),
        }
    }
    removed
}

/// Lock file layout: `<pid>\n<owner>\n`.
#[derive(Debug, PartialEq, Eq)]
struct LockHolder {
    pid: Option<u32>,
    owner: String,
}

impl LockHolder {
    fn read(path: &Path) -> Self {
        let contents = fs::read_to_string(path).unwrap_or_default();
        let mut lines = contents.lines().map(str::trim);
        let first = lines.next().unwrap_or_default();
        match first.parse::<u32>() {
            Ok(pid) => Self {
                pid: Some(pid),
                owner: lines.next().unwrap_or_default().to_string(),
            },
            Err(_) => Self {
                pid: None,
                owner: first.to_string(),
            },
        }
    }

    fn describe(&self) -> String {
        match (self.owner.is_empty(), self.pid) {
            (false, _) => self.owner.clone(),
            (true, Some(pid)) => format!("pid {pid}"),
            (true, None) => "another session".into(),
        }
    }

    /// Only a recorded pid that no longer runs counts as stale.
    fn is_stale(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        if pid == std::process::id() {
            return false;
        }
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        system.process(pid).is_none()
    }
}

impl SpoolCamera {
    fn create_lock(&self, lock_path: &Path) -> io::Result<fs::File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
    }

    fn open_lock(&self, lock_path: &Path) -> Result<fs::File, CameraError> {
        match self.create_lock(lock_path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() != io::ErrorKind::AlreadyExists => {
                return Err(map_io(lock_path, err))
            }
            Err(_) => {}
        }

        let holder = LockHolder::read(lock_path);
        if !holder.is_stale() {
            return Err(CameraError::DeviceBusy(holder.describe()));
        }

        warn!(
            "reclaiming camera spool lock left by {} (process no longer running)",
            holder.describe()
        );
        if let Err(err) = fs::remove_file(lock_path) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(map_io(lock_path, err));
            }
        }
        // Another scanner may have reclaimed it first.
        self.create_lock(lock_path).map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => {
                CameraError::DeviceBusy(LockHolder::read(lock_path).describe())
            }
            _ => map_io(lock_path, err),
        })
    }
}

impl CameraDevice for SpoolCamera {
    fn acquire(&mut self, facing: FacingMode) -> Result<(), CameraError> {
        if self.lock_path.is_some() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.root).map_err(|err| map_io(&self.root, err))?;
        if !metadata.is_dir() {
            return Err(CameraError::NoCameraAvailable(format!(
                "{} is not a frame spool directory",
                self.root.display()
            )));
        }

        let frames_dir = self.spool_dir_for(facing);
        fs::read_dir(&frames_dir).map_err(|err| map_io(&frames_dir, err))?;

        let lock_path = self.root.join(LOCK_FILE);
        let mut lock = self.open_lock(&lock_path)?;
        if let Err(err) = write!(lock, "{}\n{}\n", std::process::id(), self.owner) {
            warn!("failed to record owner in {}: {err}", lock_path.display());
        }

        info!(
            "Camera spool {} acquired ({} facing)",
            frames_dir.display(),
            facing.as_str()
        );
        self.frames_dir = Some(frames_dir);
        self.lock_path = Some(lock_path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let Some(dir) = self.frames_dir.as_ref() else {
            return Err(CameraError::Io("camera not acquired".into()));
        };

        let mut frames = list_frames(dir)?;
        let Some(path) = frames.pop() else {
            return Ok(None);
        };
        let skipped = remove_frames(&frames);
        if skipped > 0 {
            debug!("skipped {skipped} older frame(s)");
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            // Removed by the producer between listing and reading.
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(map_io(&path, err)),
        };
        if let Err(err) = fs::remove_file(&path) {
            warn!("failed to consume frame {}: {err}", path.display());
        }

        Ok(Some(Frame::new(bytes)))
    }

    fn discard_backlog(&mut self) -> usize {
        let Some(dir) = self.frames_dir.as_ref() else {
            return 0;
        };
        match list_frames(dir) {
            Ok(frames) => remove_frames(&frames),
            Err(err) => {
                warn!("could not flush frame spool: {err}");
                0
            }
        }
    }

    fn release(&mut self) {
        self.frames_dir = None;
        if let Some(lock_path) = self.lock_path.take() {
            match fs::remove_file(&lock_path) {
                Ok(()) => debug!("Camera spool {} released", self.root.display()),
                Err(err) => warn!("failed to remove {}: {err}", lock_path.display()),
            }
        }
    }

    fn is_acquired(&self) -> bool {
        self.lock_path.is_some()
    }
}

impl Drop for SpoolCamera {
    fn drop(&mut self) {
        self.release();
    }
}
