pub mod tones;

use tones::CueTone;

use log::{debug, warn};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use serde::Serialize;
use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::{
        mpsc::{self, Sender},
        Mutex,
    },
    thread,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Cue {
    Success,
    Failure,
}

/// Fire-and-forget operator feedback. Implementations must never fail the
/// caller; playback problems are logged and dropped.
pub trait FeedbackPlayer: Send + Sync {
    fn play(&self, cue: Cue);
}

/// For headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentFeedback;

impl FeedbackPlayer for SilentFeedback {
    fn play(&self, cue: Cue) {
        debug!("feedback cue {cue:?} (muted)");
    }
}

/// Optional recorded clips; synthesized tones are used when absent.
#[derive(Debug, Clone, Default)]
pub struct CueClips {
    pub success: Option<PathBuf>,
    pub failure: Option<PathBuf>,
}

impl CueClips {
    fn path_for(&self, cue: Cue) -> Option<&PathBuf> {
        match cue {
            Cue::Success => self.success.as_ref(),
            Cue::Failure => self.failure.as_ref(),
        }
    }
}

enum AudioCommand {
    Play(Cue),
    Shutdown,
}

pub struct RodioFeedbackPlayer {
    tx: Mutex<Option<Sender<AudioCommand>>>,
    clips: CueClips,
    volume: f32,
}

impl RodioFeedbackPlayer {
    pub fn new(clips: CueClips, volume: f32) -> Self {
        Self {
            tx: Mutex::new(None),
            clips,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let clips = self.clips.clone();
        let volume = self.volume;

        // rodio output objects are not Send; they live on this thread only.
        thread::Builder::new()
            .name("feedback-audio".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, OutputStreamHandle)> = None;

                fn ensure_output(
                    output: &mut Option<(OutputStream, OutputStreamHandle)>,
                ) -> Result<&OutputStreamHandle, String> {
                    if output.is_none() {
                        let opened = OutputStream::try_default()
                            .map_err(|e| format!("Failed to open audio output: {}", e))?;
                        *output = Some(opened);
                    }
                    output
                        .as_ref()
                        .map(|(_, handle)| handle)
                        .ok_or_else(|| "audio output unavailable".to_string())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play(cue) => {
                            let result = ensure_output(&mut output).and_then(|handle| {
                                play_cue(handle, cue, clips.path_for(cue), volume)
                            });
                            if let Err(err) = result {
                                warn!("feedback cue {cue:?} not played: {err}");
                                // Re-open the device on the next cue.
                                output = None;
                            }
                        }
                        AudioCommand::Shutdown => break,
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

fn play_cue(
    handle: &OutputStreamHandle,
    cue: Cue,
    clip: Option<&PathBuf>,
    volume: f32,
) -> Result<(), String> {
    let sink = Sink::try_new(handle).map_err(|e| format!("Failed to create audio sink: {}", e))?;
    sink.set_volume(volume);

    match clip {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("cannot open clip {}: {}", path.display(), e))?;
            let source = Decoder::new(BufReader::new(file))
                .map_err(|e| format!("cannot decode clip {}: {}", path.display(), e))?;
            sink.append(source);
        }
        None => sink.append(CueTone::for_cue(cue)),
    }

    sink.detach();
    Ok(())
}

impl FeedbackPlayer for RodioFeedbackPlayer {
    fn play(&self, cue: Cue) {
        match self.ensure_thread() {
            Ok(tx) => {
                if let Err(err) = tx.send(AudioCommand::Play(cue)) {
                    warn!("feedback audio thread gone: {err}");
                }
            }
            Err(err) => warn!("feedback audio unavailable: {err}"),
        }
    }
}

impl Drop for RodioFeedbackPlayer {
    fn drop(&mut self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Shutdown);
        }
    }
}
