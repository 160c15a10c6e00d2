use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use crate::{
    error::ScanError,
    events::{EventBus, ScanEvent},
    scanner::DecoderEvent,
};

use super::controller::SubmissionResult;
use super::session::{ScanSession, SessionParts, SessionSnapshot};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const COMMAND_BUFFER: usize = 16;

pub enum SessionCommand {
    Retry(oneshot::Sender<Result<(), ScanError>>),
    ClearEntries(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Close(oneshot::Sender<()>),
}

/// Control surface of a running session. Dropping every handle closes the
/// session.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    bus: EventBus,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.bus.subscribe()
    }

    pub async fn retry(&self) -> Result<(), ScanError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Retry(tx)).await?;
        rx.await.map_err(|_| session_gone())?
    }

    pub async fn clear(&self) -> Result<(), ScanError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::ClearEntries(tx)).await?;
        rx.await.map_err(|_| session_gone())
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ScanError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| session_gone())
    }

    /// Returns once the camera is released. Closing twice is harmless.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(SessionCommand::Close(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn send(&self, command: SessionCommand) -> Result<(), ScanError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| session_gone())
    }
}

fn session_gone() -> ScanError {
    ScanError::UnexpectedDriverFailure("scanner session has ended".into())
}

/// Open a session and drive it on its own task.
pub async fn spawn_session(parts: SessionParts, bus: EventBus) -> (SessionHandle, JoinHandle<()>) {
    let (mut session, decoder_rx) = ScanSession::new(parts, bus.clone());
    session.open().await;

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = SessionHandle {
        session_id: session.id().to_string(),
        commands: commands_tx,
        bus,
    };
    let task = tokio::spawn(run_session(session, decoder_rx, commands_rx));
    (handle, task)
}

async fn run_session(
    mut session: ScanSession,
    mut decoder_rx: mpsc::UnboundedReceiver<DecoderEvent>,
    mut commands: mpsc::Receiver<SessionCommand>,
) {
    // At most one submission is ever in flight: the decoder is stopped before
    // one is spawned and restarted only after its result is applied.
    let mut in_flight: Option<JoinHandle<SubmissionResult>> = None;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Close(ack)) => {
                        detach(&mut in_flight);
                        session.close().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        log_info!("all session handles dropped; closing");
                        detach(&mut in_flight);
                        session.close().await;
                        break;
                    }
                    Some(SessionCommand::Retry(reply)) => {
                        let _ = reply.send(session.retry().await);
                    }
                    Some(SessionCommand::ClearEntries(reply)) => {
                        session.clear_entries().await;
                        let _ = reply.send(());
                    }
                    Some(SessionCommand::Snapshot(reply)) => {
                        let _ = reply.send(session.snapshot());
                    }
                }
            }

            joined = join_in_flight(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                match joined {
                    Ok(result) => session.finish(result).await,
                    Err(err) => {
                        log_error!("submission task failed: {err}");
                        session.resume().await;
                    }
                }
            }

            Some(event) = decoder_rx.recv() => {
                if let Some(pending) = session.on_decoder_event(event).await {
                    in_flight = Some(tokio::spawn(pending.submit()));
                }
            }
        }
    }
}

async fn join_in_flight(
    slot: &mut Option<JoinHandle<SubmissionResult>>,
) -> Result<SubmissionResult, JoinError> {
    match slot.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// The request keeps running in the background; its result is never looked
/// at.
fn detach(slot: &mut Option<JoinHandle<SubmissionResult>>) {
    if slot.take().is_some() {
        log_info!("closing with a submission in flight; its result will be discarded");
    }
}
