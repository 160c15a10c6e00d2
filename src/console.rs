//! Terminal scanner view: operator commands in, rendered events out.

use std::str::FromStr;

use crate::{
    coordinator::{format_amount, SessionSnapshot},
    events::{ScanEvent, Tone},
    models::{DisplayEntry, EntryStatus},
};

pub const HELP: &str = "commands: retry | list | clear | status | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Retry,
    List,
    Clear,
    Status,
    Quit,
    Help,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "retry" | "r" => Ok(ConsoleCommand::Retry),
            "list" | "ls" | "l" => Ok(ConsoleCommand::List),
            "clear" => Ok(ConsoleCommand::Clear),
            "status" | "s" => Ok(ConsoleCommand::Status),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            "help" | "?" => Ok(ConsoleCommand::Help),
            other => Err(format!("unknown command '{other}' ({HELP})")),
        }
    }
}

fn tone_marker(tone: Tone) -> &'static str {
    match tone {
        Tone::Success => "[ok]",
        Tone::Warning => "[!!]",
        Tone::Error => "[xx]",
    }
}

pub fn render_event(event: &ScanEvent) -> String {
    match event {
        ScanEvent::DecoderStateChanged { state, permission } => {
            format!("camera: {state:?} (permission {permission:?})")
        }
        ScanEvent::Toast { tone, message, .. } => format!("{} {message}", tone_marker(*tone)),
        ScanEvent::EntryUpserted { entry, replaced } => {
            let verb = if *replaced { "updated" } else { "added" };
            format!("{verb}: {}", render_entry(entry))
        }
        ScanEvent::DeviceError { message, .. } => {
            format!("[xx] {message} Type 'retry' to try again.")
        }
        ScanEvent::SessionClosed { .. } => "scanner closed".to_string(),
    }
}

pub fn render_entry(entry: &DisplayEntry) -> String {
    let mut line = format!(
        "{} {}",
        entry.timestamp.format("%H:%M:%S"),
        entry.subject_id
    );
    if let Some(name) = &entry.subject_name {
        line.push_str(&format!(" {name}"));
    }
    if let Some(course) = &entry.course_label {
        line.push_str(&format!(" ({course})"));
    }
    line.push_str(match entry.status {
        EntryStatus::Present => " present",
        EntryStatus::Failed => " failed",
    });
    if let Some(amount) = entry.pending_fee_amount.filter(|amount| *amount > 0.0) {
        line.push_str(&format!(", fees due ₹{}", format_amount(amount)));
    }
    line
}

pub fn render_entries(entries: &[DisplayEntry]) -> String {
    if entries.is_empty() {
        return "no subjects scanned yet".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| format!("{:>3}. {}", index + 1, render_entry(entry)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_status(snapshot: &SessionSnapshot) -> String {
    let present = snapshot
        .entries
        .iter()
        .filter(|entry| entry.status == EntryStatus::Present)
        .count();
    let mut status = format!(
        "session {} | camera {:?} | phase {:?} | {} present",
        snapshot.session_id, snapshot.driver.decoder_state, snapshot.phase, present
    );
    if let Some(err) = &snapshot.driver.last_error {
        status.push_str(&format!(" | last error: {err}"));
    }
    status
}
