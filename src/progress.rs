//! # Progress Reporting
//!
//! Pipeline stages report through a one-way event sink instead of a
//! callback. Sending never blocks and never fails the operation; a
//! [`Progress::silent`] sink simply drops status events.
//!
//! The CLI attaches a [`Spinner`] to the receiving end. The spinner runs as
//! a separate tokio task and is always **joined** before the final status
//! line is printed, so a failed operation never leaves a stale in-progress
//! line behind.
//!
//! ```rust,ignore
//! let (spinner, progress) = Spinner::start("Preparing houdini");
//! let result = catalog.prepare("houdini", "13.0.0", Arch::X86_64, &progress).await;
//! spinner.finish(result.is_ok(), "houdini").await;
//! ```

use crate::constants::{SPINNER_FRAMES, SPINNER_INTERVAL};
use std::fmt;
use std::io::{IsTerminal, Write};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// States of a single add-on preparation.
///
/// `Idle → Downloading → Extracting → Staging → Done`, with `Failed`
/// reachable from any state. Nothing is retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareState {
    Idle,
    Downloading,
    Extracting,
    Staging,
    Done,
    Failed,
}

impl fmt::Display for PrepareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareState::Idle => write!(f, "idle"),
            PrepareState::Downloading => write!(f, "downloading"),
            PrepareState::Extracting => write!(f, "extracting"),
            PrepareState::Staging => write!(f, "staging"),
            PrepareState::Done => write!(f, "done"),
            PrepareState::Failed => write!(f, "failed"),
        }
    }
}

/// A single progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Preparation state transition for an add-on.
    State { addon: String, state: PrepareState },
    /// Transient status line.
    Status(String),
    /// Permanent output meant for the operator (e.g. a generated recipe).
    Notice(String),
    /// Non-fatal problem the operation continued past.
    Warning(String),
}

/// Sending half of the progress channel.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Progress {
    /// A sink that drops status events. Warnings still reach the log.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    /// Creates a sink and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sends an event, returning false when nobody is listening.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Status(message.into()));
    }

    pub fn notice(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Notice(message.into()));
    }

    /// Reports a warning; falls back to the log when no listener is attached
    /// so lenient failures are never invisible.
    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        if !self.emit(ProgressEvent::Warning(message.clone())) {
            warn!("{}", message);
        }
    }

    pub fn state(&self, addon: &str, state: PrepareState) {
        self.emit(ProgressEvent::State {
            addon: addon.to_string(),
            state,
        });
    }
}

/// Drains every event currently buffered in a receiver.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Spinner
// =============================================================================

/// Terminal spinner driven by a [`Progress`] channel.
pub struct Spinner {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Starts the spinner task with an initial message.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(message: impl Into<String>) -> (Self, Progress) {
        let (progress, rx) = Progress::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let interactive = std::io::stderr().is_terminal();
        let handle = tokio::spawn(run(message.into(), rx, stop_rx, interactive));

        (
            Self {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            progress,
        )
    }

    /// Stops and joins the spinner, then prints the terminal line.
    pub async fn finish(mut self, success: bool, message: impl fmt::Display) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }

        let mark = if success { "✓" } else { "✗" };
        eprintln!("{mark} {message}");
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct Line {
    message: String,
    interactive: bool,
    frame: usize,
}

impl Line {
    fn clear(&self) {
        if self.interactive {
            eprint!("\r\x1b[2K");
        }
    }

    fn draw(&mut self) {
        if !self.interactive {
            return;
        }
        let frame = SPINNER_FRAMES[self.frame % SPINNER_FRAMES.len()];
        self.frame = self.frame.wrapping_add(1);
        eprint!("\r\x1b[2K{frame} {}", self.message);
        let _ = std::io::stderr().flush();
    }

    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::State { addon, state } => {
                self.message = format!("{addon}: {state}");
                if !self.interactive {
                    eprintln!("  {}", self.message);
                }
            }
            ProgressEvent::Status(message) => {
                if !self.interactive {
                    eprintln!("  {message}");
                }
                self.message = message;
            }
            ProgressEvent::Notice(text) => {
                self.clear();
                println!("{text}");
            }
            ProgressEvent::Warning(text) => {
                self.clear();
                eprintln!("warning: {text}");
            }
        }
        self.draw();
    }
}

async fn run(
    message: String,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    mut stop: oneshot::Receiver<()>,
    interactive: bool,
) {
    let mut line = Line {
        message,
        interactive,
        frame: 0,
    };
    if !interactive {
        eprintln!("{}", line.message);
    }

    let mut ticker = tokio::time::interval(SPINNER_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => line.draw(),
            Some(event) = rx.recv() => line.handle(event),
        }
    }

    // Flush events sent just before the stop signal.
    for event in drain(&mut rx) {
        line.handle(event);
    }
    line.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_sink_drops_events() {
        let progress = Progress::silent();
        assert!(!progress.emit(ProgressEvent::Status("x".into())));
    }

    #[test]
    fn test_channel_preserves_order() {
        let (progress, mut rx) = Progress::channel();
        progress.state("ndk", PrepareState::Downloading);
        progress.status("fetching");
        progress.warning("skipped");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ProgressEvent::State {
                addon: "ndk".into(),
                state: PrepareState::Downloading
            }
        );
        assert_eq!(events[2], ProgressEvent::Warning("skipped".into()));
    }

    #[tokio::test]
    async fn test_spinner_joins_on_finish() {
        let (spinner, progress) = Spinner::start("working");
        progress.status("step");
        spinner.finish(false, "failed").await;
        // The task is gone; the channel has no listener left.
        assert!(!progress.emit(ProgressEvent::Status("late".into())));
    }
}
