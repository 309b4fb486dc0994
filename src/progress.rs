//! Progress reporting and cooperative cancellation.
//!
//! The core never renders anything. It pushes [`ProgressEvent`]s into a
//! [`ProgressObserver`] and checks a [`CancelToken`] between files. Both travel
//! together in an [`OperationContext`].

use crate::error::FileError;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Stage of an operation running against a root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Scanning,
    Planning,
    Moving,
    Undoing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Scanning => "scanning",
            Phase::Planning => "planning",
            Phase::Moving => "moving",
            Phase::Undoing => "undoing",
        };
        f.write_str(label)
    }
}

/// A notification emitted by the core while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// `processed` items done out of `total`. `total` is `None` while scanning,
    /// since the tree size is not known up front.
    Progress {
        phase: Phase,
        processed: usize,
        total: Option<usize>,
    },
    /// One file failed; the operation carries on.
    FileError { path: PathBuf, message: String },
}

impl ProgressEvent {
    /// Fraction complete, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressEvent::Progress {
                processed,
                total: Some(total),
                ..
            } if *total > 0 => Some(*processed as f64 / *total as f64),
            ProgressEvent::Progress {
                total: Some(0), ..
            } => Some(1.0),
            _ => None,
        }
    }
}

impl From<&FileError> for ProgressEvent {
    fn from(err: &FileError) -> Self {
        ProgressEvent::FileError {
            path: err.path.clone(),
            message: format!("{}: {}", err.kind, err.message),
        }
    }
}

/// Receives progress events. Implementations must return quickly and must not
/// call back into the session that is reporting.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn notify(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into an `mpsc` channel, for callers that drain progress on
/// another thread.
#[derive(Debug, Clone)]
pub struct ChannelObserver(pub Sender<ProgressEvent>);

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: &ProgressEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.0.send(event.clone());
    }
}

/// Shared flag asking a running operation to stop at the next file boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer and cancel token handed to every stage of an operation.
#[derive(Clone, Default)]
pub struct OperationContext {
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancelToken,
}

impl OperationContext {
    /// A context that reports nowhere and is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn notify(&self, event: ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer.notify(&event);
        }
    }

    pub(crate) fn progress(&self, phase: Phase, processed: usize, total: Option<usize>) {
        self.notify(ProgressEvent::Progress {
            phase,
            processed,
            total,
        });
    }

    pub(crate) fn file_error(&self, err: &FileError) {
        self.notify(ProgressEvent::from(err));
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("observer", &self.observer.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}
