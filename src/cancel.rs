// Cancellation tokens for in-flight stream operations.
//
// A token is a shared flag plus a `done()` channel that disconnects when
// the token fires, so blocking points can race their peer against it with
// `crossbeam::channel::select!`. Tokens form a tree: cancelling a parent
// cancels every child, and a child may carry its own deadline.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

// ---------------------------------------------------------------------------
// Reasons and errors
// ---------------------------------------------------------------------------

/// Why a token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called on the token or one of its ancestors.
    Cancelled,
    /// The deadline of the token or one of its ancestors passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Payload of the `io::Error` returned by cancelled stream operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Cancelled {
    pub reason: CancelReason,
}

impl Cancelled {
    /// Wrap into an `io::Error`.
    ///
    /// The kind is `Other`: `Interrupted` would be retried forever by
    /// `io::copy` and `write_all`.
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

/// Whether `err` was produced by a fired cancellation token.
pub fn is_cancellation(err: &io::Error) -> bool {
    cancel_reason(err).is_some()
}

/// The cancellation reason carried by `err`, if any.
pub fn cancel_reason(err: &io::Error) -> Option<CancelReason> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<Cancelled>())
        .map(|c| c.reason)
}

// ---------------------------------------------------------------------------
// CancellationToken
// ---------------------------------------------------------------------------

/// A cloneable cancellation signal shared between a caller and the
/// background work it started.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    reason: OnceLock<CancelReason>,
    /// Dropped on cancellation, which disconnects `done`.
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    deadline: Option<Instant>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        let (trigger, done) = channel::bounded(0);
        Self {
            reason: OnceLock::new(),
            trigger: Mutex::new(Some(trigger)),
            done,
            deadline,
            children: Mutex::new(Vec::new()),
        }
    }

    fn fire(&self, reason: CancelReason) {
        if self.reason.set(reason).is_err() {
            return;
        }
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire(reason);
        }
    }

    fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.reason.get() {
            return Some(*reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.fire(CancelReason::DeadlineExceeded);
                self.reason.get().copied()
            }
            _ => None,
        }
    }
}

impl CancellationToken {
    /// Create a root token that only fires on `cancel()`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// Create a token that fires when `self` fires.
    pub fn child(&self) -> Self {
        self.derive(None)
    }

    /// Create a child token that also fires once `timeout` has elapsed.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Create a child token that also fires at `deadline`.
    ///
    /// An inherited earlier deadline keeps applying through the parent.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let child = self.derive(Some(deadline));
        child.arm_timer(deadline);
        child
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let child = Self {
            inner: Arc::new(Inner::new(deadline)),
        };
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        // `fire` sets the reason before draining children, so a parent that
        // fired concurrently is observed here if it missed the new child.
        if let Some(reason) = self.inner.reason() {
            child.inner.fire(reason);
        }
        child
    }

    fn arm_timer(&self, deadline: Instant) {
        if self.is_cancelled() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let done = self.inner.done.clone();
        let wait = deadline.saturating_duration_since(Instant::now());
        let spawned = thread::Builder::new()
            .name("pipezip-deadline".into())
            .spawn(move || {
                crossbeam::select! {
                    recv(done) -> _ => {}
                    recv(channel::after(wait)) -> _ => {
                        if let Some(inner) = weak.upgrade() {
                            inner.fire(CancelReason::DeadlineExceeded);
                        }
                    }
                }
            });

        // Without a timer thread the deadline is still observed by
        // `is_cancelled`, just not pushed to blocked waiters.
        if let Err(e) = spawned {
            log::warn!("failed to spawn deadline timer: {e}");
        }
    }

    /// Fire the token and every token derived from it.
    pub fn cancel(&self) {
        self.inner.fire(CancelReason::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason().is_some()
    }

    /// Why the token fired, or `None` while it is still live.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason()
    }

    /// The deadline attached directly to this token, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// A channel that never yields a value and disconnects when the token
    /// fires. Use it as a `recv` arm in `crossbeam::select!`.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Block until the token fires.
    pub fn wait(&self) {
        let _ = self.inner.done.recv();
    }

    /// The cancellation error for this token, or `None` while it is live.
    pub fn error(&self) -> Option<io::Error> {
        self.reason().map(|reason| Cancelled { reason }.into_io())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.inner.reason.get())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
