//! Per-call context handed to handlers.
//!
//! A [`CallContext`] is created once per inbound call from the request
//! headers. It carries the deadline and the inbound metadata, and collects
//! what the handler wants to send back: status code, details, initial and
//! trailing metadata.
//!
//! The context is a cheap handle. The handler and the response producer of
//! the same call share it; nothing is shared between calls.
//!
//! ## Lifecycle
//!
//! ```text
//!   Active ──abort()──────────────► Terminated
//!     │                                 ▲
//!     └──completion / deadline──────────┘
//! ```
//!
//! Once terminated, further mutations are ignored: the status a client sees
//! is the one recorded at termination.
//!
//! ## Metadata writes
//!
//! [`send_initial_metadata`](CallContext::send_initial_metadata) and
//! [`set_trailing_metadata`](CallContext::set_trailing_metadata) overwrite
//! any previous value. If a handler spawns tasks that write them
//! concurrently, the last write observed by the response producer wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use grpcweb_bridge_core::{Code, Metadata, Status};

use crate::capability::{Capability, Unsupported};
use crate::error::BoxError;

/// Error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The handler called [`CallContext::abort`]; the status is on the context.
    #[error("call aborted with {}", .0.code())]
    Aborted(Aborted),

    /// [`CallContext::abort`] was called with [`Code::Ok`].
    #[error("abort requires a non-OK status code")]
    InvalidAbortCode,

    #[error(transparent)]
    Unsupported(#[from] Unsupported),

    /// Any other handler failure. Reported to the client as `UNKNOWN`.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("failed to serialize response message: {0}")]
    Serialize(#[source] BoxError),
}

impl CallError {
    /// Wrap an application error.
    pub fn handler<E: Into<BoxError>>(err: E) -> Self {
        CallError::Handler(err.into())
    }
}

/// Marker carried by [`CallError::Aborted`].
///
/// Only [`CallContext::abort`] and [`CallContext::abort_with_status`] create it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aborted {
    code: Code,
}

impl Aborted {
    /// The terminal code recorded on the context.
    pub fn code(&self) -> Code {
        self.code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Terminated,
}

#[derive(Debug)]
struct CallState {
    phase: Phase,
    code: Code,
    details: Option<String>,
    initial_metadata: Option<Metadata>,
    trailing_metadata: Option<Metadata>,
}

#[derive(Debug)]
struct Shared {
    deadline: Option<Instant>,
    invocation_metadata: Metadata,
    state: Mutex<CallState>,
}

/// Terminal view of a call, read by the response producer.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallOutcome {
    pub code: Code,
    pub details: Option<String>,
    pub trailing_metadata: Option<Metadata>,
}

/// Per-call context: deadline, metadata and status.
#[derive(Debug, Clone)]
pub struct CallContext {
    shared: Arc<Shared>,
}

impl CallContext {
    /// Create a context for a call with an optional timeout, starting now.
    pub fn new(timeout: Option<Duration>, invocation_metadata: Metadata) -> Self {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        Self::with_deadline(deadline, invocation_metadata)
    }

    /// Create a context with an absolute deadline.
    pub fn with_deadline(deadline: Option<Instant>, invocation_metadata: Metadata) -> Self {
        Self {
            shared: Arc::new(Shared {
                deadline,
                invocation_metadata,
                state: Mutex::new(CallState {
                    phase: Phase::Active,
                    code: Code::Ok,
                    details: None,
                    initial_metadata: None,
                    trailing_metadata: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CallState> {
        // Every write leaves the state whole, so a poisoned lock is still usable.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Absolute deadline of the call, if the client or server set one.
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.deadline
    }

    /// Time left before the deadline, floored at zero; `None` without a deadline.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.shared
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.time_remaining().is_some_and(|left| left.is_zero())
    }

    /// Metadata received with the request.
    pub fn invocation_metadata(&self) -> &Metadata {
        &self.shared.invocation_metadata
    }

    pub fn code(&self) -> Code {
        self.state().code
    }

    pub fn details(&self) -> Option<String> {
        self.state().details.clone()
    }

    /// Whether the call has reached its terminal status.
    pub fn is_terminated(&self) -> bool {
        self.state().phase == Phase::Terminated
    }

    /// Set the status code to report when the handler returns normally.
    pub fn set_code(&self, code: Code) {
        let mut state = self.state();
        if state.phase == Phase::Active {
            state.code = code;
        }
    }

    /// Set the status message to report when the handler returns normally.
    pub fn set_details(&self, details: impl Into<String>) {
        let mut state = self.state();
        if state.phase == Phase::Active {
            state.details = Some(details.into());
        }
    }

    /// Terminate the call with a non-OK status.
    ///
    /// Returns the error the handler should return to unwind:
    ///
    /// ```
    /// use grpcweb_bridge::{CallContext, CallError, Code, Metadata};
    ///
    /// fn lookup(ctx: &CallContext, id: u64) -> Result<String, CallError> {
    ///     if id == 0 {
    ///         return Err(ctx.abort(Code::NotFound, "no such user"));
    ///     }
    ///     Ok(format!("user {id}"))
    /// }
    ///
    /// let ctx = CallContext::new(None, Metadata::new());
    /// assert!(lookup(&ctx, 0).is_err());
    /// assert_eq!(ctx.code(), Code::NotFound);
    /// ```
    ///
    /// Aborting with [`Code::Ok`] is a programming error and yields
    /// [`CallError::InvalidAbortCode`] without touching the status.
    pub fn abort(&self, code: Code, details: impl Into<String>) -> CallError {
        self.terminate_with(code, Some(details.into()))
    }

    /// Like [`abort`](Self::abort), taking code and message from a [`Status`].
    pub fn abort_with_status(&self, status: Status) -> CallError {
        let details = status.message().map(str::to_string);
        self.terminate_with(status.code(), details)
    }

    fn terminate_with(&self, code: Code, details: Option<String>) -> CallError {
        if code == Code::Ok {
            return CallError::InvalidAbortCode;
        }

        let mut state = self.state();
        if state.phase == Phase::Active {
            state.phase = Phase::Terminated;
            state.code = code;
            if details.is_some() {
                state.details = details;
            }
            tracing::debug!(code = %code, "call aborted by handler");
        }
        CallError::Aborted(Aborted { code: state.code })
    }

    /// Metadata to send as response headers, before the body.
    pub fn send_initial_metadata(&self, metadata: Metadata) {
        let mut state = self.state();
        if state.phase == Phase::Active {
            state.initial_metadata = Some(metadata);
        }
    }

    /// Metadata to send after the last message.
    pub fn set_trailing_metadata(&self, metadata: Metadata) {
        let mut state = self.state();
        if state.phase == Phase::Active {
            state.trailing_metadata = Some(metadata);
        }
    }

    /// Whether this context backs `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        capability.is_supported()
    }

    pub fn peer(&self) -> Result<String, Unsupported> {
        Unsupported::err(Capability::Peer)
    }

    pub fn peer_identities(&self) -> Result<Vec<Bytes>, Unsupported> {
        Unsupported::err(Capability::PeerIdentities)
    }

    pub fn peer_identity_key(&self) -> Result<String, Unsupported> {
        Unsupported::err(Capability::PeerIdentityKey)
    }

    pub fn auth_context(&self) -> Result<HashMap<String, Vec<Bytes>>, Unsupported> {
        Unsupported::err(Capability::AuthContext)
    }

    pub fn add_callback<F>(&self, _callback: F) -> Result<(), Unsupported>
    where
        F: FnOnce() + Send + 'static,
    {
        Unsupported::err(Capability::Callbacks)
    }

    pub fn cancel(&self) -> Result<(), Unsupported> {
        Unsupported::err(Capability::Cancellation)
    }

    pub fn is_active(&self) -> Result<bool, Unsupported> {
        Unsupported::err(Capability::ActivityCheck)
    }

    // ---- response producer side ----

    pub(crate) fn initial_metadata(&self) -> Option<Metadata> {
        self.state().initial_metadata.clone()
    }

    /// Force a terminal status unless the call already terminated.
    pub(crate) fn terminate(&self, code: Code, details: impl Into<String>) {
        let mut state = self.state();
        if state.phase == Phase::Active {
            state.phase = Phase::Terminated;
            state.code = code;
            state.details = Some(details.into());
        }
    }

    /// Close the call, keeping whatever status the handler left, and read it.
    pub(crate) fn complete(&self) -> CallOutcome {
        let mut state = self.state();
        state.phase = Phase::Terminated;
        CallOutcome {
            code: state.code,
            details: state.details.clone(),
            trailing_metadata: state.trailing_metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext::new(None, Metadata::new())
    }

    #[test]
    fn test_defaults() {
        let ctx = ctx();
        assert_eq!(ctx.code(), Code::Ok);
        assert_eq!(ctx.details(), None);
        assert_eq!(ctx.time_remaining(), None);
        assert!(!ctx.is_expired());
        assert!(!ctx.is_terminated());
        assert!(ctx.initial_metadata().is_none());
    }

    #[test]
    fn test_time_remaining_decreases_and_floors() {
        let ctx = CallContext::new(Some(Duration::from_secs(60)), Metadata::new());
        let first = ctx.time_remaining().unwrap();
        assert!(first <= Duration::from_secs(60));
        assert!(first > Duration::from_secs(59));

        let past = Instant::now() - Duration::from_millis(5);
        let ctx = CallContext::with_deadline(Some(past), Metadata::new());
        assert_eq!(ctx.time_remaining(), Some(Duration::ZERO));
        assert!(ctx.is_expired());
    }

    #[test]
    fn test_abort_records_status() {
        let ctx = ctx();
        let err = ctx.abort(Code::PermissionDenied, "nope");

        match err {
            CallError::Aborted(aborted) => assert_eq!(aborted.code(), Code::PermissionDenied),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ctx.code(), Code::PermissionDenied);
        assert_eq!(ctx.details().as_deref(), Some("nope"));
        assert!(ctx.is_terminated());
    }

    #[test]
    fn test_abort_with_ok_is_rejected() {
        let ctx = ctx();
        assert!(matches!(
            ctx.abort(Code::Ok, "fine"),
            CallError::InvalidAbortCode
        ));
        assert!(!ctx.is_terminated());
        assert_eq!(ctx.details(), None);
    }

    #[test]
    fn test_abort_with_status() {
        let ctx = ctx();
        ctx.abort_with_status(Status::unavailable("maintenance"));
        assert_eq!(ctx.code(), Code::Unavailable);
        assert_eq!(ctx.details().as_deref(), Some("maintenance"));

        let ctx = CallContext::new(None, Metadata::new());
        assert!(matches!(
            ctx.abort_with_status(Status::from_code(Code::Ok)),
            CallError::InvalidAbortCode
        ));
    }

    #[test]
    fn test_mutations_after_termination_are_ignored() {
        let ctx = ctx();
        ctx.set_code(Code::NotFound);
        ctx.terminate(Code::DeadlineExceeded, "request timed out at the server");

        ctx.set_code(Code::Internal);
        ctx.set_details("late");
        ctx.set_trailing_metadata(Metadata::new().with("late", "1").unwrap());
        let err = ctx.abort(Code::Aborted, "too late");

        assert!(matches!(err, CallError::Aborted(a) if a.code() == Code::DeadlineExceeded));
        let outcome = ctx.complete();
        assert_eq!(outcome.code, Code::DeadlineExceeded);
        assert_eq!(
            outcome.details.as_deref(),
            Some("request timed out at the server")
        );
        assert!(outcome.trailing_metadata.is_none());
    }

    #[test]
    fn test_metadata_last_write_wins() {
        let ctx = ctx();
        ctx.send_initial_metadata(Metadata::new().with("a", "1").unwrap());
        ctx.send_initial_metadata(Metadata::new().with("b", "2").unwrap());
        ctx.set_trailing_metadata(Metadata::new().with("t", "x").unwrap());

        let initial = ctx.initial_metadata().unwrap();
        assert!(initial.get("a").is_none());
        assert!(initial.get("b").is_some());
        assert_eq!(ctx.complete().trailing_metadata.unwrap().len(), 1);
    }

    #[test]
    fn test_shared_between_clones() {
        let ctx = ctx();
        let handle = ctx.clone();
        handle.set_code(Code::NotFound);
        handle.set_details("gone");
        assert_eq!(ctx.code(), Code::NotFound);
        assert_eq!(ctx.details().as_deref(), Some("gone"));
    }

    #[test]
    fn test_invocation_metadata() {
        let md = Metadata::new().with("x-user", "alice").unwrap();
        let ctx = CallContext::new(None, md.clone());
        assert_eq!(ctx.invocation_metadata(), &md);
    }

    #[test]
    fn test_unsupported_capabilities() {
        let ctx = ctx();
        assert_eq!(ctx.peer().unwrap_err().capability, Capability::Peer);
        assert_eq!(
            ctx.peer_identities().unwrap_err().capability,
            Capability::PeerIdentities
        );
        assert_eq!(
            ctx.peer_identity_key().unwrap_err().capability,
            Capability::PeerIdentityKey
        );
        assert_eq!(
            ctx.auth_context().unwrap_err().capability,
            Capability::AuthContext
        );
        assert_eq!(
            ctx.add_callback(|| {}).unwrap_err().capability,
            Capability::Callbacks
        );
        assert_eq!(ctx.cancel().unwrap_err().capability, Capability::Cancellation);
        assert_eq!(
            ctx.is_active().unwrap_err().capability,
            Capability::ActivityCheck
        );
        assert!(ctx.supports(Capability::Deadline));
        assert!(!ctx.supports(Capability::Peer));
    }

    #[test]
    fn test_unsupported_propagates_as_call_error() {
        fn handler(ctx: &CallContext) -> Result<(), CallError> {
            ctx.peer()?;
            Ok(())
        }

        assert!(matches!(
            handler(&ctx()),
            Err(CallError::Unsupported(Unsupported {
                capability: Capability::Peer
            }))
        ));
    }
}
