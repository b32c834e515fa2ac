//! Operations a plain request/response transport cannot provide.
//!
//! A gRPC server normally exposes peer identity, cancellation, callbacks and
//! its own listener lifecycle. Behind a synchronous HTTP exchange there is no
//! persistent connection, no independent cancel channel, and no socket owned
//! by this crate, so those operations fail with [`Unsupported`] naming the
//! [`Capability`] that was requested.

/// Operations that are part of the gRPC server surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Deadline and remaining time.
    Deadline,
    /// Status code, details and abort.
    Status,
    /// Inbound, initial and trailing metadata.
    Metadata,
    /// Address of the remote peer.
    Peer,
    /// Authenticated identities of the peer.
    PeerIdentities,
    /// Name of the identity property.
    PeerIdentityKey,
    /// Authentication context.
    AuthContext,
    /// Callbacks run at call termination.
    Callbacks,
    /// Out-of-band cancellation.
    Cancellation,
    /// Liveness check on the underlying connection.
    ActivityCheck,
    /// Binding a listening port.
    BindPort,
    /// Starting or stopping the server.
    Lifecycle,
}

impl Capability {
    /// Capabilities backed by this transport.
    pub const SUPPORTED: &'static [Capability] =
        &[Capability::Deadline, Capability::Status, Capability::Metadata];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Deadline => "deadline",
            Capability::Status => "status",
            Capability::Metadata => "metadata",
            Capability::Peer => "peer",
            Capability::PeerIdentities => "peer identities",
            Capability::PeerIdentityKey => "peer identity key",
            Capability::AuthContext => "auth context",
            Capability::Callbacks => "callbacks",
            Capability::Cancellation => "cancellation",
            Capability::ActivityCheck => "activity check",
            Capability::BindPort => "port binding",
            Capability::Lifecycle => "server lifecycle",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested operation is structurally impossible on this transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{capability} is not supported over a gRPC-Web bridge")]
pub struct Unsupported {
    pub capability: Capability,
}

impl Unsupported {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    pub(crate) fn err<T>(capability: Capability) -> Result<T, Self> {
        Err(Self::new(capability))
    }
}
