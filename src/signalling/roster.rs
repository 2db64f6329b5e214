//! Roster entries reported by signalling.

use super::{CallFlags, Permissions, SessionId, UserId};

/// Single session of the room roster.
#[derive(Clone, Debug, PartialEq)]
pub struct RosterEntry {
    /// ID of the session.
    pub session_id: SessionId,

    /// Declared call participation of the session.
    pub in_call: CallFlags,

    /// Persistent identity of the user, [`None`] for guests.
    pub user_id: Option<UserId>,

    /// Signalling specific routing ID of the session.
    pub routing_id: Option<String>,

    /// Whether the session belongs to an internal client (e.g. a recording
    /// server).
    pub internal: bool,

    /// Permissions of the session, if reported.
    pub permissions: Option<Permissions>,
}

impl RosterEntry {
    /// Creates new [`RosterEntry`] of a guest with the provided
    /// [`CallFlags`].
    pub fn new<S: Into<SessionId>>(session_id: S, in_call: CallFlags) -> Self {
        Self {
            session_id: session_id.into(),
            in_call,
            user_id: None,
            routing_id: None,
            internal: false,
            permissions: None,
        }
    }

    /// Sets persistent identity of this [`RosterEntry`].
    #[must_use]
    pub fn with_user_id<U: Into<UserId>>(mut self, user_id: U) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets [`Permissions`] of this [`RosterEntry`].
    #[must_use]
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }
}
