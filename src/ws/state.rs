//! Transport link state.
//!
//! `Closed -> Connecting -> Open -> Closed`, cycling. The link only
//! records state; the driver in [`super::connection`] owns the socket.

use std::fmt;

/// Where the link is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No socket.
    Closed,
    /// Socket dialing, not yet open.
    Connecting,
    /// Socket open.
    Open,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
        };
        f.write_str(s)
    }
}

/// The single connection's bookkeeping.
#[derive(Debug)]
pub struct Link {
    state: LinkState,
    attempts: u32,
    forced_close: bool,
}

impl Link {
    /// A closed link with no attempts yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LinkState::Closed,
            attempts: 0,
            forced_close: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// `true` while the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Attempts since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts an attempt, returning its 1-based number. `None` if the
    /// link is not closed or a forced close is in effect.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.state != LinkState::Closed || self.forced_close {
            return None;
        }
        self.state = LinkState::Connecting;
        self.attempts = self.attempts.saturating_add(1);
        Some(self.attempts)
    }

    /// The socket opened. Resets the attempt counter.
    pub fn opened(&mut self) {
        self.state = LinkState::Open;
        self.attempts = 0;
    }

    /// The socket closed or the attempt failed. Returns whether the
    /// link had been open.
    pub fn closed(&mut self) -> bool {
        let was_open = self.state == LinkState::Open;
        self.state = LinkState::Closed;
        was_open
    }

    /// Stops further reconnects.
    pub fn force_close(&mut self) {
        self.forced_close = true;
    }

    /// `true` once [`Link::force_close`] was called.
    #[must_use]
    pub const fn is_force_closed(&self) -> bool {
        self.forced_close
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}
