//! Connection lifecycle state.

use std::fmt;

/// Lifecycle of a client connection.
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Terminated
///                        |                      ^
///                        +------> Failed -------+
/// ```
///
/// A `Terminated` client may be started again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never started.
    Idle,
    /// Opening the socket.
    Starting,
    /// Read loop active, calls accepted.
    Running,
    /// Closing the socket and draining pending calls.
    Stopping,
    /// Connection gone; all calls failed, all queues sentinelled.
    Terminated,
    /// Read or write failure, shutdown in progress.
    Failed,
}

impl ConnectionState {
    /// States from which `start` is allowed.
    pub fn can_start(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Terminated)
    }

    /// States that `stop` moves to `Stopping`. A `Failed` client is
    /// already shutting down.
    pub fn can_stop(&self) -> bool {
        matches!(self, ConnectionState::Starting | ConnectionState::Running)
    }

    /// True for `Terminated`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Starting => "starting",
            ConnectionState::Running => "running",
            ConnectionState::Stopping => "stopping",
            ConnectionState::Terminated => "terminated",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
