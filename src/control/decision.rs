//! Routing decision states.
//!
//! A route walks a fixed sequence of states with no branching back:
//!
//! ```text
//!             ┌──────────────> RegionForward ──> Done | Failed
//!   Start ────┼──────────────> Failed            (validation, permission)
//!             └─> AuthChecked ─┬─> LocalHit ───────> Done | Failed
//!                              ├─> SnapshotChecked ─> RemoteForward ─> Done | Failed
//!                              │                   └> Failed         (no connection)
//!                              └─> Failed                            (unknown node)
//! ```
//!
//! Which successor a state takes is fully determined by the request and the
//! answers of the collaborators consulted in that state.

use serde::Serialize;

/// One state of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RouteState {
    /// Request received and validated.
    Start,
    /// Request handed to another region's entry point.
    RegionForward,
    /// Caller holds the operation's capability.
    AuthChecked,
    /// Node connection held by this server; executing locally.
    LocalHit,
    /// Node confirmed registered in cluster state.
    SnapshotChecked,
    /// Request handed to the peer server holding the connection.
    RemoteForward,
    /// Terminal failure.
    Failed,
    /// Terminal success.
    Done,
}

impl RouteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: RouteState) -> bool {
        use RouteState::*;
        matches!(
            (self, next),
            (Start, RegionForward | AuthChecked | Failed)
                | (RegionForward, Done | Failed)
                | (AuthChecked, LocalHit | SnapshotChecked | Failed)
                | (LocalHit, Done | Failed)
                | (SnapshotChecked, RemoteForward | Failed)
                | (RemoteForward, Done | Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RegionForward => "region_forward",
            Self::AuthChecked => "auth_checked",
            Self::LocalHit => "local_hit",
            Self::SnapshotChecked => "snapshot_checked",
            Self::RemoteForward => "remote_forward",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a routed request was finally executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteTarget {
    /// On a session held by this server.
    Local,
    /// Another region's entry point.
    Region(String),
    /// A peer server in this region.
    Peer(String),
}

/// Ordered record of the states a route passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTrace {
    states: Vec<RouteState>,
}

impl Default for RouteTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTrace {
    pub fn new() -> Self {
        Self {
            states: vec![RouteState::Start],
        }
    }

    pub fn current(&self) -> RouteState {
        // Never empty: constructed with Start.
        *self.states.last().unwrap_or(&RouteState::Start)
    }

    /// Move to the next state.
    ///
    /// Illegal transitions indicate a bug in the engine; they are logged and
    /// the trace is left unchanged.
    pub fn advance(&mut self, next: RouteState) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "illegal route transition {} -> {}",
            current,
            next
        );
        if current.can_advance_to(next) {
            self.states.push(next);
        } else {
            tracing::error!(from = %current, to = %next, "illegal route transition");
        }
    }

    pub fn states(&self) -> &[RouteState] {
        &self.states
    }

    pub fn visited(&self, state: RouteState) -> bool {
        self.states.contains(&state)
    }

    pub fn is_complete(&self) -> bool {
        self.current().is_terminal()
    }
}

impl std::fmt::Display for RouteTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.states.iter().map(RouteState::as_str).collect();
        f.write_str(&names.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RouteState; 8] = [
        RouteState::Start,
        RouteState::RegionForward,
        RouteState::AuthChecked,
        RouteState::LocalHit,
        RouteState::SnapshotChecked,
        RouteState::RemoteForward,
        RouteState::Failed,
        RouteState::Done,
    ];

    #[test]
    fn terminal_states_have_no_successors() {
        for terminal in [RouteState::Done, RouteState::Failed] {
            assert!(ALL.iter().all(|next| !terminal.can_advance_to(*next)));
        }
    }

    #[test]
    fn no_state_returns_to_start() {
        assert!(ALL.iter().all(|state| !state.can_advance_to(RouteState::Start)));
    }

    #[test]
    fn every_non_terminal_state_can_progress() {
        for state in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(ALL.iter().any(|next| state.can_advance_to(*next)));
        }
    }

    #[test]
    fn trace_display() {
        let mut trace = RouteTrace::new();
        trace.advance(RouteState::AuthChecked);
        trace.advance(RouteState::LocalHit);
        trace.advance(RouteState::Done);
        assert!(trace.is_complete());
        assert_eq!(trace.to_string(), "start -> auth_checked -> local_hit -> done");
    }
}
