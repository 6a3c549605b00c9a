//! The connection state machine shared by frontend and backend (spec
//! §4.4, summarised in the event table of §4.9).
//!
//! Actions are deliberately *not* virtual dispatch: per design note §9
//! ("dynamic dispatch via status enum"), this models the handler as a
//! tagged-variant match over `(state, event)` rather than anything
//! resembling virtual inheritance. The match arms are the table.

use crate::config::ConfigEvent;

#[cfg(feature = "tracing")]
use tracing::warn;

/// Connection state (spec §4.4). `Disconnecting` only occurs on the
/// backend, driven by a host-initiated disconnect control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    Disconnected,
    Connected,
    Disconnecting,
}

/// Events that drive the state machine (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    StatusClosed,
    StatusDisconnected,
    StatusConnected,
    StatusChanged,
    DisconnectControl,
    DisconnectComplete,
}

/// The side-effecting operations the state machine drives. Implemented
/// once per concrete frontend/backend; the machine itself holds no
/// resources of its own, matching spec §9's separation between the
/// state table and everything it touches.
pub trait InterfaceOps {
    fn allocate_ring(&mut self);
    fn free_ring(&mut self);
    fn send_connect(&mut self);
    fn send_disconnect_response(&mut self);
    fn bind_evtchn(&mut self);
    fn unbind_evtchn(&mut self);
    fn run_recovery(&mut self);
    fn run_probe(&mut self);
    fn release_pending_queue_kick(&mut self);
    fn mark_all_grants_invalid(&mut self);
    fn schedule_config_rescan(&mut self);
    fn drain_and_free(&mut self);
}

/// Drives `ops` through the transitions of spec §4.4/§4.9, tracking the
/// `recovery` flag set on backend-initiated resets.
pub struct StateMachine<O: InterfaceOps> {
    state: ConnState,
    recovery: bool,
    ops: O,
}

impl<O: InterfaceOps> StateMachine<O> {
    pub fn new(ops: O) -> Self {
        Self { state: ConnState::Closed, recovery: false, ops }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    pub fn ops_mut(&mut self) -> &mut O {
        &mut self.ops
    }

    /// Translate a configuration-store change into an `Event` and
    /// dispatch it. Any key not named below produces no event - the
    /// caller relies on `dispatch` for protocol transitions and reads
    /// values directly for everything else.
    pub fn on_config_event(&mut self, event: &ConfigEvent) {
        use crate::config::ConfigKey;
        let mapped = match (event.key, event.value.as_deref()) {
            (ConfigKey::Online, Some("0")) => Some(Event::StatusClosed),
            _ => None,
        };
        if let Some(ev) = mapped {
            self.dispatch(ev);
        }
    }

    /// Apply `event` to the current state, running its action and
    /// transitioning. Spurious (state, event) pairs are logged, not
    /// fatal, per spec §4.4.
    pub fn dispatch(&mut self, event: Event) {
        use ConnState::*;
        use Event::*;

        let next = match (self.state, event) {
            (Closed, StatusClosed) => {
                self.log_unexpected("StatusClosed while already Closed");
                Closed
            }
            (Disconnected | Connected, StatusClosed) => {
                self.ops.drain_and_free();
                Closed
            }
            (Disconnecting, StatusClosed) => {
                self.ops.drain_and_free();
                Closed
            }

            (Closed, StatusDisconnected) => {
                self.ops.allocate_ring();
                self.ops.send_connect();
                Disconnected
            }
            (Disconnected | Connected, StatusDisconnected) => {
                self.recovery = true;
                self.ops.mark_all_grants_invalid();
                self.ops.free_ring();
                self.ops.unbind_evtchn();
                self.ops.allocate_ring();
                self.ops.send_connect();
                Disconnected
            }
            (Disconnecting, StatusDisconnected) => {
                self.log_unexpected("StatusDisconnected while Disconnecting");
                Disconnecting
            }

            (Disconnected, StatusConnected) => {
                self.ops.bind_evtchn();
                if self.recovery {
                    self.ops.run_recovery();
                    self.recovery = false;
                } else {
                    self.ops.run_probe();
                }
                self.ops.release_pending_queue_kick();
                Connected
            }
            (Connected, StatusConnected) => {
                self.log_unexpected("StatusConnected while already Connected");
                self.ops.unbind_evtchn();
                self.ops.bind_evtchn();
                Connected
            }
            (other, StatusConnected) => {
                self.log_unexpected("StatusConnected outside Disconnected/Connected");
                other
            }

            (Connected, StatusChanged) => {
                self.ops.schedule_config_rescan();
                Connected
            }
            (other, StatusChanged) => {
                self.log_unexpected("StatusChanged outside Connected");
                other
            }

            (Connected, DisconnectControl) => {
                self.ops.drain_and_free();
                Disconnecting
            }
            (other, DisconnectControl) => {
                self.log_unexpected("DisconnectControl outside Connected");
                other
            }

            (Disconnecting, DisconnectComplete) => {
                self.ops.send_disconnect_response();
                Disconnected
            }
            (other, DisconnectComplete) => {
                self.log_unexpected("DisconnectComplete outside Disconnecting");
                other
            }
        };

        self.state = next;
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn log_unexpected(&self, message: &str) {
        #[cfg(feature = "tracing")]
        warn!(state = ?self.state, "{}", message);
        #[cfg(not(feature = "tracing"))]
        let _ = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingOps {
        calls: Vec<&'static str>,
    }

    impl InterfaceOps for RecordingOps {
        fn allocate_ring(&mut self) {
            self.calls.push("allocate_ring");
        }
        fn free_ring(&mut self) {
            self.calls.push("free_ring");
        }
        fn send_connect(&mut self) {
            self.calls.push("send_connect");
        }
        fn send_disconnect_response(&mut self) {
            self.calls.push("send_disconnect_response");
        }
        fn bind_evtchn(&mut self) {
            self.calls.push("bind_evtchn");
        }
        fn unbind_evtchn(&mut self) {
            self.calls.push("unbind_evtchn");
        }
        fn run_recovery(&mut self) {
            self.calls.push("run_recovery");
        }
        fn run_probe(&mut self) {
            self.calls.push("run_probe");
        }
        fn release_pending_queue_kick(&mut self) {
            self.calls.push("release_pending_queue_kick");
        }
        fn mark_all_grants_invalid(&mut self) {
            self.calls.push("mark_all_grants_invalid");
        }
        fn schedule_config_rescan(&mut self) {
            self.calls.push("schedule_config_rescan");
        }
        fn drain_and_free(&mut self) {
            self.calls.push("drain_and_free");
        }
    }

    #[test]
    fn first_connect_runs_probe_not_recovery() {
        let mut sm = StateMachine::new(RecordingOps::default());
        sm.dispatch(Event::StatusDisconnected);
        sm.dispatch(Event::StatusConnected);
        assert_eq!(sm.state(), ConnState::Connected);
        assert!(sm.ops().calls.contains(&"run_probe"));
        assert!(!sm.ops().calls.contains(&"run_recovery"));
    }

    #[test]
    fn reset_from_connected_sets_recovery_and_reruns_recovery_on_reconnect() {
        let mut sm = StateMachine::new(RecordingOps::default());
        sm.dispatch(Event::StatusDisconnected);
        sm.dispatch(Event::StatusConnected);
        sm.ops_mut().calls.clear();

        sm.dispatch(Event::StatusDisconnected);
        assert_eq!(sm.state(), ConnState::Disconnected);
        assert!(sm.is_recovering());
        assert!(sm.ops().calls.contains(&"mark_all_grants_invalid"));

        sm.dispatch(Event::StatusConnected);
        assert_eq!(sm.state(), ConnState::Connected);
        assert!(!sm.is_recovering());
        assert!(sm.ops().calls.contains(&"run_recovery"));
        assert!(!sm.ops().calls.contains(&"run_probe"));
    }

    #[test]
    fn closed_from_any_state_is_fatal_teardown() {
        let mut sm = StateMachine::new(RecordingOps::default());
        sm.dispatch(Event::StatusDisconnected);
        sm.dispatch(Event::StatusConnected);
        sm.dispatch(Event::StatusClosed);
        assert_eq!(sm.state(), ConnState::Closed);
        assert!(sm.ops().calls.contains(&"drain_and_free"));
    }

    #[test]
    fn disconnect_control_then_complete_reaches_disconnected() {
        let mut sm = StateMachine::new(RecordingOps::default());
        sm.dispatch(Event::StatusDisconnected);
        sm.dispatch(Event::StatusConnected);

        sm.dispatch(Event::DisconnectControl);
        assert_eq!(sm.state(), ConnState::Disconnecting);

        sm.dispatch(Event::DisconnectComplete);
        assert_eq!(sm.state(), ConnState::Disconnected);
        assert!(sm.ops().calls.contains(&"send_disconnect_response"));
    }

    #[test]
    fn spurious_changed_outside_connected_is_a_no_op() {
        let mut sm = StateMachine::new(RecordingOps::default());
        sm.dispatch(Event::StatusChanged);
        assert_eq!(sm.state(), ConnState::Closed);
    }
}
