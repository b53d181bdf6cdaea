//! The DICOM Upper Layer finite state machine,
//! as specified in PS3.8 section 9.2.
//!
//! The machine is the sole authority on what an association may do next:
//! every user primitive, peer PDU, transport change and timer expiry is
//! mapped to one of the standard events (Evt1 to Evt19),
//! and the transition table yields the action to perform
//! together with the next state.
//! The table itself is pure data; all side effects
//! (sending PDUs, issuing indications, driving the ARTIM timer,
//! closing the transport) are carried out by the caller,
//! typically the association reactor.
use snafu::{Backtrace, OptionExt, Snafu};
use tracing::trace;

/// The role of the local application entity in the association.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Role {
    /// This node requested the association
    Requestor,
    /// This node accepted the transport connection
    Acceptor,
}

/// One of the 13 abstract states of the upper layer protocol machine.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum State {
    /// Sta1: idle, no association and no transport connection
    Sta1,
    /// Sta2: transport connection open,
    /// awaiting an A-ASSOCIATE-RQ PDU
    Sta2,
    /// Sta3: awaiting the local A-ASSOCIATE response primitive
    Sta3,
    /// Sta4: awaiting the transport connection to open
    Sta4,
    /// Sta5: awaiting an A-ASSOCIATE-AC or -RJ PDU
    Sta5,
    /// Sta6: association established and ready for data transfer
    Sta6,
    /// Sta7: awaiting an A-RELEASE-RP PDU
    Sta7,
    /// Sta8: awaiting the local A-RELEASE response primitive
    Sta8,
    /// Sta9: release collision (requestor side),
    /// awaiting the local A-RELEASE response primitive
    Sta9,
    /// Sta10: release collision (requestor side),
    /// awaiting an A-RELEASE-RP PDU
    Sta10,
    /// Sta11: release collision (acceptor side),
    /// awaiting an A-RELEASE-RP PDU
    Sta11,
    /// Sta12: release collision (acceptor side),
    /// awaiting the local A-RELEASE response primitive
    Sta12,
    /// Sta13: awaiting the transport connection to close
    Sta13,
}

/// One of the 19 events of the upper layer protocol machine.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Event {
    /// Evt1: A-ASSOCIATE request primitive from the local user
    AssociateRequest,
    /// Evt2: transport connection confirmed
    TransportConnect,
    /// Evt3: A-ASSOCIATE-AC PDU received
    AssociateAcReceived,
    /// Evt4: A-ASSOCIATE-RJ PDU received
    AssociateRjReceived,
    /// Evt5: transport connection indication (incoming connection)
    TransportIndication,
    /// Evt6: A-ASSOCIATE-RQ PDU received
    AssociateRqReceived,
    /// Evt7: A-ASSOCIATE response primitive (accept) from the local user
    AssociateResponseAccept,
    /// Evt8: A-ASSOCIATE response primitive (reject) from the local user
    AssociateResponseReject,
    /// Evt9: P-DATA request primitive from the local user
    PDataRequest,
    /// Evt10: P-DATA-TF PDU received
    PDataReceived,
    /// Evt11: A-RELEASE request primitive from the local user
    ReleaseRequest,
    /// Evt12: A-RELEASE-RQ PDU received
    ReleaseRqReceived,
    /// Evt13: A-RELEASE-RP PDU received
    ReleaseRpReceived,
    /// Evt14: A-RELEASE response primitive from the local user
    ReleaseResponse,
    /// Evt15: A-ABORT or A-P-ABORT request primitive from the local user
    AbortRequest,
    /// Evt16: A-ABORT PDU received
    AbortReceived,
    /// Evt17: transport connection closed
    TransportClosed,
    /// Evt18: ARTIM timer expired
    ArtimExpired,
    /// Evt19: unrecognized or invalid PDU received
    InvalidPdu,
}

impl Event {
    /// The standard event code (1 for Evt1, and so on).
    pub fn number(self) -> u8 {
        match self {
            Event::AssociateRequest => 1,
            Event::TransportConnect => 2,
            Event::AssociateAcReceived => 3,
            Event::AssociateRjReceived => 4,
            Event::TransportIndication => 5,
            Event::AssociateRqReceived => 6,
            Event::AssociateResponseAccept => 7,
            Event::AssociateResponseReject => 8,
            Event::PDataRequest => 9,
            Event::PDataReceived => 10,
            Event::ReleaseRequest => 11,
            Event::ReleaseRqReceived => 12,
            Event::ReleaseRpReceived => 13,
            Event::ReleaseResponse => 14,
            Event::AbortRequest => 15,
            Event::AbortReceived => 16,
            Event::TransportClosed => 17,
            Event::ArtimExpired => 18,
            Event::InvalidPdu => 19,
        }
    }
}

/// One of the actions of PS3.8 tables 9-6 to 9-9.
///
/// The action names follow the standard:
/// association establishment (AE), data transfer (DT),
/// association release (AR) and association abort (AA).
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Action {
    /// AE-1: issue a transport connect request to the local transport service
    Ae1,
    /// AE-2: send the A-ASSOCIATE-RQ PDU
    Ae2,
    /// AE-3: issue an A-ASSOCIATE confirmation (accept) primitive
    Ae3,
    /// AE-4: issue an A-ASSOCIATE confirmation (reject) primitive
    /// and close the transport connection
    Ae4,
    /// AE-5: issue a transport connection response primitive
    /// and start the ARTIM timer
    Ae5,
    /// AE-6: stop the ARTIM timer
    /// and issue an A-ASSOCIATE indication primitive
    Ae6,
    /// AE-7: send the A-ASSOCIATE-AC PDU
    Ae7,
    /// AE-8: send the A-ASSOCIATE-RJ PDU and start the ARTIM timer
    Ae8,
    /// DT-1: send the P-DATA-TF PDU
    Dt1,
    /// DT-2: issue a P-DATA indication primitive
    Dt2,
    /// AR-1: send the A-RELEASE-RQ PDU
    Ar1,
    /// AR-2: issue an A-RELEASE indication primitive
    Ar2,
    /// AR-3: issue an A-RELEASE confirmation primitive
    /// and close the transport connection
    Ar3,
    /// AR-4: send the A-RELEASE-RP PDU and start the ARTIM timer
    Ar4,
    /// AR-5: stop the ARTIM timer
    Ar5,
    /// AR-6: issue a P-DATA indication primitive
    Ar6,
    /// AR-7: send the P-DATA-TF PDU
    Ar7,
    /// AR-8: issue an A-RELEASE indication primitive (release collision)
    Ar8,
    /// AR-9: send the A-RELEASE-RP PDU
    Ar9,
    /// AR-10: issue an A-RELEASE confirmation primitive (release collision)
    Ar10,
    /// AA-1: send an A-ABORT PDU (service-user source)
    /// and start or restart the ARTIM timer
    Aa1,
    /// AA-2: stop the ARTIM timer and close the transport connection
    Aa2,
    /// AA-3: issue the A-ABORT or A-P-ABORT indication
    /// and close the transport connection
    Aa3,
    /// AA-4: issue an A-P-ABORT indication primitive
    Aa4,
    /// AA-5: stop the ARTIM timer
    Aa5,
    /// AA-6: ignore the PDU
    Aa6,
    /// AA-7: send an A-ABORT PDU (service-provider source)
    Aa7,
    /// AA-8: send an A-ABORT PDU (service-provider source),
    /// issue an A-P-ABORT indication and start the ARTIM timer
    Aa8,
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The event is not defined for the current state,
    /// which means a defect in the caller rather than a protocol error.
    #[snafu(display("no transition from {:?} on Evt{}", state, event.number()))]
    InvalidTransition {
        state: State,
        event: Event,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Look up the action for the given state and event,
/// as published in PS3.8 table 9-10.
///
/// Returns `None` for pairs with no defined transition.
pub fn action_for(state: State, event: Event) -> Option<Action> {
    use self::Action::*;
    use self::Event::*;
    use self::State::*;

    match (state, event) {
        (Sta1, AssociateRequest) => Some(Ae1),
        (Sta4, TransportConnect) => Some(Ae2),

        (Sta2, AssociateAcReceived) => Some(Aa1),
        (Sta3, AssociateAcReceived) => Some(Aa8),
        (Sta5, AssociateAcReceived) => Some(Ae3),
        (
            Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            AssociateAcReceived,
        ) => Some(Aa8),
        (Sta13, AssociateAcReceived) => Some(Aa6),

        (Sta2, AssociateRjReceived) => Some(Aa1),
        (Sta3, AssociateRjReceived) => Some(Aa8),
        (Sta5, AssociateRjReceived) => Some(Ae4),
        (
            Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            AssociateRjReceived,
        ) => Some(Aa8),
        (Sta13, AssociateRjReceived) => Some(Aa6),

        (Sta1, TransportIndication) => Some(Ae5),

        (Sta2, AssociateRqReceived) => Some(Ae6),
        (
            Sta3 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            AssociateRqReceived,
        ) => Some(Aa8),
        (Sta13, AssociateRqReceived) => Some(Aa7),

        (Sta3, AssociateResponseAccept) => Some(Ae7),
        (Sta3, AssociateResponseReject) => Some(Ae8),

        (Sta6, PDataRequest) => Some(Dt1),
        (Sta8, PDataRequest) => Some(Ar7),

        (Sta2, PDataReceived) => Some(Aa1),
        (Sta3 | Sta5, PDataReceived) => Some(Aa8),
        (Sta6, PDataReceived) => Some(Dt2),
        (Sta7, PDataReceived) => Some(Ar6),
        (Sta8 | Sta9 | Sta10 | Sta11 | Sta12, PDataReceived) => Some(Aa8),
        (Sta13, PDataReceived) => Some(Aa6),

        (Sta6, ReleaseRequest) => Some(Ar1),

        (Sta2, ReleaseRqReceived) => Some(Aa1),
        (Sta3 | Sta5, ReleaseRqReceived) => Some(Aa8),
        (Sta6, ReleaseRqReceived) => Some(Ar2),
        (Sta7, ReleaseRqReceived) => Some(Ar8),
        (Sta8 | Sta9 | Sta10 | Sta11 | Sta12, ReleaseRqReceived) => Some(Aa8),
        (Sta13, ReleaseRqReceived) => Some(Aa6),

        (Sta2, ReleaseRpReceived) => Some(Aa1),
        (Sta3 | Sta5 | Sta6, ReleaseRpReceived) => Some(Aa8),
        (Sta7, ReleaseRpReceived) => Some(Ar3),
        (Sta8 | Sta9, ReleaseRpReceived) => Some(Aa8),
        (Sta10, ReleaseRpReceived) => Some(Ar10),
        (Sta11, ReleaseRpReceived) => Some(Ar3),
        (Sta12, ReleaseRpReceived) => Some(Aa8),
        (Sta13, ReleaseRpReceived) => Some(Aa6),

        (Sta8, ReleaseResponse) => Some(Ar4),
        (Sta9, ReleaseResponse) => Some(Ar9),
        (Sta12, ReleaseResponse) => Some(Ar4),

        (Sta3, AbortRequest) => Some(Aa1),
        (Sta4, AbortRequest) => Some(Aa2),
        (
            Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            AbortRequest,
        ) => Some(Aa1),

        (Sta2, AbortReceived) => Some(Aa2),
        (
            Sta3 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            AbortReceived,
        ) => Some(Aa3),
        (Sta13, AbortReceived) => Some(Aa2),

        (Sta2, TransportClosed) => Some(Aa5),
        (
            Sta3 | Sta4 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            TransportClosed,
        ) => Some(Aa4),
        (Sta13, TransportClosed) => Some(Ar5),

        (Sta2, ArtimExpired) => Some(Aa2),
        (Sta13, ArtimExpired) => Some(Aa2),

        (Sta2, InvalidPdu) => Some(Aa1),
        (
            Sta3 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12,
            InvalidPdu,
        ) => Some(Aa8),
        (Sta13, InvalidPdu) => Some(Aa7),

        _ => None,
    }
}

/// The DICOM Upper Layer protocol machine of a single association.
#[derive(Debug)]
pub struct StateMachine {
    state: State,
    role: Role,
}

impl StateMachine {
    /// Create a new machine in the idle state.
    pub fn new(role: Role) -> Self {
        StateMachine {
            state: State::Sta1,
            role,
        }
    }

    /// The current state of the machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// The role of the local node in the association.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Apply an event:
    /// look up the action for the current state,
    /// move to the next state
    /// and return the action for the caller to perform.
    ///
    /// An event with no transition defined for the current state
    /// is a usage error and leaves the machine untouched.
    pub fn apply(&mut self, event: Event) -> Result<Action> {
        let action = action_for(self.state, event).with_context(|| InvalidTransitionSnafu {
            state: self.state,
            event,
        })?;
        let next_state = self.next_state(action);

        trace!(
            "fsm transition: {:?} + Evt{} -> {:?}, {:?}",
            self.state,
            event.number(),
            action,
            next_state
        );

        self.state = next_state;
        Ok(action)
    }

    /// The state entered after performing the given action.
    ///
    /// All actions have a fixed outcome state except AR-8,
    /// where a release collision is resolved to either side
    /// based on the local role.
    fn next_state(&self, action: Action) -> State {
        match action {
            Action::Ae1 => State::Sta4,
            Action::Ae2 => State::Sta5,
            Action::Ae3 => State::Sta6,
            Action::Ae4 => State::Sta1,
            Action::Ae5 => State::Sta2,
            Action::Ae6 => State::Sta3,
            Action::Ae7 => State::Sta6,
            Action::Ae8 => State::Sta13,
            Action::Dt1 => State::Sta6,
            Action::Dt2 => State::Sta6,
            Action::Ar1 => State::Sta7,
            Action::Ar2 => State::Sta8,
            Action::Ar3 => State::Sta1,
            Action::Ar4 => State::Sta13,
            Action::Ar5 => State::Sta1,
            Action::Ar6 => State::Sta7,
            Action::Ar7 => State::Sta8,
            Action::Ar8 => match self.role {
                Role::Requestor => State::Sta9,
                Role::Acceptor => State::Sta10,
            },
            Action::Ar9 => State::Sta11,
            Action::Ar10 => State::Sta12,
            Action::Aa1 => State::Sta13,
            Action::Aa2 => State::Sta1,
            Action::Aa3 => State::Sta1,
            Action::Aa4 => State::Sta1,
            Action::Aa5 => State::Sta1,
            Action::Aa6 => State::Sta13,
            Action::Aa7 => State::Sta13,
            Action::Aa8 => State::Sta13,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [State; 13] = [
        State::Sta1,
        State::Sta2,
        State::Sta3,
        State::Sta4,
        State::Sta5,
        State::Sta6,
        State::Sta7,
        State::Sta8,
        State::Sta9,
        State::Sta10,
        State::Sta11,
        State::Sta12,
        State::Sta13,
    ];

    const ALL_EVENTS: [Event; 19] = [
        Event::AssociateRequest,
        Event::TransportConnect,
        Event::AssociateAcReceived,
        Event::AssociateRjReceived,
        Event::TransportIndication,
        Event::AssociateRqReceived,
        Event::AssociateResponseAccept,
        Event::AssociateResponseReject,
        Event::PDataRequest,
        Event::PDataReceived,
        Event::ReleaseRequest,
        Event::ReleaseRqReceived,
        Event::ReleaseRpReceived,
        Event::ReleaseResponse,
        Event::AbortRequest,
        Event::AbortReceived,
        Event::TransportClosed,
        Event::ArtimExpired,
        Event::InvalidPdu,
    ];

    /// Drive a machine through the given events,
    /// asserting each expected action and resulting state.
    fn drive(machine: &mut StateMachine, script: &[(Event, Action, State)]) {
        for (event, action, state) in script {
            assert_eq!(machine.apply(*event).unwrap(), *action);
            assert_eq!(machine.state(), *state);
        }
    }

    #[test]
    fn published_table_is_total() {
        // every (state, event) pair published in PS3.8 table 9-10
        // must resolve to an action
        let defined_count = ALL_STATES
            .iter()
            .flat_map(|state| ALL_EVENTS.iter().map(move |event| (*state, *event)))
            .filter(|(state, event)| action_for(*state, *event).is_some())
            .count();

        assert_eq!(defined_count, 123);

        // while pairs outside the table are usage errors
        let mut machine = StateMachine::new(Role::Requestor);
        let error = machine.apply(Event::TransportConnect).unwrap_err();
        assert!(matches!(error, Error::InvalidTransition { .. }));
        assert_eq!(machine.state(), State::Sta1);
    }

    #[test]
    fn association_request_flow() {
        let mut machine = StateMachine::new(Role::Requestor);
        drive(
            &mut machine,
            &[
                (Event::AssociateRequest, Action::Ae1, State::Sta4),
                (Event::TransportConnect, Action::Ae2, State::Sta5),
                (Event::AssociateAcReceived, Action::Ae3, State::Sta6),
                (Event::PDataRequest, Action::Dt1, State::Sta6),
                (Event::PDataReceived, Action::Dt2, State::Sta6),
                (Event::ReleaseRequest, Action::Ar1, State::Sta7),
                (Event::ReleaseRpReceived, Action::Ar3, State::Sta1),
            ],
        );
    }

    #[test]
    fn association_accept_flow() {
        let mut machine = StateMachine::new(Role::Acceptor);
        drive(
            &mut machine,
            &[
                (Event::TransportIndication, Action::Ae5, State::Sta2),
                (Event::AssociateRqReceived, Action::Ae6, State::Sta3),
                (Event::AssociateResponseAccept, Action::Ae7, State::Sta6),
                (Event::ReleaseRqReceived, Action::Ar2, State::Sta8),
                (Event::ReleaseResponse, Action::Ar4, State::Sta13),
                (Event::TransportClosed, Action::Ar5, State::Sta1),
            ],
        );
    }

    #[test]
    fn association_reject_flow() {
        let mut machine = StateMachine::new(Role::Acceptor);
        drive(
            &mut machine,
            &[
                (Event::TransportIndication, Action::Ae5, State::Sta2),
                (Event::AssociateRqReceived, Action::Ae6, State::Sta3),
                (Event::AssociateResponseReject, Action::Ae8, State::Sta13),
                (Event::ArtimExpired, Action::Aa2, State::Sta1),
            ],
        );
    }

    #[test]
    fn release_collision_requestor_side() {
        let mut machine = StateMachine::new(Role::Requestor);
        drive(
            &mut machine,
            &[
                (Event::AssociateRequest, Action::Ae1, State::Sta4),
                (Event::TransportConnect, Action::Ae2, State::Sta5),
                (Event::AssociateAcReceived, Action::Ae3, State::Sta6),
                (Event::ReleaseRequest, Action::Ar1, State::Sta7),
                // both sides requested release at once
                (Event::ReleaseRqReceived, Action::Ar8, State::Sta9),
                (Event::ReleaseResponse, Action::Ar9, State::Sta11),
                (Event::ReleaseRpReceived, Action::Ar3, State::Sta1),
            ],
        );
    }

    #[test]
    fn release_collision_acceptor_side() {
        let mut machine = StateMachine::new(Role::Acceptor);
        drive(
            &mut machine,
            &[
                (Event::TransportIndication, Action::Ae5, State::Sta2),
                (Event::AssociateRqReceived, Action::Ae6, State::Sta3),
                (Event::AssociateResponseAccept, Action::Ae7, State::Sta6),
                (Event::ReleaseRequest, Action::Ar1, State::Sta7),
                (Event::ReleaseRqReceived, Action::Ar8, State::Sta10),
                (Event::ReleaseRpReceived, Action::Ar10, State::Sta12),
                (Event::ReleaseResponse, Action::Ar4, State::Sta13),
                (Event::TransportClosed, Action::Ar5, State::Sta1),
            ],
        );
    }

    #[test]
    fn invalid_pdu_in_established_association_aborts() {
        let mut machine = StateMachine::new(Role::Requestor);
        drive(
            &mut machine,
            &[
                (Event::AssociateRequest, Action::Ae1, State::Sta4),
                (Event::TransportConnect, Action::Ae2, State::Sta5),
                (Event::AssociateAcReceived, Action::Ae3, State::Sta6),
                (Event::InvalidPdu, Action::Aa8, State::Sta13),
                (Event::TransportClosed, Action::Ar5, State::Sta1),
            ],
        );
    }

    #[test]
    fn artim_expiry_closes_half_open_connection() {
        let mut machine = StateMachine::new(Role::Acceptor);
        drive(
            &mut machine,
            &[
                (Event::TransportIndication, Action::Ae5, State::Sta2),
                (Event::ArtimExpired, Action::Aa2, State::Sta1),
            ],
        );
    }
}
