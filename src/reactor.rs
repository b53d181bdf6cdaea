//! The DICOM Upper Layer service provider.
//!
//! A [`DulServiceProvider`] owns one association:
//! it runs a reactor on a dedicated thread,
//! exchanging service primitives with the user through a pair of queues
//! and PDUs with the peer through a [`Transport`].
//!
//! Each reactor iteration sources at most one event:
//! a primitive submitted by the user, a PDU read from the transport,
//! or an ARTIM timer expiry; the event is then run through the
//! [state machine](crate::fsm) and the resulting action is performed.
//! All per-association state (machine, queues, timer, transport)
//! is owned exclusively by the reactor thread;
//! the user side only ever touches the queues and a status snapshot
//! behind a single shared lock.
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use byteordered::byteorder::{BigEndian, ByteOrder};
use bytes::BytesMut;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, error, trace, warn};

use crate::config::DulConfig;
use crate::fsm::{self, Action, Event, Role, State, StateMachine};
use crate::pdu::reader::{self, read_pdu_with_codecs, PDU_HEADER_SIZE};
use crate::pdu::writer::{self, write_pdu_with_options, WriteOptions};
use crate::pdu::{AbortRQServiceProviderReason, AbortRQSource, Pdu};
use crate::primitive::{APAbort, ServicePrimitive};
use crate::timer::Timer;
use crate::transport::Transport;

/// The minimum delay between reactor loop iterations
/// when there is nothing to do.
const RUN_LOOP_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to spawn the reactor thread
    SpawnThread { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised inside the reactor.
///
/// All of them are fatal to the association:
/// the reactor bypasses the state machine,
/// sends an A-ABORT straight to the transport and terminates.
#[derive(Debug, Snafu)]
enum ReactorError {
    /// the event has no transition in the current state,
    /// which means the service user drove the association out of protocol
    #[snafu(display("state machine rejected the event"))]
    Machine {
        #[snafu(backtrace)]
        source: fsm::Error,
    },

    /// no primitive staged for an action which requires one
    #[snafu(display("no staged primitive to perform {:?}", action))]
    MissingPrimitive { action: Action },

    /// failed to encode the outgoing PDU
    #[snafu(display("failed to encode PDU"))]
    EncodePdu {
        #[snafu(backtrace)]
        source: writer::Error,
    },

    /// failed to write the encoded PDU to the transport
    #[snafu(display("failed to send PDU"))]
    WireSend { source: std::io::Error },
}

/// A snapshot of the association state
/// as observable by the service user.
#[derive(Debug, Copy, Clone)]
pub struct DulStatus {
    /// The current state of the protocol machine
    pub state: State,
    /// Whether the association negotiation has completed successfully
    pub is_established: bool,
    /// Whether the association was aborted (by either side)
    pub is_aborted: bool,
    /// Whether the association was released in an orderly manner
    pub is_released: bool,
}

impl DulStatus {
    fn new() -> Self {
        DulStatus {
            state: State::Sta1,
            is_established: false,
            is_aborted: false,
            is_released: false,
        }
    }
}

/// An unbounded single-producer single-consumer primitive queue,
/// tolerating a consumer which polls with a timeout.
#[derive(Debug, Default)]
struct PrimitiveQueue {
    items: Mutex<VecDeque<ServicePrimitive>>,
    available: Condvar,
}

impl PrimitiveQueue {
    fn push(&self, primitive: ServicePrimitive) {
        self.items.lock().unwrap().push_back(primitive);
        self.available.notify_one();
    }

    fn try_pop(&self) -> Option<ServicePrimitive> {
        self.items.lock().unwrap().pop_front()
    }

    fn pop_blocking(&self, timeout: Option<Duration>) -> Option<ServicePrimitive> {
        let mut items = self.items.lock().unwrap();
        match timeout {
            None => loop {
                if let Some(primitive) = items.pop_front() {
                    return Some(primitive);
                }
                items = self.available.wait(items).unwrap();
            },
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(primitive) = items.pop_front() {
                        return Some(primitive);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (guard, _) = self.available.wait_timeout(items, deadline - now).unwrap();
                    items = guard;
                }
            }
        }
    }

    fn peek(&self) -> Option<ServicePrimitive> {
        self.items.lock().unwrap().front().cloned()
    }
}

/// The state machine event raised by the arrival of each PDU type.
fn event_for_pdu(pdu: &Pdu) -> Event {
    match pdu {
        Pdu::AssociationRQ(_) => Event::AssociateRqReceived,
        Pdu::AssociationAC(_) => Event::AssociateAcReceived,
        Pdu::AssociationRJ(_) => Event::AssociateRjReceived,
        Pdu::PData { .. } => Event::PDataReceived,
        Pdu::ReleaseRQ => Event::ReleaseRqReceived,
        Pdu::ReleaseRP => Event::ReleaseRpReceived,
        Pdu::AbortRQ { .. } => Event::AbortReceived,
    }
}

/// The DICOM Upper Layer service provider of a single association.
///
/// Dropping the provider requests a reactor shutdown
/// and waits for the thread to finish.
#[derive(Debug)]
pub struct DulServiceProvider {
    to_provider: Arc<PrimitiveQueue>,
    to_user: Arc<PrimitiveQueue>,
    status: Arc<Mutex<DulStatus>>,
    kill: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DulServiceProvider {
    /// Start the service provider for an established transport connection,
    /// spawning the reactor on a dedicated thread.
    ///
    /// With the [`Requestor`](Role::Requestor) role the reactor stays idle
    /// until the user submits an A-ASSOCIATE request primitive.
    /// With the [`Acceptor`](Role::Acceptor) role it immediately awaits
    /// the peer's A-ASSOCIATE-RQ PDU, under the ARTIM timer.
    pub fn spawn<T>(role: Role, transport: T, config: DulConfig) -> Result<Self>
    where
        T: Transport + 'static,
    {
        let to_provider = Arc::new(PrimitiveQueue::default());
        let to_user = Arc::new(PrimitiveQueue::default());
        let status = Arc::new(Mutex::new(DulStatus::new()));
        let kill = Arc::new(AtomicBool::new(false));

        let artim = Timer::new(config.artim_timeout);
        let reactor = Reactor {
            machine: StateMachine::new(role),
            transport,
            transport_open: true,
            config,
            artim,
            events: VecDeque::new(),
            user_primitive: None,
            peer_primitive: None,
            to_provider: Arc::clone(&to_provider),
            to_user: Arc::clone(&to_user),
            status: Arc::clone(&status),
            local_status: DulStatus::new(),
            kill: Arc::clone(&kill),
        };

        let thread = std::thread::Builder::new()
            .name("dicom-dul-reactor".to_string())
            .spawn(move || reactor.run())
            .context(SpawnThreadSnafu)?;

        Ok(DulServiceProvider {
            to_provider,
            to_user,
            status,
            kill,
            thread: Some(thread),
        })
    }

    /// Enqueue a primitive to be sent to the peer. Returns immediately.
    pub fn send_pdu(&self, primitive: impl Into<ServicePrimitive>) {
        let primitive = primitive.into();
        if !matches!(primitive, ServicePrimitive::PData(_)) {
            trace!("acse primitive sent to the provider: {:?}", primitive);
        }
        self.to_provider.push(primitive);
    }

    /// Dequeue the next primitive received from the peer.
    ///
    /// With `wait` set and no timeout, blocks until a primitive arrives;
    /// with a timeout, blocks at most that long.
    /// Otherwise returns a primitive only if one is immediately available.
    pub fn receive_pdu(&self, wait: bool, timeout: Option<Duration>) -> Option<ServicePrimitive> {
        let primitive = if wait {
            self.to_user.pop_blocking(timeout)
        } else {
            self.to_user.try_pop()
        };
        if let Some(primitive) = &primitive {
            if !matches!(primitive, ServicePrimitive::PData(_)) {
                trace!("acse primitive received from the provider: {:?}", primitive);
            }
        }
        primitive
    }

    /// Check the next primitive to be processed without removing it.
    pub fn peek_next_pdu(&self) -> Option<ServicePrimitive> {
        self.to_user.peek()
    }

    /// Request a reactor shutdown, regardless of the association state.
    pub fn kill_dul(&self) {
        self.kill.store(true, Ordering::Relaxed);
    }

    /// Stop the reactor if the association is fully torn down (Sta1).
    ///
    /// Returns whether the reactor was stopped.
    pub fn stop_dul(&mut self) -> bool {
        if self.status().state != State::Sta1 {
            return false;
        }

        self.kill_dul();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        true
    }

    /// A snapshot of the association status.
    pub fn status(&self) -> DulStatus {
        *self.status.lock().unwrap()
    }

    /// The current state of the protocol machine.
    pub fn state(&self) -> State {
        self.status().state
    }

    /// Whether the association negotiation has completed successfully.
    pub fn is_established(&self) -> bool {
        self.status().is_established
    }

    /// Whether the association was aborted.
    pub fn is_aborted(&self) -> bool {
        self.status().is_aborted
    }

    /// Whether the association was released in an orderly manner.
    pub fn is_released(&self) -> bool {
        self.status().is_released
    }
}

impl Drop for DulServiceProvider {
    fn drop(&mut self) {
        self.kill_dul();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct Reactor<T> {
    machine: StateMachine,
    transport: T,
    transport_open: bool,
    config: DulConfig,
    artim: Timer,
    events: VecDeque<Event>,
    /// the last primitive taken from the user queue,
    /// staged for the next encode-and-send action
    user_primitive: Option<ServicePrimitive>,
    /// the primitive decoded from the last received PDU,
    /// staged for the next indication action
    peer_primitive: Option<ServicePrimitive>,
    to_provider: Arc<PrimitiveQueue>,
    to_user: Arc<PrimitiveQueue>,
    status: Arc<Mutex<DulStatus>>,
    local_status: DulStatus,
    kill: Arc<AtomicBool>,
}

impl<T> Reactor<T>
where
    T: Transport,
{
    fn run(mut self) {
        debug!("reactor started as {:?}", self.machine.role());

        if self.machine.role() == Role::Acceptor {
            // the transport connection is already established by the caller
            self.events.push_back(Event::TransportIndication);
        }

        loop {
            if self.kill.load(Ordering::Relaxed) {
                break;
            }

            if self.events.is_empty() && !self.poll() {
                std::thread::sleep(RUN_LOOP_DELAY);
                continue;
            }

            let event = match self.events.pop_front() {
                Some(event) => event,
                None => continue,
            };

            if let Err(e) = self.step(event) {
                error!("fatal error in the reactor, aborting association: {}", e);
                self.bypass_abort();
                break;
            }

            self.publish_status();
        }

        self.publish_status();
        debug!("reactor terminated in {:?}", self.machine.state());
    }

    /// Source at most one event for the machine:
    /// a user primitive, then incoming transport data,
    /// then an ARTIM timer expiry.
    ///
    /// Returns whether an event was enqueued.
    fn poll(&mut self) -> bool {
        if let Some(primitive) = self.to_provider.try_pop() {
            let event = primitive.event();
            self.user_primitive = Some(primitive);
            self.events.push_back(event);
            return true;
        }

        if let Some(event) = self.transport_event() {
            self.events.push_back(event);
            return true;
        }

        // Evt18 is only meaningful while waiting for peer action
        if self.artim.expired()
            && matches!(self.machine.state(), State::Sta2 | State::Sta13)
        {
            self.artim.stop();
            self.events.push_back(Event::ArtimExpired);
            return true;
        }

        false
    }

    /// Check the transport for an incoming PDU.
    fn transport_event(&mut self) -> Option<Event> {
        if !self.transport_open {
            return None;
        }

        match self.machine.state() {
            // no peer traffic is expected before the association
            // is under way or while connecting
            State::Sta1 | State::Sta4 => None,
            // Sta13: waiting for the transport connection to close,
            // but the peer may still have data in flight that must be
            // acted on; once the stream is drained, close our end
            State::Sta13 => match self.transport.ready() {
                Ok(true) => self.read_pdu_event(),
                Ok(false) | Err(_) => {
                    self.close_transport();
                    Some(Event::TransportClosed)
                }
            },
            _ => match self.transport.ready() {
                Ok(true) => self.read_pdu_event(),
                Ok(false) => None,
                Err(e) => {
                    warn!("transport poll failed: {}", e);
                    Some(Event::TransportClosed)
                }
            },
        }
    }

    /// Read and decode one PDU from the transport,
    /// staging the equivalent primitive
    /// and yielding the corresponding event:
    ///
    /// - Evt3, Evt4, Evt6, Evt10, Evt12, Evt13 or Evt16 on a good PDU,
    ///   according to the PDU type;
    /// - Evt17 when the connection closed or a read came up short;
    /// - Evt19 on an unrecognized PDU type or a decoding failure.
    fn read_pdu_event(&mut self) -> Option<Event> {
        // PDU type (1), reserved (1) and PDU length (4)
        let header = match self.transport.recv(PDU_HEADER_SIZE as usize) {
            Ok(header) => header,
            Err(e) => {
                debug!("transport closed while reading PDU header: {}", e);
                return Some(Event::TransportClosed);
            }
        };

        let pdu_type = header[0];
        let pdu_length = BigEndian::read_u32(&header[2..6]);

        if !(0x01..=0x07).contains(&pdu_type) {
            warn!("unrecognized PDU type {:#04x}", pdu_type);
            return Some(Event::InvalidPdu);
        }

        let remainder = match self.transport.recv(pdu_length as usize) {
            Ok(remainder) => remainder,
            Err(e) => {
                debug!("transport closed while reading PDU body: {}", e);
                return Some(Event::TransportClosed);
            }
        };

        let mut bytes = BytesMut::with_capacity(header.len() + remainder.len());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&remainder);
        trace!("{} bytes received", bytes.len());

        let mut cursor = Cursor::new(&bytes[..]);
        match read_pdu_with_codecs(
            &mut cursor,
            self.config.max_pdu_length.max(reader::MINIMUM_PDU_SIZE),
            self.config.strict,
            &self.config.pdu_codecs,
        ) {
            Ok(pdu) => {
                debug!("pdu received: {}", pdu.short_description());
                let event = event_for_pdu(&pdu);
                self.peer_primitive = Some(pdu.to_primitive());
                Some(event)
            }
            Err(e) => {
                warn!("unable to decode the received PDU data: {}", e);
                Some(Event::InvalidPdu)
            }
        }
    }

    /// Run one state machine step for the event
    /// and carry out the resulting action.
    fn step(&mut self, event: Event) -> std::result::Result<(), ReactorError> {
        let action = self.machine.apply(event).context(MachineSnafu)?;
        self.local_status.state = self.machine.state();
        self.perform(action, event)?;
        Ok(())
    }

    /// Perform the side effects of a state machine action.
    fn perform(&mut self, action: Action, event: Event) -> std::result::Result<(), ReactorError> {
        match action {
            // issue a transport connect request; the transport handed to
            // this provider is already connected, so confirm right away
            Action::Ae1 => {
                self.events.push_front(Event::TransportConnect);
            }
            // send the A-ASSOCIATE-RQ PDU
            Action::Ae2 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
            }
            // issue the A-ASSOCIATE confirmation (accept) primitive
            Action::Ae3 => {
                let primitive = self.take_peer_primitive(action)?;
                self.local_status.is_established = true;
                debug!("association established");
                self.issue(primitive);
            }
            // issue the A-ASSOCIATE confirmation (reject) primitive
            // and close the transport connection
            Action::Ae4 => {
                let primitive = self.take_peer_primitive(action)?;
                self.issue(primitive);
                self.close_transport();
            }
            // incoming connection: start the ARTIM timer
            // while waiting for the A-ASSOCIATE-RQ PDU
            Action::Ae5 => {
                self.artim.start();
            }
            // stop the ARTIM timer and issue the A-ASSOCIATE indication
            Action::Ae6 => {
                self.artim.stop();
                let primitive = self.take_peer_primitive(action)?;
                self.issue(primitive);
            }
            // send the A-ASSOCIATE-AC PDU
            Action::Ae7 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
                self.local_status.is_established = true;
                debug!("association established");
            }
            // send the A-ASSOCIATE-RJ PDU and start the ARTIM timer
            Action::Ae8 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
                self.artim.start();
            }
            // send the P-DATA-TF PDU
            Action::Dt1 | Action::Ar7 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
            }
            // issue the P-DATA indication primitive
            Action::Dt2 | Action::Ar6 => {
                let primitive = self.take_peer_primitive(action)?;
                self.issue(primitive);
            }
            // send the A-RELEASE-RQ PDU
            Action::Ar1 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
            }
            // issue the A-RELEASE indication primitive
            // (on collision, Ar8 distinguishes the two sides by next state)
            Action::Ar2 | Action::Ar8 => {
                let primitive = self.take_peer_primitive(action)?;
                self.issue(primitive);
            }
            // issue the A-RELEASE confirmation primitive
            // and close the transport connection
            Action::Ar3 => {
                let primitive = self.take_peer_primitive(action)?;
                self.local_status.is_established = false;
                self.local_status.is_released = true;
                debug!("association released");
                self.issue(primitive);
                self.close_transport();
            }
            // send the A-RELEASE-RP PDU and start the ARTIM timer
            Action::Ar4 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
                self.artim.start();
            }
            // stop the ARTIM timer; the transport has closed.
            // When this completes an orderly release of an established
            // association, record it as released
            Action::Ar5 => {
                self.artim.stop();
                if self.local_status.is_established && !self.local_status.is_aborted {
                    self.local_status.is_established = false;
                    self.local_status.is_released = true;
                    debug!("association released");
                }
            }
            // send the A-RELEASE-RP PDU (collision, requestor side)
            Action::Ar9 => {
                let primitive = self.take_user_primitive(action)?;
                self.send_primitive(&primitive)?;
            }
            // issue the A-RELEASE confirmation primitive (collision)
            Action::Ar10 => {
                let primitive = self.take_peer_primitive(action)?;
                self.issue(primitive);
            }
            // send an A-ABORT PDU and start or restart the ARTIM timer;
            // the source is the service user, unless this is a provider
            // abort submitted through an A-P-ABORT primitive
            Action::Aa1 => {
                let pdu = match (event, self.user_primitive.take()) {
                    (Event::AbortRequest, Some(primitive)) => primitive.to_pdu(),
                    _ => Pdu::AbortRQ {
                        source: AbortRQSource::ServiceUser,
                    },
                };
                self.send_pdu(&pdu)?;
                self.artim.start();
                self.local_status.is_established = false;
                self.local_status.is_aborted = true;
            }
            // stop the ARTIM timer and close the transport connection
            Action::Aa2 => {
                self.artim.stop();
                self.close_transport();
            }
            // a peer abort arrived: issue the A-ABORT (service-user source)
            // or A-P-ABORT (service-provider source) indication
            // and close the transport connection
            Action::Aa3 => {
                let primitive = self.take_peer_primitive(action)?;
                self.local_status.is_established = false;
                self.local_status.is_aborted = true;
                debug!("association aborted by peer");
                self.issue(primitive);
                self.close_transport();
            }
            // the transport connection was lost:
            // issue an A-P-ABORT indication
            Action::Aa4 => {
                self.transport_open = false;
                self.local_status.is_established = false;
                self.local_status.is_aborted = true;
                debug!("association aborted: transport connection lost");
                self.issue(ServicePrimitive::APAbort(APAbort {
                    provider_reason: AbortRQServiceProviderReason::ReasonNotSpecified,
                }));
            }
            // stop the ARTIM timer
            Action::Aa5 => {
                self.artim.stop();
            }
            // ignore the PDU (already closing down)
            Action::Aa6 => {
                self.peer_primitive = None;
            }
            // send an A-ABORT PDU with the service-provider source
            Action::Aa7 => {
                self.peer_primitive = None;
                self.send_pdu(&Pdu::AbortRQ {
                    source: AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::ReasonNotSpecified,
                    ),
                })?;
            }
            // unexpected PDU: send an A-ABORT PDU with the
            // service-provider source, issue an A-P-ABORT indication
            // and start the ARTIM timer
            Action::Aa8 => {
                self.peer_primitive = None;
                self.send_pdu(&Pdu::AbortRQ {
                    source: AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::ReasonNotSpecified,
                    ),
                })?;
                self.local_status.is_established = false;
                self.local_status.is_aborted = true;
                debug!("association aborted: unexpected peer action");
                self.issue(ServicePrimitive::APAbort(APAbort {
                    provider_reason: AbortRQServiceProviderReason::ReasonNotSpecified,
                }));
                self.artim.start();
            }
        }

        Ok(())
    }

    fn take_user_primitive(
        &mut self,
        action: Action,
    ) -> std::result::Result<ServicePrimitive, ReactorError> {
        self.user_primitive
            .take()
            .context(MissingPrimitiveSnafu { action })
    }

    fn take_peer_primitive(
        &mut self,
        action: Action,
    ) -> std::result::Result<ServicePrimitive, ReactorError> {
        self.peer_primitive
            .take()
            .context(MissingPrimitiveSnafu { action })
    }

    /// Hand a primitive over to the service user.
    ///
    /// The status snapshot is refreshed first,
    /// so the user observes a state consistent with the primitive.
    fn issue(&self, primitive: ServicePrimitive) {
        self.publish_status();
        self.to_user.push(primitive);
    }

    fn send_primitive(&mut self, primitive: &ServicePrimitive) -> std::result::Result<(), ReactorError> {
        let pdu = primitive.to_pdu();
        self.send_pdu(&pdu)
    }

    fn send_pdu(&mut self, pdu: &Pdu) -> std::result::Result<(), ReactorError> {
        let options = WriteOptions {
            enforce_uid_conformance: self.config.enforce_uid_conformance,
        };
        let mut bytes = Vec::new();
        write_pdu_with_options(&mut bytes, pdu, options).context(EncodePduSnafu)?;
        self.transport.send(&bytes).context(WireSendSnafu)?;
        debug!("pdu sent: {} ({} bytes)", pdu.short_description(), bytes.len());
        Ok(())
    }

    fn close_transport(&mut self) {
        if self.transport_open {
            let _ = self.transport.close();
            self.transport_open = false;
            debug!("transport connection closed");
        }
    }

    fn publish_status(&self) {
        *self.status.lock().unwrap() = self.local_status;
    }

    /// Abort the association without consulting the state machine.
    ///
    /// An error inside the reactor leaves the machine in an unknown
    /// condition, so the A-ABORT PDU is written straight to the transport
    /// before tearing everything down.
    fn bypass_abort(&mut self) {
        let abort = [
            0x07, 0x00, // A-ABORT, reserved
            0x00, 0x00, 0x00, 0x04, // PDU length
            0x00, 0x00, // reserved
            0x02, 0x00, // service-provider, reason not specified
        ];
        let _ = self.transport.send(&abort);
        self.close_transport();

        self.local_status.is_established = false;
        self.local_status.is_aborted = true;
        self.publish_status();

        self.issue(ServicePrimitive::APAbort(APAbort {
            provider_reason: AbortRQServiceProviderReason::ReasonNotSpecified,
        }));
        self.kill.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{
        write_pdu, AssociationAC, PresentationContextResult, PresentationContextResultReason,
    };
    use crate::primitive::{AAssociate, PData};
    use crate::pdu::{PDataValue, PDataValueType, PresentationContextProposed, UserVariableItem};
    use std::io::ErrorKind;

    /// A transport fed from a script of incoming bytes,
    /// recording everything sent through it.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        incoming: Arc<Mutex<VecDeque<u8>>>,
        outgoing: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new() -> (Self, Arc<Mutex<VecDeque<u8>>>, Arc<Mutex<Vec<u8>>>) {
            let incoming = Arc::new(Mutex::new(VecDeque::new()));
            let outgoing = Arc::new(Mutex::new(Vec::new()));
            (
                ScriptedTransport {
                    incoming: Arc::clone(&incoming),
                    outgoing: Arc::clone(&outgoing),
                },
                incoming,
                outgoing,
            )
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.outgoing.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }

        fn recv(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
            let mut incoming = self.incoming.lock().unwrap();
            if incoming.len() < n {
                return Err(ErrorKind::UnexpectedEof.into());
            }
            Ok(incoming.drain(..n).collect())
        }

        fn ready(&mut self) -> std::io::Result<bool> {
            Ok(!self.incoming.lock().unwrap().is_empty())
        }

        fn close(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn feed(incoming: &Arc<Mutex<VecDeque<u8>>>, pdu: &Pdu) {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, pdu).unwrap();
        incoming.lock().unwrap().extend(bytes);
    }

    fn echo_request() -> AAssociate {
        AAssociate {
            calling_ae_title: "ECHOSCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            presentation_context_list: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            }],
            user_information: vec![UserVariableItem::MaxLength(16382)],
            ..AAssociate::default()
        }
    }

    fn echo_accept() -> Pdu {
        Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            called_ae_title: "ANY-SCP".to_string(),
            calling_ae_title: "ECHOSCU".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: Some("1.2.840.10008.1.2".to_string()),
            }],
            user_variables: vec![UserVariableItem::MaxLength(16382)],
        })
    }

    const RECEIVE_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    #[test]
    fn requestor_establishes_association() {
        let (transport, incoming, outgoing) = ScriptedTransport::new();
        let dul =
            DulServiceProvider::spawn(Role::Requestor, transport, DulConfig::default()).unwrap();

        dul.send_pdu(echo_request());

        // the A-ASSOCIATE-RQ PDU goes out
        let mut attempts = 0;
        while outgoing.lock().unwrap().is_empty() {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 5000, "request never sent");
        }
        assert_eq!(outgoing.lock().unwrap()[0], 0x01);

        // the peer accepts
        feed(&incoming, &echo_accept());

        let confirmation = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        match confirmation {
            ServicePrimitive::AAssociate(confirmation) => {
                assert_eq!(
                    confirmation.result,
                    Some(crate::primitive::AssociateResult::Accepted)
                );
            }
            other => panic!("expected an A-ASSOCIATE confirmation, got {:?}", other),
        }

        assert!(dul.is_established());
        assert_eq!(dul.state(), State::Sta6);
    }

    #[test]
    fn invalid_pdu_in_sta6_drives_abort() {
        let (transport, incoming, outgoing) = ScriptedTransport::new();
        let mut dul =
            DulServiceProvider::spawn(Role::Requestor, transport, DulConfig::default()).unwrap();

        dul.send_pdu(echo_request());
        feed(&incoming, &echo_accept());
        let _confirmation = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();

        // a PDU with an unrecognized type arrives
        incoming
            .lock()
            .unwrap()
            .extend([0x08, 0x00, 0x00, 0x00, 0x00, 0x00]);

        // the user gets an A-P-ABORT indication with reason 0
        let indication = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        assert_eq!(
            indication,
            ServicePrimitive::APAbort(APAbort {
                provider_reason: AbortRQServiceProviderReason::ReasonNotSpecified,
            })
        );
        assert!(dul.is_aborted());

        // and an A-ABORT PDU with source 2, reason 0 was transmitted
        let sent = outgoing.lock().unwrap().clone();
        let abort = &sent[sent.len() - 10..];
        assert_eq!(
            abort,
            &[0x07, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x02, 0x00]
        );

        // the stream is drained, so the reactor closes down to idle
        let mut attempts = 0;
        while dul.state() != State::Sta1 {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 5000, "reactor never reached Sta1");
        }
        assert!(dul.stop_dul());
    }

    #[test]
    fn acceptor_issues_indication_and_accepts() {
        let (transport, incoming, outgoing) = ScriptedTransport::new();
        let dul =
            DulServiceProvider::spawn(Role::Acceptor, transport, DulConfig::default()).unwrap();

        // peer requests an association
        feed(
            &incoming,
            &ServicePrimitive::from(echo_request()).to_pdu(),
        );

        let indication = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        let request = match indication {
            ServicePrimitive::AAssociate(request) => {
                assert_eq!(request.result, None);
                assert_eq!(request.calling_ae_title, "ECHOSCU");
                request
            }
            other => panic!("expected an A-ASSOCIATE indication, got {:?}", other),
        };

        // accept the single presentation context
        dul.send_pdu(AAssociate {
            result: Some(crate::primitive::AssociateResult::Accepted),
            presentation_context_results: vec![PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: Some("1.2.840.10008.1.2".to_string()),
            }],
            ..request
        });

        let mut attempts = 0;
        while !dul.is_established() {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 5000, "association never established");
        }
        // an A-ASSOCIATE-AC PDU went out
        assert_eq!(outgoing.lock().unwrap()[0], 0x02);
        assert_eq!(dul.state(), State::Sta6);
    }

    #[test]
    fn release_round_trip_on_acceptor_side() {
        let (transport, incoming, outgoing) = ScriptedTransport::new();
        let mut dul =
            DulServiceProvider::spawn(Role::Acceptor, transport, DulConfig::default()).unwrap();

        feed(
            &incoming,
            &ServicePrimitive::from(echo_request()).to_pdu(),
        );
        let indication = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        let request = match indication {
            ServicePrimitive::AAssociate(request) => request,
            other => panic!("expected an A-ASSOCIATE indication, got {:?}", other),
        };
        dul.send_pdu(AAssociate {
            result: Some(crate::primitive::AssociateResult::Accepted),
            presentation_context_results: vec![PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: Some("1.2.840.10008.1.2".to_string()),
            }],
            ..request
        });

        // peer sends a command fragment and then asks for release
        feed(
            &incoming,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: 1,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: vec![0x42; 10],
                }],
            },
        );
        let data_indication = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        assert!(matches!(data_indication, ServicePrimitive::PData(_)));

        feed(&incoming, &Pdu::ReleaseRQ);
        let release_indication = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        assert_eq!(
            release_indication,
            ServicePrimitive::ARelease(crate::primitive::ARelease { result: None })
        );

        // answer the release; the reactor replies and winds down to idle
        dul.send_pdu(crate::primitive::ARelease {
            result: Some(crate::primitive::ReleaseResult::Affirmative),
        });

        let mut attempts = 0;
        while dul.state() != State::Sta1 {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 5000, "release never completed");
        }
        assert!(dul.is_released());
        assert!(!dul.is_aborted());
        // A-RELEASE-RP was the last PDU out
        let sent = outgoing.lock().unwrap().clone();
        assert_eq!(sent[sent.len() - 10], 0x06);

        assert!(dul.stop_dul());
    }

    #[test]
    fn release_collision_on_the_requestor_side() {
        let (transport, incoming, outgoing) = ScriptedTransport::new();
        let mut dul =
            DulServiceProvider::spawn(Role::Requestor, transport, DulConfig::default()).unwrap();

        dul.send_pdu(echo_request());
        feed(&incoming, &echo_accept());
        let _confirmation = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();

        // this side asks for release...
        dul.send_pdu(crate::primitive::ARelease { result: None });
        let release_rq = [0x05, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00];
        let mut attempts = 0;
        while !outgoing.lock().unwrap().ends_with(&release_rq) {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 5000, "release request never sent");
        }

        // ...and so does the peer, concurrently
        feed(&incoming, &Pdu::ReleaseRQ);
        let indication = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        assert_eq!(
            indication,
            ServicePrimitive::ARelease(crate::primitive::ARelease { result: None })
        );
        assert_eq!(dul.state(), State::Sta9);

        // the requestor side responds first, then expects the peer reply
        dul.send_pdu(crate::primitive::ARelease {
            result: Some(crate::primitive::ReleaseResult::Affirmative),
        });
        feed(&incoming, &Pdu::ReleaseRP);

        let confirmation = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();
        assert_eq!(
            confirmation,
            ServicePrimitive::ARelease(crate::primitive::ARelease {
                result: Some(crate::primitive::ReleaseResult::Affirmative),
            })
        );
        assert_eq!(dul.state(), State::Sta1);
        assert!(dul.is_released());
        assert!(dul.stop_dul());
    }

    #[test]
    fn stop_dul_refuses_while_association_is_up() {
        let (transport, incoming, _outgoing) = ScriptedTransport::new();
        let mut dul =
            DulServiceProvider::spawn(Role::Requestor, transport, DulConfig::default()).unwrap();

        dul.send_pdu(echo_request());
        feed(&incoming, &echo_accept());
        let _confirmation = dul.receive_pdu(true, RECEIVE_TIMEOUT).unwrap();

        assert_eq!(dul.state(), State::Sta6);
        assert!(!dul.stop_dul());

        // a user abort tears the association down
        dul.send_pdu(crate::primitive::AAbort::default());
        let mut attempts = 0;
        while dul.state() != State::Sta1 {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 5000, "abort never completed");
        }
        assert!(dul.is_aborted());
        assert!(dul.stop_dul());
    }
}
