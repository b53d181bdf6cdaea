//! This crate contains a state-machine driven implementation
//! of the DICOM Upper Layer protocol (PS3.8),
//! enabling two application entities to negotiate an association,
//! exchange DIMSE messages inside it and tear it down.
//!
//! - The [`pdu`] module
//!   provides the data structures representing _protocol data units_
//!   together with their encoders and decoders.
//! - The [`primitive`] module
//!   provides the ACSE service primitives
//!   (A-ASSOCIATE, A-RELEASE, A-ABORT, A-P-ABORT, P-DATA)
//!   and their translation to and from PDUs.
//! - The [`fsm`] module
//!   implements the upper layer protocol machine:
//!   13 states, 19 events and the full PS3.8 action table.
//! - The [`reactor`] module
//!   drives an association over a [`transport`](crate::transport),
//!   running the protocol machine on a dedicated thread
//!   and exchanging primitives with the service user through queues.
//!
//! The DIMSE message layer, service class behavior
//! and connection establishment are out of scope:
//! this crate transports opaque presentation data values
//! on behalf of whichever layer sits on top of it.
//!
//! ## Example
//!
//! ```no_run
//! use dicom_dul::{
//!     AAssociate, DulConfig, DulServiceProvider, PresentationContextProposed, Role,
//!     ServicePrimitive, TcpTransport, UserVariableItem,
//! };
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = std::net::TcpStream::connect("129.168.0.5:104")?;
//! let dul = DulServiceProvider::spawn(
//!     Role::Requestor,
//!     TcpTransport::new(stream)?,
//!     DulConfig::default(),
//! )?;
//!
//! dul.send_pdu(AAssociate {
//!     calling_ae_title: "ECHOSCU".to_string(),
//!     called_ae_title: "ANY-SCP".to_string(),
//!     presentation_context_list: vec![PresentationContextProposed {
//!         id: 1,
//!         abstract_syntax: "1.2.840.10008.1.1".to_string(),
//!         transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
//!     }],
//!     user_information: vec![
//!         UserVariableItem::MaxLength(16382),
//!         UserVariableItem::ImplementationClassUID(
//!             dicom_dul::IMPLEMENTATION_CLASS_UID.to_string(),
//!         ),
//!     ],
//!     ..AAssociate::default()
//! });
//!
//! match dul.receive_pdu(true, None) {
//!     Some(ServicePrimitive::AAssociate(confirmation)) => {
//!         println!("association outcome: {:?}", confirmation.result);
//!     }
//!     other => eprintln!("unexpected primitive: {:?}", other),
//! }
//! # Ok(())
//! # }
//! ```
pub mod aet;
pub mod config;
pub mod fsm;
pub mod pdu;
pub mod primitive;
pub mod reactor;
pub mod text;
pub mod timer;
pub mod transport;
pub mod uid;

/// The current implementation class UID generically referring to this crate.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.130984950029899771041107395941696826237";

/// The current implementation version name generically referring to this crate.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOM-DUL 0.1.0";

// re-exports

pub use config::DulConfig;
pub use fsm::{Action, Event, Role, State, StateMachine};
pub use pdu::reader::read_pdu;
pub use pdu::writer::write_pdu;
pub use pdu::{
    Pdu, PresentationContextProposed, PresentationContextResult, UserVariableItem,
};
pub use primitive::{
    AAbort, AAssociate, APAbort, ARelease, AssociateResult, PData, ReleaseResult,
    ServicePrimitive,
};
pub use reactor::{DulServiceProvider, DulStatus};
pub use transport::{TcpTransport, Transport};
