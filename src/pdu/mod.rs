//! Protocol data unit module.
//!
//! This module comprises the data structures for all seven PDU types
//! of the DICOM Upper Layer protocol,
//! as well as their encoders and decoders
//! ([`write_pdu`] and [`read_pdu`] respectively).
pub mod reader;
pub mod writer;

pub use reader::read_pdu;
pub use writer::write_pdu;

use std::fmt;

/// An identified presentation context proposed on an A-ASSOCIATE-RQ.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextProposed {
    /// The presentation context identifier, an odd integer between 1 and 255
    pub id: u8,
    /// The proposed abstract syntax UID
    pub abstract_syntax: String,
    /// The proposed transfer syntax UIDs, at least one
    pub transfer_syntaxes: Vec<String>,
}

/// The outcome of a presentation context negotiation
/// as carried on an A-ASSOCIATE-AC.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextResult {
    /// The presentation context identifier from the request
    pub id: u8,
    /// The result of the negotiation
    pub reason: PresentationContextResultReason,
    /// The accepted transfer syntax UID.
    ///
    /// When the context was not accepted
    /// this field is not significant and may be empty.
    pub transfer_syntax: Option<String>,
}

/// The reason field of a negotiated presentation context.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

impl PresentationContextResultReason {
    fn from(reason: u8) -> Option<Self> {
        match reason {
            0 => Some(PresentationContextResultReason::Acceptance),
            1 => Some(PresentationContextResultReason::UserRejection),
            2 => Some(PresentationContextResultReason::NoReason),
            3 => Some(PresentationContextResultReason::AbstractSyntaxNotSupported),
            4 => Some(PresentationContextResultReason::TransferSyntaxesNotSupported),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            PresentationContextResultReason::Acceptance => 0,
            PresentationContextResultReason::UserRejection => 1,
            PresentationContextResultReason::NoReason => 2,
            PresentationContextResultReason::AbstractSyntaxNotSupported => 3,
            PresentationContextResultReason::TransferSyntaxesNotSupported => 4,
        }
    }
}

/// The result field of an A-ASSOCIATE-RJ.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJResult {
    Permanent,
    Transient,
}

impl AssociationRJResult {
    fn from(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(AssociationRJResult::Permanent),
            0x02 => Some(AssociationRJResult::Transient),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            AssociationRJResult::Permanent => 0x01,
            AssociationRJResult::Transient => 0x02,
        }
    }
}

/// The source and reason fields of an A-ASSOCIATE-RJ.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJSource {
    /// DICOM UL service-user
    ServiceUser(AssociationRJServiceUserReason),
    /// DICOM UL service-provider (ACSE related function)
    ServiceProviderAsce(AssociationRJServiceProviderAsceReason),
    /// DICOM UL service-provider (presentation related function)
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    fn from(source: u8, reason: u8) -> Option<Self> {
        match (source, reason) {
            (0x01, 0x01) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::NoReasonGiven,
            )),
            (0x01, 0x02) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            )),
            (0x01, 0x03) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CallingAETitleNotRecognized,
            )),
            (0x01, 0x07) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            )),
            (0x01, reason) if (0x04..=0x06).contains(&reason) || (0x08..=0x0A).contains(&reason) => {
                Some(AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::Reserved(reason),
                ))
            }
            (0x02, 0x01) => Some(AssociationRJSource::ServiceProviderAsce(
                AssociationRJServiceProviderAsceReason::NoReasonGiven,
            )),
            (0x02, 0x02) => Some(AssociationRJSource::ServiceProviderAsce(
                AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported,
            )),
            (0x03, 0x01) => Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            )),
            (0x03, 0x02) => Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            )),
            (0x03, reason) if reason == 0x00 || (0x03..=0x07).contains(&reason) => {
                Some(AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::Reserved(reason),
                ))
            }
            _ => None,
        }
    }

    fn to_words(self) -> (u8, u8) {
        match self {
            AssociationRJSource::ServiceUser(reason) => (0x01, reason.to_u8()),
            AssociationRJSource::ServiceProviderAsce(reason) => (0x02, reason.to_u8()),
            AssociationRJSource::ServiceProviderPresentation(reason) => (0x03, reason.to_u8()),
        }
    }
}

impl fmt::Display for AssociationRJSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationRJSource::ServiceUser(reason) => {
                write!(f, "service user ({})", reason)
            }
            AssociationRJSource::ServiceProviderAsce(reason) => {
                write!(f, "service provider, ACSE ({})", reason)
            }
            AssociationRJSource::ServiceProviderPresentation(reason) => {
                write!(f, "service provider, presentation ({})", reason)
            }
        }
    }
}

/// The rejection reasons available to the UL service-user.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

impl AssociationRJServiceUserReason {
    fn to_u8(self) -> u8 {
        match self {
            AssociationRJServiceUserReason::NoReasonGiven => 0x01,
            AssociationRJServiceUserReason::ApplicationContextNameNotSupported => 0x02,
            AssociationRJServiceUserReason::CallingAETitleNotRecognized => 0x03,
            AssociationRJServiceUserReason::CalledAETitleNotRecognized => 0x07,
            AssociationRJServiceUserReason::Reserved(reason) => reason,
        }
    }
}

impl fmt::Display for AssociationRJServiceUserReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationRJServiceUserReason::NoReasonGiven => f.write_str("no reason given"),
            AssociationRJServiceUserReason::ApplicationContextNameNotSupported => {
                f.write_str("application context name not supported")
            }
            AssociationRJServiceUserReason::CallingAETitleNotRecognized => {
                f.write_str("calling AE title not recognized")
            }
            AssociationRJServiceUserReason::CalledAETitleNotRecognized => {
                f.write_str("called AE title not recognized")
            }
            AssociationRJServiceUserReason::Reserved(reason) => {
                write!(f, "reserved reason {}", reason)
            }
        }
    }
}

/// The rejection reasons available to the ACSE related function
/// of the UL service-provider.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderAsceReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

impl AssociationRJServiceProviderAsceReason {
    fn to_u8(self) -> u8 {
        match self {
            AssociationRJServiceProviderAsceReason::NoReasonGiven => 0x01,
            AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported => 0x02,
        }
    }
}

impl fmt::Display for AssociationRJServiceProviderAsceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationRJServiceProviderAsceReason::NoReasonGiven => f.write_str("no reason given"),
            AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported => {
                f.write_str("protocol version not supported")
            }
        }
    }
}

/// The rejection reasons available to the presentation related function
/// of the UL service-provider.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

impl AssociationRJServiceProviderPresentationReason {
    fn to_u8(self) -> u8 {
        match self {
            AssociationRJServiceProviderPresentationReason::TemporaryCongestion => 0x01,
            AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => 0x02,
            AssociationRJServiceProviderPresentationReason::Reserved(reason) => reason,
        }
    }
}

impl fmt::Display for AssociationRJServiceProviderPresentationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationRJServiceProviderPresentationReason::TemporaryCongestion => {
                f.write_str("temporary congestion")
            }
            AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => {
                f.write_str("local limit exceeded")
            }
            AssociationRJServiceProviderPresentationReason::Reserved(reason) => {
                write!(f, "reserved reason {}", reason)
            }
        }
    }
}

/// A presentation data value fragment in a P-DATA-TF.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PDataValue {
    /// The presentation context identifying the value's encoding
    pub presentation_context_id: u8,
    /// Whether the fragment carries command or data set information
    pub value_type: PDataValueType,
    /// Whether this is the last fragment of the message
    pub is_last: bool,
    /// The fragment data, opaque to the upper layer
    pub data: Vec<u8>,
}

/// The kind of DIMSE message information in a presentation data value.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PDataValueType {
    Command,
    Data,
}

/// The source and reason fields of an A-ABORT.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQSource {
    /// DICOM UL service-user initiated abort
    ServiceUser,
    /// DICOM UL service-provider initiated abort
    ServiceProvider(AbortRQServiceProviderReason),
    /// Reserved source value
    Reserved,
}

impl AbortRQSource {
    fn from(source: u8, reason: u8) -> Option<Self> {
        match (source, reason) {
            (0x00, _) => Some(AbortRQSource::ServiceUser),
            (0x01, _) => Some(AbortRQSource::Reserved),
            (0x02, reason) => {
                AbortRQServiceProviderReason::from_u8(reason).map(AbortRQSource::ServiceProvider)
            }
            _ => None,
        }
    }

    fn to_words(self) -> (u8, u8) {
        match self {
            AbortRQSource::ServiceUser => (0x00, 0x00),
            AbortRQSource::Reserved => (0x01, 0x00),
            AbortRQSource::ServiceProvider(reason) => (0x02, reason.to_u8()),
        }
    }
}

/// The abort reasons available to the UL service-provider.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    Reserved,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameter,
}

impl AbortRQServiceProviderReason {
    /// Retrieve the wire value of the reason field.
    pub fn to_u8(self) -> u8 {
        match self {
            AbortRQServiceProviderReason::ReasonNotSpecified => 0x00,
            AbortRQServiceProviderReason::UnrecognizedPdu => 0x01,
            AbortRQServiceProviderReason::UnexpectedPdu => 0x02,
            AbortRQServiceProviderReason::Reserved => 0x03,
            AbortRQServiceProviderReason::UnrecognizedPduParameter => 0x04,
            AbortRQServiceProviderReason::UnexpectedPduParameter => 0x05,
            AbortRQServiceProviderReason::InvalidPduParameter => 0x06,
        }
    }

    /// Retrieve the reason variant for the given wire value, if recognized.
    pub fn from_u8(reason: u8) -> Option<Self> {
        match reason {
            0x00 => Some(AbortRQServiceProviderReason::ReasonNotSpecified),
            0x01 => Some(AbortRQServiceProviderReason::UnrecognizedPdu),
            0x02 => Some(AbortRQServiceProviderReason::UnexpectedPdu),
            0x03 => Some(AbortRQServiceProviderReason::Reserved),
            0x04 => Some(AbortRQServiceProviderReason::UnrecognizedPduParameter),
            0x05 => Some(AbortRQServiceProviderReason::UnexpectedPduParameter),
            0x06 => Some(AbortRQServiceProviderReason::InvalidPduParameter),
            _ => None,
        }
    }
}

/// The user identity type of a User Identity negotiation sub-item.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserIdentityType {
    /// Username as a UTF-8 string
    Username,
    /// Username as a UTF-8 string and passcode
    UsernameAndPassword,
    /// Kerberos Service ticket
    KerberosServiceTicket,
    /// SAML Assertion
    SamlAssertion,
    /// JSON Web Token
    Jwt,
}

impl UserIdentityType {
    /// Retrieve the identity type for the given wire value, if recognized.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(UserIdentityType::Username),
            2 => Some(UserIdentityType::UsernameAndPassword),
            3 => Some(UserIdentityType::KerberosServiceTicket),
            4 => Some(UserIdentityType::SamlAssertion),
            5 => Some(UserIdentityType::Jwt),
            _ => None,
        }
    }

    /// Retrieve the wire value of the identity type.
    pub fn to_u8(self) -> u8 {
        match self {
            UserIdentityType::Username => 1,
            UserIdentityType::UsernameAndPassword => 2,
            UserIdentityType::KerberosServiceTicket => 3,
            UserIdentityType::SamlAssertion => 4,
            UserIdentityType::Jwt => 5,
        }
    }
}

/// A user identity negotiation request as carried on an A-ASSOCIATE-RQ.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct UserIdentity {
    positive_response_requested: bool,
    identity_type: UserIdentityType,
    primary_field: Vec<u8>,
    secondary_field: Vec<u8>,
}

impl UserIdentity {
    /// Create a new user identity negotiation request.
    ///
    /// The secondary field shall only be non-empty
    /// when the identity type is
    /// [`UsernameAndPassword`](UserIdentityType::UsernameAndPassword).
    pub fn new(
        positive_response_requested: bool,
        identity_type: UserIdentityType,
        primary_field: Vec<u8>,
        secondary_field: Vec<u8>,
    ) -> Self {
        UserIdentity {
            positive_response_requested,
            identity_type,
            primary_field,
            secondary_field,
        }
    }

    /// Whether a positive server response was requested.
    pub fn positive_response_requested(&self) -> bool {
        self.positive_response_requested
    }

    /// The user identity type.
    pub fn identity_type(&self) -> UserIdentityType {
        self.identity_type
    }

    /// The primary identity field (username, ticket or assertion).
    pub fn primary_field(&self) -> &[u8] {
        &self.primary_field
    }

    /// The secondary identity field (passcode).
    pub fn secondary_field(&self) -> &[u8] {
        &self.secondary_field
    }
}

/// An SCP/SCU role selection negotiation entry
/// for a single SOP class or meta SOP class.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct RoleSelection {
    /// The SOP class or meta SOP class UID
    pub sop_class_uid: String,
    /// Whether the proposer may act as an SCU for this SOP class
    pub scu_role: bool,
    /// Whether the proposer may act as an SCP for this SOP class
    pub scp_role: bool,
}

/// A SOP class common extended negotiation entry.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct CommonExtendedNegotiation {
    /// The SOP class UID
    pub sop_class_uid: String,
    /// The service class UID
    pub service_class_uid: String,
    /// The related general SOP class identification
    pub related_general_sop_classes: Vec<String>,
}

/// A user information sub-item,
/// carried in the User Information item of an A-ASSOCIATE PDU.
///
/// Role selection and the extended negotiation variants may appear
/// multiple times per association; the remaining variants at most once.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserVariableItem {
    /// Any unrecognized sub-item, kept as raw bytes
    Unknown(u8, Vec<u8>),
    /// Maximum length received (sub-item 0x51); 0 means unlimited
    MaxLength(u32),
    /// Implementation class UID (sub-item 0x52)
    ImplementationClassUID(String),
    /// Implementation version name (sub-item 0x55)
    ImplementationVersionName(String),
    /// Asynchronous operations window (sub-item 0x53):
    /// maximum operations invoked and maximum operations performed
    AsyncOperationsWindow(u16, u16),
    /// SCP/SCU role selection (sub-item 0x54)
    RoleSelection(RoleSelection),
    /// SOP class extended negotiation (sub-item 0x56):
    /// SOP class UID and service class application information
    SopClassExtendedNegotiationSubItem(String, Vec<u8>),
    /// SOP class common extended negotiation (sub-item 0x57)
    SopClassCommonExtendedNegotiationSubItem(CommonExtendedNegotiation),
    /// User identity negotiation request (sub-item 0x58)
    UserIdentityItem(UserIdentity),
    /// User identity negotiation server response (sub-item 0x59)
    UserIdentityResponse(Vec<u8>),
}

/// A variable item of an A-ASSOCIATE PDU.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PduVariableItem {
    Unknown(u8),
    ApplicationContext(String),
    PresentationContextProposed(PresentationContextProposed),
    PresentationContextResult(PresentationContextResult),
    UserVariables(Vec<UserVariableItem>),
}

/// An A-ASSOCIATE-RQ PDU.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AssociationRQ {
    /// The protocol version, bit 0 set for version 1
    pub protocol_version: u16,
    /// The application entity title of the peer node
    pub called_ae_title: String,
    /// The application entity title of this node
    pub calling_ae_title: String,
    /// The proposed application context name
    pub application_context_name: String,
    /// The proposed presentation contexts, at least one
    pub presentation_contexts: Vec<PresentationContextProposed>,
    /// The user information sub-items
    pub user_variables: Vec<UserVariableItem>,
}

impl From<AssociationRQ> for Pdu {
    fn from(value: AssociationRQ) -> Self {
        Pdu::AssociationRQ(value)
    }
}

/// An A-ASSOCIATE-AC PDU.
///
/// The AE title fields are reserved in this PDU:
/// they carry back the values received on the A-ASSOCIATE-RQ
/// and their contents shall not be tested.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AssociationAC {
    /// The protocol version, bit 0 set for version 1
    pub protocol_version: u16,
    /// Reserved: the called AE title echoed from the request
    pub called_ae_title: String,
    /// Reserved: the calling AE title echoed from the request
    pub calling_ae_title: String,
    /// The accepted application context name
    pub application_context_name: String,
    /// The presentation context negotiation results
    pub presentation_contexts: Vec<PresentationContextResult>,
    /// The user information sub-items
    pub user_variables: Vec<UserVariableItem>,
}

impl From<AssociationAC> for Pdu {
    fn from(value: AssociationAC) -> Self {
        Pdu::AssociationAC(value)
    }
}

/// An A-ASSOCIATE-RJ PDU.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AssociationRJ {
    /// Whether the rejection is permanent or transient
    pub result: AssociationRJResult,
    /// The source of the rejection, with the corresponding reason
    pub source: AssociationRJSource,
}

impl From<AssociationRJ> for Pdu {
    fn from(value: AssociationRJ) -> Self {
        Pdu::AssociationRJ(value)
    }
}

/// A DICOM Upper Layer protocol data unit.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum Pdu {
    /// A-ASSOCIATE-RQ (PDU type 0x01)
    AssociationRQ(AssociationRQ),
    /// A-ASSOCIATE-AC (PDU type 0x02)
    AssociationAC(AssociationAC),
    /// A-ASSOCIATE-RJ (PDU type 0x03)
    AssociationRJ(AssociationRJ),
    /// P-DATA-TF (PDU type 0x04)
    PData {
        /// The presentation data value items
        data: Vec<PDataValue>,
    },
    /// A-RELEASE-RQ (PDU type 0x05)
    ReleaseRQ,
    /// A-RELEASE-RP (PDU type 0x06)
    ReleaseRP,
    /// A-ABORT (PDU type 0x07)
    AbortRQ {
        /// The source of the abort, with a reason when provider initiated
        source: AbortRQSource,
    },
}

impl Pdu {
    /// A short description of the PDU kind, for diagnostics.
    pub fn short_description(&self) -> &'static str {
        match self {
            Pdu::AssociationRQ { .. } => "A-ASSOCIATE-RQ",
            Pdu::AssociationAC { .. } => "A-ASSOCIATE-AC",
            Pdu::AssociationRJ { .. } => "A-ASSOCIATE-RJ",
            Pdu::PData { .. } => "P-DATA-TF",
            Pdu::ReleaseRQ => "A-RELEASE-RQ",
            Pdu::ReleaseRP => "A-RELEASE-RP",
            Pdu::AbortRQ { .. } => "A-ABORT",
        }
    }
}
