//! Service primitive module.
//!
//! The types in this module mirror the ACSE service parameters of
//! PS3.8 section 7: A-ASSOCIATE, A-RELEASE, A-ABORT, A-P-ABORT and P-DATA.
//! They are the currency between the service user and the upper layer
//! provider: the user submits request and response primitives,
//! and receives indication and confirmation primitives,
//! while the wire format stays confined to the [`pdu`](crate::pdu) module.
//!
//! Conversion to and from PDUs is pure data transformation:
//! [`ServicePrimitive::to_pdu`] and [`Pdu::to_primitive`]
//! perform no I/O and no state changes.
use crate::fsm::Event;
use crate::pdu::{
    AbortRQServiceProviderReason, AbortRQSource, AssociationAC, AssociationRJ,
    AssociationRJResult, AssociationRJSource, AssociationRQ, PDataValue, Pdu,
    PresentationContextProposed, PresentationContextResult, UserVariableItem,
};

/// The outcome of an association negotiation,
/// carried by A-ASSOCIATE response and confirmation primitives.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociateResult {
    /// The association was accepted (result 0)
    Accepted,
    /// The association was rejected (result 1 or 2),
    /// with the rejection source and reason
    Rejected {
        result: AssociationRJResult,
        source: AssociationRJSource,
    },
}

/// An A-ASSOCIATE primitive.
///
/// A value with no result is a request (or indication);
/// a value with a result is a response (or confirmation).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AAssociate {
    /// The protocol version, bit 0 set for version 1
    pub protocol_version: u16,
    /// The application context name;
    /// not present on reject responses
    pub application_context_name: Option<String>,
    /// The AE title of the requestor node
    pub calling_ae_title: String,
    /// The AE title of the accepting node
    pub called_ae_title: String,
    /// The outcome of the negotiation;
    /// `None` on request and indication primitives
    pub result: Option<AssociateResult>,
    /// The presentation contexts proposed by the requestor
    pub presentation_context_list: Vec<PresentationContextProposed>,
    /// The presentation context negotiation results
    pub presentation_context_results: Vec<PresentationContextResult>,
    /// The user information items (notifications and negotiations)
    pub user_information: Vec<UserVariableItem>,
}

impl Default for AAssociate {
    fn default() -> Self {
        AAssociate {
            protocol_version: 1,
            application_context_name: Some("1.2.840.10008.3.1.1.1".to_string()),
            calling_ae_title: String::new(),
            called_ae_title: String::new(),
            result: None,
            presentation_context_list: Vec::new(),
            presentation_context_results: Vec::new(),
            user_information: Vec::new(),
        }
    }
}

impl AAssociate {
    /// The maximum length received value from the user information items,
    /// if present.
    pub fn maximum_length_received(&self) -> Option<u32> {
        self.user_information.iter().find_map(|item| match item {
            UserVariableItem::MaxLength(max_length) => Some(*max_length),
            _ => None,
        })
    }

    /// The implementation class UID from the user information items,
    /// if present.
    pub fn implementation_class_uid(&self) -> Option<&str> {
        self.user_information.iter().find_map(|item| match item {
            UserVariableItem::ImplementationClassUID(uid) => Some(uid.as_str()),
            _ => None,
        })
    }

    /// The implementation version name from the user information items,
    /// if present.
    pub fn implementation_version_name(&self) -> Option<&str> {
        self.user_information.iter().find_map(|item| match item {
            UserVariableItem::ImplementationVersionName(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// The result parameter of an A-RELEASE response or confirmation.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum ReleaseResult {
    /// The only value admitted by the standard
    Affirmative,
}

/// An A-RELEASE primitive.
///
/// A value with no result is a request (or indication);
/// a value with the affirmative result is a response (or confirmation).
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug, Default)]
pub struct ARelease {
    /// The release outcome; `None` on request and indication primitives
    pub result: Option<ReleaseResult>,
}

/// The source parameter of an A-ABORT primitive.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AAbortSource {
    /// Upper layer service-user (source 0)
    ServiceUser,
    /// Reserved (source 1)
    Reserved,
}

/// An A-ABORT primitive: an abort requested by the service user,
/// or the indication of a peer user abort.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AAbort {
    /// The source of the abort
    pub source: AAbortSource,
}

impl Default for AAbort {
    fn default() -> Self {
        AAbort {
            source: AAbortSource::ServiceUser,
        }
    }
}

/// An A-P-ABORT primitive: an abort raised by the service provider,
/// carrying the provider reason.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct APAbort {
    /// The reason for the abort
    pub provider_reason: AbortRQServiceProviderReason,
}

/// A P-DATA primitive, carrying one or more presentation data values.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug, Default)]
pub struct PData {
    /// The presentation data value list
    pub data: Vec<PDataValue>,
}

/// An ACSE service primitive,
/// as exchanged between the service user and the upper layer provider.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum ServicePrimitive {
    AAssociate(AAssociate),
    ARelease(ARelease),
    AAbort(AAbort),
    APAbort(APAbort),
    PData(PData),
}

impl ServicePrimitive {
    /// The state machine event raised when the service user
    /// submits this primitive to the provider.
    ///
    /// The mapping is fixed:
    /// an A-ASSOCIATE primitive is a request without a result (Evt1),
    /// an accepting response (Evt7) or a rejecting response (Evt8);
    /// an A-RELEASE primitive is a request (Evt11) or a response (Evt14);
    /// abort primitives always map to Evt15 and P-DATA to Evt9.
    pub fn event(&self) -> Event {
        match self {
            ServicePrimitive::AAssociate(AAssociate { result: None, .. }) => {
                Event::AssociateRequest
            }
            ServicePrimitive::AAssociate(AAssociate {
                result: Some(AssociateResult::Accepted),
                ..
            }) => Event::AssociateResponseAccept,
            ServicePrimitive::AAssociate(AAssociate {
                result: Some(AssociateResult::Rejected { .. }),
                ..
            }) => Event::AssociateResponseReject,
            ServicePrimitive::ARelease(ARelease { result: None }) => Event::ReleaseRequest,
            ServicePrimitive::ARelease(ARelease { result: Some(_) }) => Event::ReleaseResponse,
            ServicePrimitive::AAbort(_) | ServicePrimitive::APAbort(_) => Event::AbortRequest,
            ServicePrimitive::PData(_) => Event::PDataRequest,
        }
    }

    /// Convert this primitive into the equivalent PDU.
    ///
    /// The A-ASSOCIATE primitive becomes an A-ASSOCIATE-RQ, -AC or -RJ
    /// depending on the result;
    /// the A-RELEASE primitive becomes an A-RELEASE-RQ or -RP;
    /// and both abort primitives become an A-ABORT.
    pub fn to_pdu(&self) -> Pdu {
        match self {
            ServicePrimitive::AAssociate(primitive) => match &primitive.result {
                None => Pdu::AssociationRQ(AssociationRQ {
                    protocol_version: primitive.protocol_version,
                    called_ae_title: primitive.called_ae_title.clone(),
                    calling_ae_title: primitive.calling_ae_title.clone(),
                    application_context_name: primitive
                        .application_context_name
                        .clone()
                        .unwrap_or_default(),
                    presentation_contexts: primitive.presentation_context_list.clone(),
                    user_variables: primitive.user_information.clone(),
                }),
                Some(AssociateResult::Accepted) => Pdu::AssociationAC(AssociationAC {
                    protocol_version: primitive.protocol_version,
                    called_ae_title: primitive.called_ae_title.clone(),
                    calling_ae_title: primitive.calling_ae_title.clone(),
                    application_context_name: primitive
                        .application_context_name
                        .clone()
                        .unwrap_or_default(),
                    presentation_contexts: primitive.presentation_context_results.clone(),
                    user_variables: primitive.user_information.clone(),
                }),
                Some(AssociateResult::Rejected { result, source }) => {
                    Pdu::AssociationRJ(AssociationRJ {
                        result: *result,
                        source: *source,
                    })
                }
            },
            ServicePrimitive::ARelease(ARelease { result: None }) => Pdu::ReleaseRQ,
            ServicePrimitive::ARelease(ARelease { result: Some(_) }) => Pdu::ReleaseRP,
            ServicePrimitive::AAbort(AAbort { source }) => Pdu::AbortRQ {
                source: match source {
                    AAbortSource::ServiceUser => AbortRQSource::ServiceUser,
                    AAbortSource::Reserved => AbortRQSource::Reserved,
                },
            },
            ServicePrimitive::APAbort(APAbort { provider_reason }) => Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(*provider_reason),
            },
            ServicePrimitive::PData(PData { data }) => Pdu::PData { data: data.clone() },
        }
    }
}

impl From<AAssociate> for ServicePrimitive {
    fn from(value: AAssociate) -> Self {
        ServicePrimitive::AAssociate(value)
    }
}

impl From<ARelease> for ServicePrimitive {
    fn from(value: ARelease) -> Self {
        ServicePrimitive::ARelease(value)
    }
}

impl From<AAbort> for ServicePrimitive {
    fn from(value: AAbort) -> Self {
        ServicePrimitive::AAbort(value)
    }
}

impl From<APAbort> for ServicePrimitive {
    fn from(value: APAbort) -> Self {
        ServicePrimitive::APAbort(value)
    }
}

impl From<PData> for ServicePrimitive {
    fn from(value: PData) -> Self {
        ServicePrimitive::PData(value)
    }
}

impl Pdu {
    /// Convert this PDU into the equivalent service primitive,
    /// to be handed to the service user as an indication or confirmation.
    ///
    /// A received A-ABORT with the service-provider source becomes an
    /// A-P-ABORT primitive with its provider reason;
    /// any other source becomes an A-ABORT primitive.
    pub fn to_primitive(&self) -> ServicePrimitive {
        match self {
            Pdu::AssociationRQ(AssociationRQ {
                protocol_version,
                called_ae_title,
                calling_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            }) => ServicePrimitive::AAssociate(AAssociate {
                protocol_version: *protocol_version,
                application_context_name: Some(application_context_name.clone()),
                calling_ae_title: calling_ae_title.clone(),
                called_ae_title: called_ae_title.clone(),
                result: None,
                presentation_context_list: presentation_contexts.clone(),
                presentation_context_results: Vec::new(),
                user_information: user_variables.clone(),
            }),
            Pdu::AssociationAC(AssociationAC {
                protocol_version,
                called_ae_title,
                calling_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            }) => ServicePrimitive::AAssociate(AAssociate {
                protocol_version: *protocol_version,
                application_context_name: Some(application_context_name.clone()),
                calling_ae_title: calling_ae_title.clone(),
                called_ae_title: called_ae_title.clone(),
                result: Some(AssociateResult::Accepted),
                presentation_context_list: Vec::new(),
                presentation_context_results: presentation_contexts.clone(),
                user_information: user_variables.clone(),
            }),
            Pdu::AssociationRJ(AssociationRJ { result, source }) => {
                ServicePrimitive::AAssociate(AAssociate {
                    application_context_name: None,
                    result: Some(AssociateResult::Rejected {
                        result: *result,
                        source: *source,
                    }),
                    ..AAssociate::default()
                })
            }
            Pdu::PData { data } => ServicePrimitive::PData(PData { data: data.clone() }),
            Pdu::ReleaseRQ => ServicePrimitive::ARelease(ARelease { result: None }),
            Pdu::ReleaseRP => ServicePrimitive::ARelease(ARelease {
                result: Some(ReleaseResult::Affirmative),
            }),
            Pdu::AbortRQ { source } => match source {
                AbortRQSource::ServiceUser => ServicePrimitive::AAbort(AAbort {
                    source: AAbortSource::ServiceUser,
                }),
                AbortRQSource::Reserved => ServicePrimitive::AAbort(AAbort {
                    source: AAbortSource::Reserved,
                }),
                AbortRQSource::ServiceProvider(reason) => ServicePrimitive::APAbort(APAbort {
                    provider_reason: *reason,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{PDataValueType, PresentationContextResultReason};

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

    #[test]
    fn primitive_to_event_mapping() {
        let request = ServicePrimitive::from(echo_request());
        assert_eq!(request.event(), Event::AssociateRequest);

        let accept = ServicePrimitive::AAssociate(AAssociate {
            result: Some(AssociateResult::Accepted),
            ..echo_request()
        });
        assert_eq!(accept.event(), Event::AssociateResponseAccept);

        let reject = ServicePrimitive::AAssociate(AAssociate {
            result: Some(AssociateResult::Rejected {
                result: AssociationRJResult::Permanent,
                source: AssociationRJSource::ServiceUser(
                    crate::pdu::AssociationRJServiceUserReason::NoReasonGiven,
                ),
            }),
            ..echo_request()
        });
        assert_eq!(reject.event(), Event::AssociateResponseReject);

        let release_rq = ServicePrimitive::ARelease(ARelease { result: None });
        assert_eq!(release_rq.event(), Event::ReleaseRequest);

        let release_rp = ServicePrimitive::ARelease(ARelease {
            result: Some(ReleaseResult::Affirmative),
        });
        assert_eq!(release_rp.event(), Event::ReleaseResponse);

        let abort = ServicePrimitive::AAbort(AAbort::default());
        assert_eq!(abort.event(), Event::AbortRequest);

        let p_abort = ServicePrimitive::APAbort(APAbort {
            provider_reason: AbortRQServiceProviderReason::ReasonNotSpecified,
        });
        assert_eq!(p_abort.event(), Event::AbortRequest);

        let p_data = ServicePrimitive::PData(PData::default());
        assert_eq!(p_data.event(), Event::PDataRequest);
    }

    #[test]
    fn associate_request_round_trips_through_pdu() {
        let primitive = ServicePrimitive::from(echo_request());
        let pdu = primitive.to_pdu();
        assert!(matches!(pdu, Pdu::AssociationRQ(_)));
        assert_eq!(pdu.to_primitive(), primitive);
    }

    #[test]
    fn associate_response_becomes_ac_or_rj() {
        let accept = ServicePrimitive::AAssociate(AAssociate {
            result: Some(AssociateResult::Accepted),
            presentation_context_results: vec![PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: Some("1.2.840.10008.1.2".to_string()),
            }],
            ..echo_request()
        });
        assert!(matches!(accept.to_pdu(), Pdu::AssociationAC(_)));

        let reject = ServicePrimitive::AAssociate(AAssociate {
            result: Some(AssociateResult::Rejected {
                result: AssociationRJResult::Transient,
                source: AssociationRJSource::ServiceProviderPresentation(
                    crate::pdu::AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
                ),
            }),
            ..echo_request()
        });
        let pdu = reject.to_pdu();
        assert!(matches!(
            pdu,
            Pdu::AssociationRJ(AssociationRJ {
                result: AssociationRJResult::Transient,
                ..
            })
        ));
    }

    #[test]
    fn provider_abort_carries_reason() {
        let primitive = ServicePrimitive::APAbort(APAbort {
            provider_reason: AbortRQServiceProviderReason::UnexpectedPdu,
        });
        let pdu = primitive.to_pdu();
        assert_eq!(
            pdu,
            Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(
                    AbortRQServiceProviderReason::UnexpectedPdu
                ),
            }
        );
        // and back again
        assert_eq!(pdu.to_primitive(), primitive);
    }

    #[test]
    fn p_data_round_trips_through_pdu() {
        let primitive = ServicePrimitive::PData(PData {
            data: vec![PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0x03, 0x00, 0x00, 0x00, 0x00, 0x04],
            }],
        });
        let pdu = primitive.to_pdu();
        assert_eq!(pdu.to_primitive(), primitive);
    }
}
