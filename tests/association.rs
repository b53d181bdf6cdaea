//! Full association lifecycle tests,
//! running a requestor and an acceptor provider
//! against each other over a local TCP connection.
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use dicom_dul::pdu::{
    PDataValue, PDataValueType, PresentationContextProposed, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};
use dicom_dul::primitive::{
    AAssociate, APAbort, ARelease, AssociateResult, PData, ReleaseResult, ServicePrimitive,
};
use dicom_dul::{DulConfig, DulServiceProvider, Role, State, TcpTransport};

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requestor = TcpStream::connect(addr).unwrap();
    let (acceptor, _) = listener.accept().unwrap();
    (requestor, acceptor)
}

fn spawn_pair() -> (DulServiceProvider, DulServiceProvider) {
    let (requestor_stream, acceptor_stream) = tcp_pair();
    let requestor = DulServiceProvider::spawn(
        Role::Requestor,
        TcpTransport::new(requestor_stream).unwrap(),
        DulConfig::default(),
    )
    .unwrap();
    let acceptor = DulServiceProvider::spawn(
        Role::Acceptor,
        TcpTransport::new(acceptor_stream).unwrap(),
        DulConfig::default(),
    )
    .unwrap();
    (requestor, acceptor)
}

fn verification_request() -> AAssociate {
    AAssociate {
        calling_ae_title: "ECHOSCU".to_string(),
        called_ae_title: "ANY-SCP".to_string(),
        presentation_context_list: vec![PresentationContextProposed {
            id: 1,
            abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
            transfer_syntaxes: vec![IMPLICIT_VR_LE.to_string()],
        }],
        user_information: vec![
            UserVariableItem::MaxLength(16382),
            UserVariableItem::ImplementationClassUID(
                dicom_dul::IMPLEMENTATION_CLASS_UID.to_string(),
            ),
        ],
        ..AAssociate::default()
    }
}

/// Negotiate an association between the two providers,
/// accepting the single proposed presentation context.
fn establish(requestor: &DulServiceProvider, acceptor: &DulServiceProvider) {
    requestor.send_pdu(verification_request());

    let indication = match acceptor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::AAssociate(indication)) => indication,
        other => panic!("expected an A-ASSOCIATE indication, got {:?}", other),
    };
    assert_eq!(indication.result, None);
    assert_eq!(indication.calling_ae_title, "ECHOSCU");
    assert_eq!(indication.called_ae_title, "ANY-SCP");

    acceptor.send_pdu(AAssociate {
        result: Some(AssociateResult::Accepted),
        presentation_context_results: vec![PresentationContextResult {
            id: 1,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: Some(IMPLICIT_VR_LE.to_string()),
        }],
        user_information: vec![UserVariableItem::MaxLength(16382)],
        ..indication
    });

    let confirmation = match requestor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::AAssociate(confirmation)) => confirmation,
        other => panic!("expected an A-ASSOCIATE confirmation, got {:?}", other),
    };
    assert_eq!(confirmation.result, Some(AssociateResult::Accepted));
    assert_eq!(
        confirmation.presentation_context_results,
        vec![PresentationContextResult {
            id: 1,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: Some(IMPLICIT_VR_LE.to_string()),
        }]
    );

    assert!(requestor.is_established());
    let mut attempts = 0;
    while !acceptor.is_established() {
        std::thread::sleep(Duration::from_millis(1));
        attempts += 1;
        assert!(attempts < 5000, "acceptor never became established");
    }
}

#[test]
fn association_data_transfer_and_release() {
    let (mut requestor, mut acceptor) = spawn_pair();

    establish(&requestor, &acceptor);

    // exchange one opaque command fragment in each direction
    requestor.send_pdu(PData {
        data: vec![PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Command,
            is_last: true,
            data: vec![0x42; 128],
        }],
    });
    match acceptor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::PData(PData { data })) => {
            assert_eq!(data.len(), 1);
            assert_eq!(data[0].presentation_context_id, 1);
            assert_eq!(data[0].value_type, PDataValueType::Command);
            assert!(data[0].is_last);
            assert_eq!(data[0].data, vec![0x42; 128]);
        }
        other => panic!("expected a P-DATA indication, got {:?}", other),
    }

    acceptor.send_pdu(PData {
        data: vec![PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Data,
            is_last: false,
            data: vec![0x01, 0x02, 0x03],
        }],
    });
    match requestor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::PData(PData { data })) => {
            assert_eq!(data[0].value_type, PDataValueType::Data);
            assert!(!data[0].is_last);
        }
        other => panic!("expected a P-DATA indication, got {:?}", other),
    }

    // orderly release, driven by the requestor
    requestor.send_pdu(ARelease { result: None });
    match acceptor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::ARelease(ARelease { result: None })) => {}
        other => panic!("expected an A-RELEASE indication, got {:?}", other),
    }
    acceptor.send_pdu(ARelease {
        result: Some(ReleaseResult::Affirmative),
    });
    match requestor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::ARelease(ARelease {
            result: Some(ReleaseResult::Affirmative),
        })) => {}
        other => panic!("expected an A-RELEASE confirmation, got {:?}", other),
    }

    let mut attempts = 0;
    while requestor.state() != State::Sta1 || acceptor.state() != State::Sta1 {
        std::thread::sleep(Duration::from_millis(1));
        attempts += 1;
        assert!(attempts < 10_000, "association never wound down");
    }
    assert!(requestor.is_released());
    assert!(acceptor.is_released());
    assert!(!requestor.is_aborted());

    assert!(requestor.stop_dul());
    assert!(acceptor.stop_dul());
}

#[test]
fn association_rejection_reaches_the_requestor() {
    let (requestor, acceptor) = spawn_pair();

    requestor.send_pdu(verification_request());
    let indication = match acceptor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::AAssociate(indication)) => indication,
        other => panic!("expected an A-ASSOCIATE indication, got {:?}", other),
    };

    acceptor.send_pdu(AAssociate {
        result: Some(AssociateResult::Rejected {
            result: dicom_dul::pdu::AssociationRJResult::Permanent,
            source: dicom_dul::pdu::AssociationRJSource::ServiceUser(
                dicom_dul::pdu::AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
        }),
        ..indication
    });

    match requestor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::AAssociate(confirmation)) => match confirmation.result {
            Some(AssociateResult::Rejected { result, source }) => {
                assert_eq!(result, dicom_dul::pdu::AssociationRJResult::Permanent);
                assert_eq!(
                    source,
                    dicom_dul::pdu::AssociationRJSource::ServiceUser(
                        dicom_dul::pdu::AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                    )
                );
            }
            other => panic!("expected a rejection, got {:?}", other),
        },
        other => panic!("expected an A-ASSOCIATE confirmation, got {:?}", other),
    }

    assert!(!requestor.is_established());
    let mut attempts = 0;
    while requestor.state() != State::Sta1 {
        std::thread::sleep(Duration::from_millis(1));
        attempts += 1;
        assert!(attempts < 10_000, "requestor never returned to idle");
    }
}

#[test]
fn user_abort_is_indicated_to_the_peer() {
    let (requestor, acceptor) = spawn_pair();
    establish(&requestor, &acceptor);

    requestor.send_pdu(dicom_dul::AAbort::default());

    match acceptor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::AAbort(_)) => {}
        other => panic!("expected an A-ABORT indication, got {:?}", other),
    }
    assert!(acceptor.is_aborted());

    let mut attempts = 0;
    while !requestor.is_aborted() || requestor.state() != State::Sta1 {
        std::thread::sleep(Duration::from_millis(1));
        attempts += 1;
        assert!(attempts < 10_000, "requestor never aborted");
    }
}

#[test]
fn garbage_from_the_peer_aborts_the_association() {
    let (requestor_stream, mut raw_peer) = tcp_pair();
    let requestor = DulServiceProvider::spawn(
        Role::Requestor,
        TcpTransport::new(requestor_stream).unwrap(),
        DulConfig::default(),
    )
    .unwrap();

    requestor.send_pdu(verification_request());

    // the "server" side consumes the association request
    // and answers with an invalid PDU type
    use std::io::Read;
    let mut sink = [0u8; 209];
    raw_peer.read_exact(&mut sink).unwrap();
    raw_peer
        .write_all(&[0x08, 0x00, 0x00, 0x00, 0x00, 0x00])
        .unwrap();

    // the requestor aborts the association and tells the user
    match requestor.receive_pdu(true, TIMEOUT) {
        Some(ServicePrimitive::APAbort(APAbort { provider_reason })) => {
            assert_eq!(
                provider_reason,
                dicom_dul::pdu::AbortRQServiceProviderReason::ReasonNotSpecified
            );
        }
        other => panic!("expected an A-P-ABORT indication, got {:?}", other),
    }
    assert!(requestor.is_aborted());

    // an A-ABORT PDU with the provider source arrives on the wire
    let mut abort = [0u8; 10];
    raw_peer.read_exact(&mut abort).unwrap();
    assert_eq!(
        abort,
        [0x07, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x02, 0x00]
    );
}

#[test]
fn peek_does_not_consume_the_primitive() {
    let (requestor, acceptor) = spawn_pair();

    requestor.send_pdu(verification_request());

    let mut attempts = 0;
    while acceptor.peek_next_pdu().is_none() {
        std::thread::sleep(Duration::from_millis(1));
        attempts += 1;
        assert!(attempts < 10_000, "indication never arrived");
    }

    let peeked = acceptor.peek_next_pdu().unwrap();
    let received = acceptor.receive_pdu(false, None).unwrap();
    assert_eq!(peeked, received);
    assert!(acceptor.peek_next_pdu().is_none());
    assert_eq!(acceptor.receive_pdu(false, None), None);
}
