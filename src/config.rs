//! Engine configuration.
//!
//! A [`DulConfig`] is handed to the association reactor at construction time.
//! The defaults match common usage, so `DulConfig::default()` is
//! usually all that is needed.
use std::time::Duration;

use crate::pdu::reader::DEFAULT_MAX_PDU;
use crate::text::TextCodecChain;

/// Configuration for a DICOM Upper Layer association.
#[derive(Debug, Clone)]
pub struct DulConfig {
    /// Whether to fully validate UIDs against the PS3.5 component rules
    /// before encoding them.
    /// When disabled, only the maximum length is checked.
    pub enforce_uid_conformance: bool,
    /// Whether AE titles in DIMSE command elements are left unpadded.
    pub use_short_dimse_aet: bool,
    /// Whether AE titles in DIMSE command elements
    /// skip the 16 character length check.
    pub allow_long_dimse_aet: bool,
    /// The text codec chain used to decode PDU text fields.
    pub pdu_codecs: TextCodecChain,
    /// Whether to log identifier data sets in incoming requests.
    pub log_request_identifiers: bool,
    /// Whether to log identifier data sets in incoming responses.
    pub log_response_identifiers: bool,
    /// The maximum PDU length accepted from the peer.
    pub max_pdu_length: u32,
    /// Whether to reject incoming PDUs larger than `max_pdu_length`
    /// instead of accepting them with a warning.
    pub strict: bool,
    /// The ARTIM (association request/reject/release) timeout.
    pub artim_timeout: Duration,
}

impl Default for DulConfig {
    fn default() -> Self {
        DulConfig {
            enforce_uid_conformance: false,
            use_short_dimse_aet: true,
            allow_long_dimse_aet: false,
            pdu_codecs: TextCodecChain::default(),
            log_request_identifiers: true,
            log_response_identifiers: true,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            artim_timeout: Duration::from_secs(30),
        }
    }
}

impl DulConfig {
    /// Create a configuration with the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable strict UID conformance checks.
    pub fn enforce_uid_conformance(mut self, value: bool) -> Self {
        self.enforce_uid_conformance = value;
        self
    }

    /// Override the maximum PDU length accepted from the peer.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override the PDU text decoding chain.
    pub fn pdu_codecs(mut self, codecs: TextCodecChain) -> Self {
        self.pdu_codecs = codecs;
        self
    }

    /// Override the ARTIM timeout.
    pub fn artim_timeout(mut self, value: Duration) -> Self {
        self.artim_timeout = value;
        self
    }
}
