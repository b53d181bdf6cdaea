//! Application entity title handling.
//!
//! This module is the single source of truth for AE title rules:
//! PDU-layer titles are always encoded as exactly 16 bytes padded with
//! spaces, while DIMSE-layer titles may be left unpadded
//! (and, optionally, unchecked) depending on the engine configuration.
use snafu::{ensure, Backtrace, ResultExt, Snafu};

use crate::text::{DecodeTextError, TextCodecChain};

/// The length of an encoded application entity title field in bytes.
pub const AE_TITLE_LENGTH: usize = 16;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// AE titles must have at least one significant character
    #[snafu(display("AE title is empty or made of spaces only"))]
    EmptyTitle { backtrace: Backtrace },

    #[snafu(display("AE title has {} characters, maximum is 16", length))]
    TitleTooLong { length: usize, backtrace: Backtrace },

    #[snafu(display("AE title contains forbidden character {:?}", character))]
    ForbiddenCharacter {
        character: char,
        backtrace: Backtrace,
    },

    #[snafu(display("could not decode AE title field"))]
    DecodeTitle {
        #[snafu(backtrace)]
        source: DecodeTextError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Check an AE title for conformance and
/// return it without its non-significant characters.
///
/// Leading and trailing spaces are not significant,
/// and trailing nulls are tolerated
/// because some implementations pad AE titles with them.
/// Backslashes and control characters are forbidden,
/// as is a title without any significant character.
pub fn validate_ae_title(title: &str) -> Result<&str> {
    let title = title.trim_matches(' ');
    let title = title.trim_end_matches(['\0', '\r', '\t', '\n']);

    if let Some(character) = title.chars().find(|c| c.is_control() || *c == '\\') {
        return ForbiddenCharacterSnafu { character }.fail();
    }

    ensure!(!title.is_empty(), EmptyTitleSnafu);

    Ok(title)
}

/// Encode an AE title for a PDU field:
/// exactly 16 bytes, right-padded with spaces.
pub fn encode_ae_title(title: &str) -> Result<[u8; AE_TITLE_LENGTH]> {
    let title = validate_ae_title(title)?;
    ensure!(
        title.len() <= AE_TITLE_LENGTH,
        TitleTooLongSnafu { length: title.len() }
    );

    let mut out = [b' '; AE_TITLE_LENGTH];
    out[..title.len()].copy_from_slice(title.as_bytes());
    Ok(out)
}

/// Decode and validate an AE title from a PDU field.
pub fn decode_ae_title(field: &[u8], codecs: &TextCodecChain) -> Result<String> {
    let text = codecs.decode(field).context(DecodeTitleSnafu)?;
    validate_ae_title(&text).map(|title| title.to_string())
}

/// Decode an AE title from a reserved PDU field
/// (such as the AE title slots of an A-ASSOCIATE-AC),
/// whose value shall not be tested.
pub fn decode_ae_title_lenient(field: &[u8], codecs: &TextCodecChain) -> Result<String> {
    let text = codecs.decode(field).context(DecodeTitleSnafu)?;
    Ok(text.trim_matches(' ').trim_end_matches('\0').to_string())
}

/// Encode an AE title for a DIMSE command element.
///
/// With `use_short` the title is left unpadded,
/// otherwise it is padded with spaces up to 16 bytes.
/// With `allow_long` the length check is skipped
/// and oversized titles are passed through as-is.
pub fn encode_dimse_ae_title(title: &str, use_short: bool, allow_long: bool) -> Result<Vec<u8>> {
    let title = validate_ae_title(title)?;
    if !allow_long {
        ensure!(
            title.len() <= AE_TITLE_LENGTH,
            TitleTooLongSnafu { length: title.len() }
        );
    }

    let mut out = title.as_bytes().to_vec();
    if !use_short && out.len() < AE_TITLE_LENGTH {
        out.resize(AE_TITLE_LENGTH, b' ');
    }
    Ok(out)
}
