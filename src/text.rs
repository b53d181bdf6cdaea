//! Text encoding support for PDU fields.
//!
//! The standard mandates ISO 646 (ASCII) for all text carried in PDUs,
//! but non-conformant implementations in the wild have been seen emitting
//! UTF-8. Decoding therefore goes through a configurable codec chain
//! (default: ASCII, then UTF-8), whereas encoding is always strict ASCII.
use encoding::all::{ASCII, UTF_8};
use encoding::{DecoderTrap, EncoderTrap, Encoding};
use snafu::{Backtrace, Snafu};
use std::borrow::Cow;

/// An error type for text encoding issues.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum EncodeTextError {
    /// A custom error message,
    /// for when the underlying error type does not encode error semantics
    /// into type variants.
    #[snafu(display("{}", message))]
    EncodeCustom {
        /// The error message in plain text.
        message: Cow<'static, str>,
        /// The generated backtrace, if available.
        backtrace: Backtrace,
    },
}

/// An error type for text decoding issues.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DecodeTextError {
    /// A custom error message,
    /// for when the underlying error type does not encode error semantics
    /// into type variants.
    #[snafu(display("{}", message))]
    DecodeCustom {
        /// The error message in plain text.
        message: Cow<'static, str>,
        /// The generated backtrace, if available.
        backtrace: Backtrace,
    },
}

type EncodeResult<T> = Result<T, EncodeTextError>;
type DecodeResult<T> = Result<T, DecodeTextError>;

/// A holder of encoding and decoding mechanisms for text in PDU fields.
pub trait TextCodec {
    /// Obtain the unique name of the text encoding.
    ///
    /// Should contain no leading or trailing spaces.
    /// This method may be useful for testing purposes, considering that
    /// `TextCodec` is often used as a trait object.
    fn name(&self) -> Cow<'static, str>;

    /// Decode the given byte buffer as a single string.
    fn decode(&self, text: &[u8]) -> DecodeResult<String>;

    /// Encode a text value into a byte vector.
    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>>;
}

impl<T: ?Sized> TextCodec for Box<T>
where
    T: TextCodec,
{
    fn name(&self) -> Cow<'static, str> {
        self.as_ref().name()
    }

    fn decode(&self, text: &[u8]) -> DecodeResult<String> {
        self.as_ref().decode(text)
    }

    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
        self.as_ref().encode(text)
    }
}

impl<'a, T: ?Sized> TextCodec for &'a T
where
    T: TextCodec,
{
    fn name(&self) -> Cow<'static, str> {
        (**self).name()
    }

    fn decode(&self, text: &[u8]) -> DecodeResult<String> {
        (**self).decode(text)
    }

    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
        (**self).encode(text)
    }
}

/// Create and implement a character set type using the `encoding` crate.
macro_rules! decl_character_set {
    ($typ: ident, $term: literal, $val: expr) => {
        #[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
        #[doc = "Data type for the "]
        #[doc = $term]
        #[doc = " character set encoding."]
        pub struct $typ;

        impl TextCodec for $typ {
            fn name(&self) -> Cow<'static, str> {
                Cow::Borrowed($term)
            }

            fn decode(&self, text: &[u8]) -> DecodeResult<String> {
                $val.decode(text, DecoderTrap::Strict)
                    .map_err(|message| DecodeCustomSnafu { message }.build())
            }

            fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
                $val.encode(text, EncoderTrap::Strict)
                    .map_err(|message| EncodeCustomSnafu { message }.build())
            }
        }
    };
}

decl_character_set!(AsciiCodec, "ascii", ASCII);
decl_character_set!(Utf8Codec, "utf-8", UTF_8);

/// The codecs which may take part in a PDU text decoding chain.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum PduCodec {
    /// ISO 646 (the only conformant choice)
    Ascii,
    /// UTF-8, as emitted by some non-conformant implementations
    Utf8,
}

impl TextCodec for PduCodec {
    fn name(&self) -> Cow<'static, str> {
        match self {
            PduCodec::Ascii => AsciiCodec.name(),
            PduCodec::Utf8 => Utf8Codec.name(),
        }
    }

    fn decode(&self, text: &[u8]) -> DecodeResult<String> {
        match self {
            PduCodec::Ascii => AsciiCodec.decode(text),
            PduCodec::Utf8 => Utf8Codec.decode(text),
        }
    }

    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
        match self {
            PduCodec::Ascii => AsciiCodec.encode(text),
            PduCodec::Utf8 => Utf8Codec.encode(text),
        }
    }
}

/// A chain of text codecs tried in order when decoding PDU fields.
///
/// Encoding does not go through the chain,
/// it is always performed with strict ASCII.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct TextCodecChain {
    codecs: Vec<PduCodec>,
}

impl Default for TextCodecChain {
    fn default() -> Self {
        TextCodecChain {
            codecs: vec![PduCodec::Ascii, PduCodec::Utf8],
        }
    }
}

impl TextCodecChain {
    /// Build a chain out of an explicit codec sequence.
    pub fn new(codecs: impl IntoIterator<Item = PduCodec>) -> Self {
        TextCodecChain {
            codecs: codecs.into_iter().collect(),
        }
    }

    /// Decode the given bytes with the first codec in the chain to succeed.
    pub fn decode(&self, text: &[u8]) -> DecodeResult<String> {
        let mut last_error = None;
        for codec in &self.codecs {
            match codec.decode(text) {
                Ok(out) => return Ok(out),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            DecodeCustomSnafu {
                message: "empty text codec chain",
            }
            .build()
        }))
    }

    /// Encode a text value with strict ASCII.
    pub fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
        AsciiCodec.encode(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_rejects_non_ascii() {
        assert!(AsciiCodec.decode(b"1.2.840.10008.1.1").is_ok());
        assert!(AsciiCodec.decode(&[0x31, 0xC3, 0xA9]).is_err());
        assert!(AsciiCodec.encode("caf\u{e9}").is_err());
    }

    #[test]
    fn chain_falls_back_to_utf8() {
        let chain = TextCodecChain::default();
        // "café" in UTF-8 is not valid ASCII but decodes via the fallback
        let decoded = chain.decode(&[0x63, 0x61, 0x66, 0xC3, 0xA9]).unwrap();
        assert_eq!(decoded, "caf\u{e9}");
    }

    #[test]
    fn chain_without_fallback_fails() {
        let chain = TextCodecChain::new([PduCodec::Ascii]);
        assert!(chain.decode(&[0x63, 0xC3, 0xA9]).is_err());
        assert_eq!(chain.decode(b"ECHOSCU").unwrap(), "ECHOSCU");
    }
}
