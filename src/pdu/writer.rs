//! PDU writer module
use crate::aet;
use crate::pdu::*;
use crate::text::{AsciiCodec, EncodeTextError, TextCodec};
use crate::uid;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not write PDU field `{}`", field))]
    WriteField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not write {} reserved bytes", bytes))]
    WriteReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not encode text field `{}`", field))]
    EncodeField {
        field: &'static str,
        #[snafu(backtrace)]
        source: EncodeTextError,
    },

    #[snafu(display("Invalid AE title field `{}`", field))]
    InvalidAeTitle {
        field: &'static str,
        #[snafu(backtrace)]
        source: aet::Error,
    },

    #[snafu(display("Invalid UID in field `{}`", field))]
    InvalidUid {
        field: &'static str,
        #[snafu(backtrace)]
        source: uid::Error,
    },

    #[snafu(display(
        "Invalid presentation context ID {} (must be an odd integer between 1 and 255)",
        id
    ))]
    InvalidPresentationContextId { id: u8, backtrace: Backtrace },

    #[snafu(display("Could not write chunk `{}`", name))]
    WriteChunk {
        name: &'static str,
        #[snafu(backtrace)]
        source: WriteChunkError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum WriteChunkError {
    #[snafu(display("Failed to build chunk"))]
    BuildChunk {
        #[snafu(backtrace)]
        source: Box<Error>,
    },
    #[snafu(display("Failed to write chunk length"))]
    WriteLength {
        backtrace: Backtrace,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write chunk data"))]
    WriteData {
        backtrace: Backtrace,
        source: std::io::Error,
    },
}

fn write_chunk_u32<F>(writer: &mut dyn Write, func: F) -> std::result::Result<(), WriteChunkError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data).map_err(Box::from).context(BuildChunkSnafu)?;

    let length = data.len() as u32;
    writer
        .write_u32::<BigEndian>(length)
        .context(WriteLengthSnafu)?;

    writer.write_all(&data).context(WriteDataSnafu)?;

    Ok(())
}

fn write_chunk_u16<F>(writer: &mut dyn Write, func: F) -> std::result::Result<(), WriteChunkError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data).map_err(Box::from).context(BuildChunkSnafu)?;

    let length = data.len() as u16;
    writer
        .write_u16::<BigEndian>(length)
        .context(WriteLengthSnafu)?;

    writer.write_all(&data).context(WriteDataSnafu)?;

    Ok(())
}

/// Options guiding PDU encoding.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct WriteOptions {
    /// Whether UIDs are validated against the full PS3.5 component rules
    /// instead of just the maximum length.
    pub enforce_uid_conformance: bool,
}

/// Write a PDU into the given destination with the default options.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    write_pdu_with_options(writer, pdu, WriteOptions::default())
}

/// Write a PDU into the given destination.
///
/// Text fields are always encoded in strict ASCII.
pub fn write_pdu_with_options<W>(writer: &mut W, pdu: &Pdu, options: WriteOptions) -> Result<()>
where
    W: Write,
{
    match pdu {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            // A-ASSOCIATE-RQ PDU Structure

            // 1 - PDU-type - 01H
            writer
                .write_u8(0x01)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not
            // tested to this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7-8 - Protocol-version - This two byte field shall use one bit to identify
                // each version of the DICOM UL protocol supported by the calling end-system.
                // This is Version 1 and shall be identified with bit 0 set.
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WriteFieldSnafu {
                        field: "Protocol-version",
                    })?;

                // 9-10 - Reserved - This reserved field shall be sent with a value 0000H but
                // not tested to this value when received.
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;

                // 11-26 - Called-AE-title - Destination DICOM Application Name. It shall be
                // encoded as 16 characters as defined by the ISO 646:1990-Basic G0 Set with
                // leading and trailing spaces (20H) being non-significant. The value made of 16
                // spaces (20H) meaning "no Application Name specified" shall not be used.
                let ae_title_bytes = aet::encode_ae_title(called_ae_title).context(
                    InvalidAeTitleSnafu {
                        field: "Called-AE-title",
                    },
                )?;
                writer.write_all(&ae_title_bytes).context(WriteFieldSnafu {
                    field: "Called-AE-title",
                })?;

                // 27-42 - Calling-AE-title - Source DICOM Application Name, encoded like the
                // called AE title above.
                let ae_title_bytes = aet::encode_ae_title(calling_ae_title).context(
                    InvalidAeTitleSnafu {
                        field: "Calling-AE-title",
                    },
                )?;
                writer.write_all(&ae_title_bytes).context(WriteFieldSnafu {
                    field: "Calling-AE-title",
                })?;

                // 43-74 - Reserved - This reserved field shall be sent with a value 00H for all
                // bytes but not tested to this value when received
                writer
                    .write_all(&[0; 32])
                    .context(WriteReservedSnafu { bytes: 32_u32 })?;

                // 75-xxx - Variable items - This variable field shall contain the following items:
                // one Application Context Item, one or more Presentation Context Items and one
                // User Information Item.
                write_pdu_variable_application_context_name(
                    writer,
                    application_context_name,
                    options,
                )?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_proposed(
                        writer,
                        presentation_context,
                        options,
                    )?;
                }

                write_pdu_variable_user_variables(writer, user_variables, options)?;

                Ok(())
            })
            .context(WriteChunkSnafu {
                name: "A-ASSOCIATE-RQ",
            })?;

            Ok(())
        }
        Pdu::AssociationAC(AssociationAC {
            protocol_version,
            application_context_name,
            called_ae_title,
            calling_ae_title,
            presentation_contexts,
            user_variables,
        }) => {
            // A-ASSOCIATE-AC PDU Structure

            // 1 - PDU-type - 02H
            writer
                .write_u8(0x02)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to
            // this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7-8 - Protocol-version
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WriteFieldSnafu {
                        field: "Protocol-version",
                    })?;

                // 9-10 - Reserved - This reserved field shall be sent with a value 0000H but not
                // tested to this value when received.
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WriteReservedSnafu { bytes: 2_u32 })?;

                // 11-26 - Reserved - This reserved field shall be sent with a value identical to
                // the value received in the same field of the A-ASSOCIATE-RQ PDU, but its value
                // shall not be tested when received. The field is echoed without validation.
                write_reserved_ae_title(writer, called_ae_title, "Called-AE-title")?;

                // 27-42 - Reserved - This reserved field shall be sent with a value identical to
                // the value received in the same field of the A-ASSOCIATE-RQ PDU, but its value
                // shall not be tested when received.
                write_reserved_ae_title(writer, calling_ae_title, "Calling-AE-title")?;

                // 43-74 - Reserved - This reserved field shall be sent with a value identical to
                // the value received in the same field of the A-ASSOCIATE-RQ PDU, but its value
                // shall not be tested when received.
                writer
                    .write_all(&[0; 32])
                    .context(WriteReservedSnafu { bytes: 32_u32 })?;

                // 75-xxx - Variable items - This variable field shall contain the following items:
                // one Application Context Item, one or more Presentation Context Item(s) and one
                // User Information Item.
                write_pdu_variable_application_context_name(
                    writer,
                    application_context_name,
                    options,
                )?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_result(
                        writer,
                        presentation_context,
                        options,
                    )?;
                }

                write_pdu_variable_user_variables(writer, user_variables, options)?;

                Ok(())
            })
            .context(WriteChunkSnafu {
                name: "A-ASSOCIATE-AC",
            })
        }
        Pdu::AssociationRJ(AssociationRJ { result, source }) => {
            // 1 - PDU-type - 03H
            writer
                .write_u8(0x03)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to
            // this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7 - Reserved - This reserved field shall be sent with a value 00H but not tested
                // to this value when received.
                writer
                    .write_u8(0x00)
                    .context(WriteReservedSnafu { bytes: 1_u32 })?;

                // 8 - Result - This Result field shall contain an integer value encoded as an
                // unsigned binary number. One of the following values shall be used:
                // - 1 - rejected-permanent
                // - 2 - rejected-transient
                writer.write_u8(result.to_u8()).context(WriteFieldSnafu {
                    field: "Result",
                })?;

                // 9 - Source - This Source field shall contain an integer value encoded as an
                // unsigned binary number. One of the following values shall be used:
                // - 1 - DICOM UL service-user
                // - 2 - DICOM UL service-provider (ACSE related function)
                // - 3 - DICOM UL service-provider (Presentation related function)
                // 10 - Reason/Diag - This field shall contain an integer value encoded as an
                // unsigned binary number, enumerated per source as defined in Section 9.3.4.
                let (source, reason) = source.to_words();
                writer.write_u8(source).context(WriteFieldSnafu {
                    field: "Source",
                })?;
                writer.write_u8(reason).context(WriteFieldSnafu {
                    field: "Reason/Diag.",
                })?;

                Ok(())
            })
            .context(WriteChunkSnafu {
                name: "AssociationRJ",
            })?;

            Ok(())
        }
        Pdu::PData { data } => {
            // 1 - PDU-type - 04H
            writer
                .write_u8(0x04)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to
            // this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7-xxx - Presentation-data-value Item(s) - This variable data field shall contain
                // one or more Presentation-data-value Items(s). For a complete description of the
                // use of this field see Section 9.3.5.1

                for presentation_data_value in data {
                    write_chunk_u32(writer, |writer| {
                        // 5 - Presentation-context-ID - Presentation-context-ID values shall be odd
                        // integers between 1 and 255, encoded as an unsigned binary number.
                        writer.push(presentation_data_value.presentation_context_id);

                        // 6-xxx - Presentation-data-value - This Presentation-data-value field
                        // shall contain DICOM message information (command and/or data set) with a
                        // message control header.

                        // The Message Control Header is one byte:
                        // bit 0 set means the fragment contains command information,
                        // bit 1 set means the fragment is the last of the message,
                        // bits 2-7 are always zero.
                        let mut message_header = 0x00;
                        if let PDataValueType::Command = presentation_data_value.value_type {
                            message_header |= 0x01;
                        }
                        if presentation_data_value.is_last {
                            message_header |= 0x02;
                        }
                        writer.push(message_header);

                        // Message fragment
                        writer.extend(&presentation_data_value.data);

                        Ok(())
                    })
                    .context(WriteChunkSnafu {
                        name: "Presentation-data-value item",
                    })?;
                }

                Ok(())
            })
            .context(WriteChunkSnafu { name: "PData" })
        }
        Pdu::ReleaseRQ => {
            // 1 - PDU-type - 05H
            writer
                .write_u8(0x05)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to
            // this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7-10 - Reserved - This reserved field shall be sent with a value 00000000H but
                // not tested to this value when received.
                writer.extend([0u8; 4]);
                Ok(())
            })
            .context(WriteChunkSnafu { name: "ReleaseRQ" })?;

            Ok(())
        }
        Pdu::ReleaseRP => {
            // 1 - PDU-type - 06H
            writer
                .write_u8(0x06)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to
            // this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7-10 - Reserved - This reserved field shall be sent with a value 00000000H but
                // not tested to this value when received.
                writer.extend([0u8; 4]);
                Ok(())
            })
            .context(WriteChunkSnafu { name: "ReleaseRP" })?;

            Ok(())
        }
        Pdu::AbortRQ { source } => {
            // 1 - PDU-type - 07H
            writer
                .write_u8(0x07)
                .context(WriteFieldSnafu { field: "PDU-type" })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to
            // this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u32(writer, |writer| {
                // 7 - Reserved - This reserved field shall be sent with a value 00H but not tested
                // to this value when received.
                writer.push(0);
                // 8 - Reserved - This reserved field shall be sent with a value 00H but not tested
                // to this value when received.
                writer.push(0);

                // 9 - Source - This Source field shall contain an integer value encoded as an
                // unsigned binary number. One of the following values shall be used:
                // - 0 - DICOM UL service-user (initiated abort)
                // - 1 - reserved
                // - 2 - DICOM UL service-provider (initiated abort)
                // 10 - Reason/Diag - Only significant when the source is the service-provider;
                // sent as 00H otherwise but not tested to this value when received.
                let (source, reason) = source.to_words();
                writer.push(source);
                writer.push(reason);

                Ok(())
            })
            .context(WriteChunkSnafu { name: "AbortRQ" })?;

            Ok(())
        }
    }
}

/// Write the 16-byte reserved AE title slot of an A-ASSOCIATE-AC,
/// echoing the received value without testing it.
fn write_reserved_ae_title(
    writer: &mut dyn Write,
    ae_title: &str,
    field: &'static str,
) -> Result<()> {
    let mut ae_title_bytes = AsciiCodec
        .encode(ae_title)
        .context(EncodeFieldSnafu { field })?;
    ae_title_bytes.resize(aet::AE_TITLE_LENGTH, b' ');
    writer.write_all(&ae_title_bytes).context(WriteFieldSnafu { field })
}

/// Validate and encode a UID field value.
fn encode_uid(value: &str, options: WriteOptions, field: &'static str) -> Result<Vec<u8>> {
    uid::validate_uid(value, options.enforce_uid_conformance)
        .context(InvalidUidSnafu { field })?;
    AsciiCodec.encode(value).context(EncodeFieldSnafu { field })
}

fn write_pdu_variable_application_context_name(
    writer: &mut dyn Write,
    application_context_name: &str,
    options: WriteOptions,
) -> Result<()> {
    // Application Context Item Structure
    // 1 - Item-type - 10H
    writer
        .write_u8(0x10)
        .context(WriteFieldSnafu { field: "Item-type" })?;

    // 2 - Reserved - This reserved field shall be sent with a value 00H but not
    // tested to this value when received.
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        // 5-xxx - Application-context-name - A valid Application-context-name shall
        // be encoded as defined in Annex F. Application-context-names are structured
        // as UIDs as defined in PS3.5 and registered in PS3.7.
        let bytes = encode_uid(
            application_context_name,
            options,
            "Application-context-name",
        )?;
        writer.write_all(&bytes).context(WriteFieldSnafu {
            field: "Application-context-name",
        })
    })
    .context(WriteChunkSnafu {
        name: "Application Context Item",
    })?;

    Ok(())
}

fn write_pdu_variable_presentation_context_proposed(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextProposed,
    options: WriteOptions,
) -> Result<()> {
    ensure!(
        presentation_context.id % 2 == 1,
        InvalidPresentationContextIdSnafu {
            id: presentation_context.id
        }
    );

    // Presentation Context Item Structure
    // 1 - Item-type - 20H
    writer
        .write_u8(0x20)
        .context(WriteFieldSnafu { field: "Item-type" })?;

    // 2 - Reserved - This reserved field shall be sent with a value 00H but not
    // tested to this value when received.
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        // 5 - Presentation-context-ID - Presentation-context-ID values shall be
        // odd integers between 1 and 255, encoded as an unsigned binary number.
        writer
            .write_u8(presentation_context.id)
            .context(WriteFieldSnafu {
                field: "Presentation-context-ID",
            })?;

        // 6-8 - Reserved - These reserved fields shall be sent with a value 00H but
        // not tested to this value when received.
        writer
            .write_all(&[0; 3])
            .context(WriteReservedSnafu { bytes: 3_u32 })?;

        // 9-xxx - Abstract/Transfer Syntax Sub-Items - This variable field
        // shall contain the following sub-items: one Abstract Syntax and one or
        // more Transfer Syntax(es).

        // Abstract Syntax Sub-Item Structure
        // 1 - Item-type - 30H
        writer
            .write_u8(0x30)
            .context(WriteFieldSnafu { field: "Item-type" })?;

        // 2 - Reserved - This reserved field shall be sent with a value 00H
        // but not tested to this value when received.
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        write_chunk_u16(writer, |writer| {
            // 5-xxx - Abstract-syntax-name - This variable field shall contain
            // the Abstract-syntax-name related to the proposed presentation
            // context. Abstract-syntax-names are structured as UIDs as defined
            // in PS3.5 and registered in PS3.4.
            let bytes = encode_uid(
                &presentation_context.abstract_syntax,
                options,
                "Abstract-syntax-name",
            )?;
            writer.write_all(&bytes).context(WriteFieldSnafu {
                field: "Abstract-syntax-name",
            })
        })
        .context(WriteChunkSnafu {
            name: "Abstract Syntax Item",
        })?;

        for transfer_syntax in &presentation_context.transfer_syntaxes {
            // Transfer Syntax Sub-Item Structure
            // 1 - Item-type - 40H
            writer.write_u8(0x40).context(WriteFieldSnafu {
                field: "Item-type",
            })?;

            // 2 - Reserved - This reserved field shall be sent with a value 00H
            // but not tested to this value when received.
            writer
                .write_u8(0x00)
                .context(WriteReservedSnafu { bytes: 1_u32 })?;

            write_chunk_u16(writer, |writer| {
                // 5-xxx - Transfer-syntax-name(s) - This variable field shall
                // contain the Transfer-syntax-name proposed for this
                // presentation context. Transfer-syntax-names are structured as
                // UIDs as defined in PS3.5 and registered in PS3.5.
                let bytes = encode_uid(transfer_syntax, options, "Transfer-syntax-name")?;
                writer.write_all(&bytes).context(WriteFieldSnafu {
                    field: "Transfer-syntax-name",
                })
            })
            .context(WriteChunkSnafu {
                name: "Transfer Syntax Sub-Item",
            })?;
        }

        Ok(())
    })
    .context(WriteChunkSnafu {
        name: "Presentation Context Item",
    })?;

    Ok(())
}

fn write_pdu_variable_presentation_context_result(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextResult,
    options: WriteOptions,
) -> Result<()> {
    ensure!(
        presentation_context.id % 2 == 1,
        InvalidPresentationContextIdSnafu {
            id: presentation_context.id
        }
    );

    // 1 - Item-type - 21H
    writer
        .write_u8(0x21)
        .context(WriteFieldSnafu { field: "Item-type" })?;

    // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to this
    // value when received.
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        // 5 - Presentation-context-ID - Presentation-context-ID values shall be odd integers
        // between 1 and 255, encoded as an unsigned binary number.
        writer
            .write_u8(presentation_context.id)
            .context(WriteFieldSnafu {
                field: "Presentation-context-ID",
            })?;

        // 6 - Reserved - This reserved field shall be sent with a value 00H but not tested to this
        // value when received.
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        // 7 - Result/Reason - This Result/Reason field shall contain an integer value encoded as an
        // unsigned binary number. One of the following values shall be used:
        //   0 - acceptance
        //   1 - user-rejection
        //   2 - no-reason (provider rejection)
        //   3 - abstract-syntax-not-supported (provider rejection)
        //   4 - transfer-syntaxes-not-supported (provider rejection)
        writer
            .write_u8(presentation_context.reason.to_u8())
            .context(WriteFieldSnafu {
                field: "Result/Reason",
            })?;

        // 8 - Reserved - This reserved field shall be sent with a value 00H but not tested to this
        // value when received.
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        // 9-xxx - Transfer syntax sub-item - This variable field shall contain one Transfer Syntax
        // Sub-Item. When the Result/Reason field has a value other than acceptance (0), this field
        // shall not be significant and its value shall not be tested when received. A rejected
        // context may carry an empty sub-item body.

        // 1 - Item-type - 40H
        writer
            .write_u8(0x40)
            .context(WriteFieldSnafu { field: "Item-type" })?;

        // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to this
        // value when received.
        writer
            .write_u8(0x00)
            .context(WriteReservedSnafu { bytes: 1_u32 })?;

        write_chunk_u16(writer, |writer| {
            // 5-xxx - Transfer-syntax-name - This variable field shall contain the
            // Transfer-syntax-name accepted for this presentation context.
            if let Some(transfer_syntax) = &presentation_context.transfer_syntax {
                let bytes = encode_uid(transfer_syntax, options, "Transfer-syntax-name")?;
                writer.write_all(&bytes).context(WriteFieldSnafu {
                    field: "Transfer-syntax-name",
                })?;
            }

            Ok(())
        })
        .context(WriteChunkSnafu {
            name: "Transfer Syntax sub-item",
        })?;

        Ok(())
    })
    .context(WriteChunkSnafu {
        name: "Presentation-context",
    })
}

fn write_pdu_variable_user_variables(
    writer: &mut dyn Write,
    user_variables: &[UserVariableItem],
    options: WriteOptions,
) -> Result<()> {
    if user_variables.is_empty() {
        return Ok(());
    }

    // 1 - Item-type - 50H
    writer
        .write_u8(0x50)
        .context(WriteFieldSnafu { field: "Item-type" })?;

    // 2 - Reserved - This reserved field shall be sent with a value 00H but not tested to this
    // value when received.
    writer
        .write_u8(0x00)
        .context(WriteReservedSnafu { bytes: 1_u32 })?;

    write_chunk_u16(writer, |writer| {
        // 5-xxx - User-data - This variable field shall contain User-data sub-items as defined by
        // the DICOM Application Entity. The structure and content of these sub-items is defined in
        // Annex D.
        for user_variable in user_variables {
            match user_variable {
                UserVariableItem::MaxLength(max_length) => {
                    // 1 - Item-type - 51H
                    writer
                        .write_u8(0x51)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-8 - Maximum-length-received - This parameter allows the
                        // association-requestor to restrict the maximum length of the variable
                        // field of the P-DATA-TF PDUs sent by the acceptor on the association once
                        // established. The value of (0) indicates that no maximum length is
                        // specified.
                        writer
                            .write_u32::<BigEndian>(*max_length)
                            .context(WriteFieldSnafu {
                                field: "Maximum-length-received",
                            })
                    })
                    .context(WriteChunkSnafu {
                        name: "Maximum-length-received",
                    })?;
                }
                UserVariableItem::ImplementationClassUID(implementation_class_uid) => {
                    // 1 - Item-type - 52H
                    writer
                        .write_u8(0x52)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-xxx - Implementation-class-uid - This variable field shall contain
                        // the Implementation-class-uid of the Association-acceptor as defined in
                        // Section D.3.3.2. The Implementation-class-uid field is structured as a
                        // UID as defined in PS3.5.
                        let bytes = encode_uid(
                            implementation_class_uid,
                            options,
                            "Implementation-class-uid",
                        )?;
                        writer.write_all(&bytes).context(WriteFieldSnafu {
                            field: "Implementation-class-uid",
                        })
                    })
                    .context(WriteChunkSnafu {
                        name: "Implementation-class-uid",
                    })?;
                }
                UserVariableItem::ImplementationVersionName(implementation_version_name) => {
                    // 1 - Item-type - 55H
                    writer
                        .write_u8(0x55)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-xxx - Implementation-version-name - This variable field shall contain
                        // the Implementation-version-name of the Association-acceptor as defined in
                        // Section D.3.3.2. It shall be encoded as a string of 1 to 16 ISO 646:1990
                        // (basic G0 set) characters.
                        writer
                            .write_all(&AsciiCodec.encode(implementation_version_name).context(
                                EncodeFieldSnafu {
                                    field: "Implementation-version-name",
                                },
                            )?)
                            .context(WriteFieldSnafu {
                                field: "Implementation-version-name",
                            })
                    })
                    .context(WriteChunkSnafu {
                        name: "Implementation-version-name",
                    })?;
                }
                UserVariableItem::AsyncOperationsWindow(max_ops_invoked, max_ops_performed) => {
                    // 1 - Item-type - 53H
                    writer
                        .write_u8(0x53)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-6 - Maximum-number-operations-invoked
                        writer
                            .write_u16::<BigEndian>(*max_ops_invoked)
                            .context(WriteFieldSnafu {
                                field: "Maximum-number-operations-invoked",
                            })?;
                        // 7-8 - Maximum-number-operations-performed
                        writer
                            .write_u16::<BigEndian>(*max_ops_performed)
                            .context(WriteFieldSnafu {
                                field: "Maximum-number-operations-performed",
                            })
                    })
                    .context(WriteChunkSnafu {
                        name: "Asynchronous-operations-window",
                    })?;
                }
                UserVariableItem::RoleSelection(role_selection) => {
                    // 1 - Item-type - 54H
                    writer
                        .write_u8(0x54)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-6 - UID-length
                        write_chunk_u16(writer, |writer| {
                            // 7-xxx - SOP-class-uid - Unlike the other UID fields of this PDU,
                            // this one is encoded per PS3.5 Section 9.1: a trailing null is
                            // appended when the UID is of odd length, and the length field
                            // accounts for it.
                            let mut bytes = encode_uid(
                                &role_selection.sop_class_uid,
                                options,
                                "SOP-class-uid",
                            )?;
                            if bytes.len() % 2 == 1 {
                                bytes.push(0x00);
                            }
                            writer.write_all(&bytes).context(WriteFieldSnafu {
                                field: "SOP-class-uid",
                            })
                        })
                        .context(WriteChunkSnafu {
                            name: "SOP-class-uid",
                        })?;

                        // SCU-role and SCP-role, one byte each
                        writer
                            .write_u8(role_selection.scu_role as u8)
                            .context(WriteFieldSnafu { field: "SCU-role" })?;
                        writer
                            .write_u8(role_selection.scp_role as u8)
                            .context(WriteFieldSnafu { field: "SCP-role" })
                    })
                    .context(WriteChunkSnafu {
                        name: "SCP/SCU role selection",
                    })?;
                }
                UserVariableItem::SopClassExtendedNegotiationSubItem(sop_class_uid, data) => {
                    // 1 - Item-type - 56H
                    writer
                        .write_u8(0x56)
                        .context(WriteFieldSnafu { field: "Item-type" })?;
                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-6 - SOP-class-uid-length
                        write_chunk_u16(writer, |writer| {
                            // 7-xxx - The SOP Class or Meta SOP Class identifier encoded as a UID
                            // as defined in Section 9 "Unique Identifiers (UIDs)" in PS3.5.
                            let bytes = encode_uid(sop_class_uid, options, "SOP-class-uid")?;
                            writer.write_all(&bytes).context(WriteFieldSnafu {
                                field: "SOP-class-uid",
                            })
                        })
                        .context(WriteChunkSnafu {
                            name: "SOP-class-uid",
                        })?;

                        // xxx-xxx - Service-class-application-information - This field shall
                        // contain the application information specific to the Service Class
                        // specification identified by the SOP-class-uid. It runs to the end
                        // of the sub-item, without a length prefix of its own.
                        writer.write_all(data).context(WriteFieldSnafu {
                            field: "Service-class-application-information",
                        })
                    })
                    .context(WriteChunkSnafu {
                        name: "SOP class extended negotiation",
                    })?;
                }
                UserVariableItem::SopClassCommonExtendedNegotiationSubItem(negotiation) => {
                    // 1 - Item-type - 57H
                    writer
                        .write_u8(0x57)
                        .context(WriteFieldSnafu { field: "Item-type" })?;
                    // 2 - Sub-item-version - 00H
                    writer
                        .write_u8(0x00)
                        .context(WriteFieldSnafu {
                            field: "Sub-item-version",
                        })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-6 - SOP-class-uid-length
                        write_chunk_u16(writer, |writer| {
                            let bytes =
                                encode_uid(&negotiation.sop_class_uid, options, "SOP-class-uid")?;
                            writer.write_all(&bytes).context(WriteFieldSnafu {
                                field: "SOP-class-uid",
                            })
                        })
                        .context(WriteChunkSnafu {
                            name: "SOP-class-uid",
                        })?;

                        // xxx - Service-class-uid-length, then the service class UID
                        write_chunk_u16(writer, |writer| {
                            let bytes = encode_uid(
                                &negotiation.service_class_uid,
                                options,
                                "Service-class-uid",
                            )?;
                            writer.write_all(&bytes).context(WriteFieldSnafu {
                                field: "Service-class-uid",
                            })
                        })
                        .context(WriteChunkSnafu {
                            name: "Service-class-uid",
                        })?;

                        // xxx - Related-general-sop-class-identification-length, then zero or
                        // more (UID-length, UID) entries
                        write_chunk_u16(writer, |writer| {
                            for related in &negotiation.related_general_sop_classes {
                                write_chunk_u16(writer, |writer| {
                                    let bytes = encode_uid(
                                        related,
                                        options,
                                        "Related-general-sop-class-uid",
                                    )?;
                                    writer.write_all(&bytes).context(WriteFieldSnafu {
                                        field: "Related-general-sop-class-uid",
                                    })
                                })
                                .context(WriteChunkSnafu {
                                    name: "Related-general-sop-class-uid",
                                })?;
                            }
                            Ok(())
                        })
                        .context(WriteChunkSnafu {
                            name: "Related-general-sop-class-identification",
                        })
                    })
                    .context(WriteChunkSnafu {
                        name: "SOP class common extended negotiation",
                    })?;
                }
                UserVariableItem::UserIdentityItem(user_identity) => {
                    // 1 - Item-type - 58H
                    writer
                        .write_u8(0x58)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    // 3-4 - Item-length
                    write_chunk_u16(writer, |writer| {
                        // 5 - User-Identity-Type
                        writer
                            .write_u8(user_identity.identity_type().to_u8())
                            .context(WriteFieldSnafu {
                                field: "User-Identity-Type",
                            })?;

                        // 6 - Positive-response-requested
                        writer
                            .write_u8(user_identity.positive_response_requested() as u8)
                            .context(WriteFieldSnafu {
                                field: "Positive-response-requested",
                            })?;

                        // 7-8 - Primary-field-length
                        write_chunk_u16(writer, |writer| {
                            // 9-n - Primary-field
                            writer
                                .write_all(user_identity.primary_field())
                                .context(WriteFieldSnafu {
                                    field: "Primary-field",
                                })
                        })
                        .context(WriteChunkSnafu {
                            name: "Primary-field",
                        })?;

                        // n+1-n+2 - Secondary-field-length
                        write_chunk_u16(writer, |writer| {
                            // n+3-m - Secondary-field
                            writer
                                .write_all(user_identity.secondary_field())
                                .context(WriteFieldSnafu {
                                    field: "Secondary-field",
                                })
                        })
                        .context(WriteChunkSnafu {
                            name: "Secondary-field",
                        })
                    })
                    .context(WriteChunkSnafu {
                        name: "User identity",
                    })?;
                }
                UserVariableItem::UserIdentityResponse(server_response) => {
                    // 1 - Item-type - 59H
                    writer
                        .write_u8(0x59)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    // 2 - Reserved
                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        // 5-6 - Server-response-length
                        write_chunk_u16(writer, |writer| {
                            // 7-n - Server-response
                            writer.write_all(server_response).context(WriteFieldSnafu {
                                field: "Server-response",
                            })
                        })
                        .context(WriteChunkSnafu {
                            name: "Server-response",
                        })
                    })
                    .context(WriteChunkSnafu {
                        name: "User identity response",
                    })?;
                }
                UserVariableItem::Unknown(item_type, data) => {
                    writer
                        .write_u8(*item_type)
                        .context(WriteFieldSnafu { field: "Item-type" })?;

                    writer
                        .write_u8(0x00)
                        .context(WriteReservedSnafu { bytes: 1_u32 })?;

                    write_chunk_u16(writer, |writer| {
                        writer.write_all(data).context(WriteFieldSnafu {
                            field: "Unknown Data",
                        })
                    })
                    .context(WriteChunkSnafu { name: "Unknown" })?;
                }
            }
        }

        Ok(())
    })
    .context(WriteChunkSnafu { name: "User-data" })
}
