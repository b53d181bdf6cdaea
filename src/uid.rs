//! Utility module for working with UIDs.
use snafu::{ensure, Backtrace, Snafu};
use std::borrow::Cow;

/// The maximum number of characters in a UID.
pub const MAX_UID_LENGTH: usize = 64;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("UID has {} characters, maximum is {}", length, MAX_UID_LENGTH))]
    UidTooLong { length: usize, backtrace: Backtrace },

    #[snafu(display("UID `{}` is not conformant", uid))]
    NonConformantUid { uid: String, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Remove the trailing characters of a UID
/// which are not part of its value.
///
/// Some implementations pad odd-length UIDs with a trailing null,
/// which the length-prefixed PDU fields do not require.
pub fn trim_uid(uid: Cow<str>) -> Cow<str> {
    if uid.ends_with('\0') || uid.ends_with(' ') {
        Cow::Owned(
            uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string(),
        )
    } else {
        uid
    }
}

/// Check whether the UID conforms to the rules in PS3.5 section 9.1:
/// components are purely numeric, separated by single dots,
/// and a component may only start with `0` when it is exactly `"0"`.
pub fn is_conformant_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > MAX_UID_LENGTH {
        return false;
    }

    uid.split('.').all(|component| {
        !component.is_empty()
            && component.bytes().all(|b| b.is_ascii_digit())
            && (component == "0" || !component.starts_with('0'))
    })
}

/// Validate a UID before it is encoded into a PDU field.
///
/// Only the length is checked unless `enforce_conformance` is set,
/// in which case the full PS3.5 component rules apply.
pub fn validate_uid(uid: &str, enforce_conformance: bool) -> Result<()> {
    ensure!(uid.len() <= MAX_UID_LENGTH, UidTooLongSnafu { length: uid.len() });

    if enforce_conformance {
        ensure!(is_conformant_uid(uid), NonConformantUidSnafu { uid });
    }

    Ok(())
}
