//! Row identifiers for libraries, the directory tree, videos, and the
//! caller/stream bookkeeping around them.
//!
//! Every table keys on a UUID, but a `DirId` and a `VideoId` never mix:
//! each gets its own newtype. IDs travel as hyphenated strings in JSON and
//! URL paths. Stream keys embed the 32-digit hex form from
//! [`StreamTokenId::simple`], and both forms parse back through `FromStr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Fresh random (v4) ID for a new row.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// The all-zero ID. Migrations seed the anonymous user and
                /// device under it.
                #[must_use]
                pub const fn nil() -> Self {
                    Self(Uuid::nil())
                }

                #[must_use]
                pub fn is_nil(&self) -> bool {
                    self.0.is_nil()
                }

                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }

                /// Hyphen-free lowercase hex, as embedded in stream keys.
                #[must_use]
                pub fn simple(&self) -> String {
                    self.0.simple().to_string()
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::try_parse(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }

            impl From<$name> for Uuid {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// A configured library rooted at a directory under the media root.
    LibraryId,
    /// A directory row in a library's tree.
    DirId,
    /// A video file row.
    VideoId,
    UserId,
    DeviceId,
    SessionId,
    /// The row behind an issued stream key.
    StreamTokenId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_form_round_trips() {
        let id = StreamTokenId::new();
        let simple = id.simple();
        assert_eq!(simple.len(), 32);
        assert!(simple.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(simple.parse::<StreamTokenId>().unwrap(), id);
        assert_eq!(id.to_string().parse::<StreamTokenId>().unwrap(), id);
    }

    #[test]
    fn truncated_or_padded_keys_do_not_parse() {
        let simple = StreamTokenId::new().simple();
        assert!(simple[..31].parse::<StreamTokenId>().is_err());
        assert!(format!("{simple}0").parse::<StreamTokenId>().is_err());
        assert!(format!("{simple}.deadbeef").parse::<StreamTokenId>().is_err());
        assert!("".parse::<StreamTokenId>().is_err());
    }

    #[test]
    fn anonymous_identity_is_nil() {
        let user = UserId::nil();
        assert!(user.is_nil());
        assert_eq!(user.to_string(), "00000000-0000-0000-0000-000000000000");
        assert_eq!(DeviceId::nil().as_uuid(), user.as_uuid());
        assert!(!UserId::new().is_nil());
    }

    #[test]
    fn ids_in_json_bodies_are_plain_strings() {
        let dir = DirId::new();
        let body = serde_json::json!({ "dir_id": dir });
        assert_eq!(body["dir_id"], dir.to_string());
        let back: DirId = serde_json::from_value(body["dir_id"].clone()).unwrap();
        assert_eq!(back, dir);
    }

    #[test]
    fn bad_path_segments_are_rejected() {
        assert!("not-a-uuid".parse::<VideoId>().is_err());
        assert!("../../etc/passwd".parse::<LibraryId>().is_err());
    }
}
