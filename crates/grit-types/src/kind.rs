use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of a logical object.
///
/// Every raw object has exactly one kind, fixed at creation and embedded in
/// both the loose header token and the pack entry type code. The delta entry
/// codes (6 and 7) exist only at the pack-entry level and never name a
/// logical object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content (file contents, arbitrary data).
    Blob,
    /// Directory listing mapping names to object references.
    Tree,
    /// A commit: tree reference plus parents and metadata.
    Commit,
    /// An annotated tag pointing at another object.
    Tag,
}

impl ObjectKind {
    /// The ASCII token used in loose object headers.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parse a loose header token.
    pub fn from_token(token: &str) -> Result<Self, TypeError> {
        match token {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }

    /// The 3-bit type code used in pack entry headers.
    pub fn pack_code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parse a pack entry type code (full objects only; 6 and 7 are deltas).
    pub fn from_pack_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_token(kind.token()).unwrap(), kind);
        }
    }

    #[test]
    fn from_token_unknown() {
        let err = ObjectKind::from_token("blobby").unwrap_err();
        assert_eq!(err, TypeError::UnknownKind("blobby".to_string()));
    }

    #[test]
    fn pack_code_roundtrip() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_pack_code(kind.pack_code()), Some(kind));
        }
    }

    #[test]
    fn delta_codes_are_not_kinds() {
        assert!(ObjectKind::from_pack_code(0).is_none());
        assert!(ObjectKind::from_pack_code(5).is_none());
        assert!(ObjectKind::from_pack_code(6).is_none());
        assert!(ObjectKind::from_pack_code(7).is_none());
    }

    #[test]
    fn display_matches_token() {
        assert_eq!(format!("{}", ObjectKind::Commit), "commit");
    }
}
