//! Room names

use std::fmt;
use std::str::FromStr;

use crate::sync::SyncError;

/// Characters the backend refuses in a path key.
const FORBIDDEN: &[char] = &['.', '$', '#', '[', ']', '/'];

/// A validated, trimmed room name, usable as a single backend path key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("room name is blank".to_string()));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| FORBIDDEN.contains(c) || c.is_control())
        {
            return Err(SyncError::Validation(format!(
                "room name '{}' contains forbidden character {:?}",
                name, bad
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_trims() {
        let room = RoomName::parse("  general ").unwrap();
        assert_eq!(room.as_str(), "general");
        assert_eq!(room.to_string(), "general");
    }

    #[test]
    fn test_room_name_allows_spaces_and_unicode() {
        assert!(RoomName::parse("sala de estar").is_ok());
        assert!(RoomName::parse("café").is_ok());
    }

    #[test]
    fn test_room_name_rejects_blank() {
        assert!(matches!(
            RoomName::parse("   "),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_room_name_rejects_path_characters() {
        for bad in ["a/b", "a.b", "$room", "x#1", "[x]", "tab\there"] {
            assert!(bad.parse::<RoomName>().is_err(), "{} should be rejected", bad);
        }
    }
}
