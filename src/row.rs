//! Row serialization for the demo schema.
//!
//! The engine stores opaque `row_size`-byte values and never parses them;
//! callers bring their own codec. This module provides the seam plus the
//! fixed-layout user row the CLI and the durability tests speak.

use crate::error::{Result, StorageError};
use std::fmt;
use std::str::FromStr;

/// Fixed width of the username column
pub const USERNAME_SIZE: usize = 32;

/// Fixed width of the email column
pub const EMAIL_SIZE: usize = 32;

/// Encoded size of a [`UserRow`]: id, username, email
pub const USER_ROW_SIZE: u32 = 4 + USERNAME_SIZE as u32 + EMAIL_SIZE as u32;

/// A value the engine can store in a leaf cell
pub trait Row {
    /// Number of bytes `write_to` produces
    fn encoded_size(&self) -> u32;

    /// Key the row is indexed under
    fn primary_key(&self) -> u32;

    /// Serialize into a buffer of exactly `encoded_size` bytes
    fn write_to(&self, out: &mut [u8]);

    /// Deserialize from a buffer of exactly `encoded_size` bytes
    fn read_from(buf: &[u8]) -> Self
    where
        Self: Sized;
}

/// The demo schema: `(id, username, email)` in 68 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: u32,
    username: [u8; USERNAME_SIZE],
    email: [u8; EMAIL_SIZE],
}

impl UserRow {
    /// Build a row, rejecting fields wider than their column
    pub fn new(id: u32, username: &str, email: &str) -> Result<Self> {
        if username.len() > USERNAME_SIZE {
            return Err(StorageError::FieldTooLong {
                field: "username",
                got: username.len(),
                max: USERNAME_SIZE,
            });
        }
        if email.len() > EMAIL_SIZE {
            return Err(StorageError::FieldTooLong {
                field: "email",
                got: email.len(),
                max: EMAIL_SIZE,
            });
        }

        let mut row = Self {
            id,
            username: [0u8; USERNAME_SIZE],
            email: [0u8; EMAIL_SIZE],
        };
        row.username[..username.len()].copy_from_slice(username.as_bytes());
        row.email[..email.len()].copy_from_slice(email.as_bytes());
        Ok(row)
    }

    /// Username, trimmed at the NUL padding
    pub fn username(&self) -> &str {
        field_str(&self.username)
    }

    /// Email, trimmed at the NUL padding
    pub fn email(&self) -> &str {
        field_str(&self.email)
    }
}

fn field_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("")
}

impl Row for UserRow {
    fn encoded_size(&self) -> u32 {
        USER_ROW_SIZE
    }

    fn primary_key(&self) -> u32 {
        self.id
    }

    fn write_to(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), USER_ROW_SIZE as usize);
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..4 + USERNAME_SIZE].copy_from_slice(&self.username);
        out[4 + USERNAME_SIZE..].copy_from_slice(&self.email);
    }

    fn read_from(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), USER_ROW_SIZE as usize);
        let mut id = [0u8; 4];
        id.copy_from_slice(&buf[0..4]);
        let mut row = Self {
            id: u32::from_le_bytes(id),
            username: [0u8; USERNAME_SIZE],
            email: [0u8; EMAIL_SIZE],
        };
        row.username.copy_from_slice(&buf[4..4 + USERNAME_SIZE]);
        row.email.copy_from_slice(&buf[4 + USERNAME_SIZE..]);
        row
    }
}

impl fmt::Display for UserRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.id, self.username(), self.email())
    }
}

impl FromStr for UserRow {
    type Err = String;

    /// Parse `<id> <username> <email>`, tolerating extra whitespace
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let (Some(id), Some(username), Some(email), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(format!("expected `<id> <username> <email>`, got {s:?}"));
        };

        let id: u32 = id.parse().map_err(|_| format!("bad id {id:?}"))?;
        UserRow::new(id, username, email).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let row = UserRow::new(13, "alice", "alice@google.com").unwrap();

        let mut buf = vec![0u8; USER_ROW_SIZE as usize];
        row.write_to(&mut buf);
        let restored = UserRow::read_from(&buf);

        assert_eq!(restored, row);
        assert_eq!(restored.primary_key(), 13);
        assert_eq!(restored.username(), "alice");
        assert_eq!(restored.email(), "alice@google.com");
    }

    #[test]
    fn test_encoded_size() {
        assert_eq!(USER_ROW_SIZE, 68);
        let row = UserRow::new(1, "a", "b").unwrap();
        assert_eq!(row.encoded_size(), 68);
    }

    #[test]
    fn test_display() {
        let row = UserRow::new(1, "annie", "annie@google.com").unwrap();
        assert_eq!(row.to_string(), "1,annie,annie@google.com");
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let row: UserRow = " 1 annie annie@google.com".parse().unwrap();
        assert_eq!(row.to_string(), "1,annie,annie@google.com");

        let row: UserRow = " 2   bob bob@sina.com   ".parse().unwrap();
        assert_eq!(row.to_string(), "2,bob,bob@sina.com");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<UserRow>().is_err());
        assert!("1 alice".parse::<UserRow>().is_err());
        assert!("1 a b c".parse::<UserRow>().is_err());
        assert!("x alice a@b.c".parse::<UserRow>().is_err());
    }

    #[test]
    fn test_field_too_long() {
        let long = "x".repeat(USERNAME_SIZE + 1);
        let err = UserRow::new(1, &long, "a@b.c").unwrap_err();
        assert!(matches!(err, StorageError::FieldTooLong { field: "username", .. }));
    }
}
