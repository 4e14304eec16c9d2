use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gender code stored on the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Gender {
    #[default]
    Unknown = 0,
    Male = 1,
    Female = 2,
}

impl TryFrom<i8> for Gender {
    type Error = String;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Male),
            2 => Ok(Self::Female),
            other => Err(format!("unknown gender code {}", other)),
        }
    }
}

impl From<Gender> for i8 {
    fn from(gender: Gender) -> Self {
        gender as i8
    }
}

/// Status of one directed friend edge.
///
/// A friendship is final only when both directions are `Accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
    Expired = 4,
}

impl FriendStatus {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Pending),
            2 => Some(Self::Accepted),
            3 => Some(Self::Rejected),
            4 => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Public view of a user. Never carries the password digest or salt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub email: String,
    pub gender: Gender,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One directed edge of the friend graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendEdge {
    pub user_id: i64,
    pub friend_id: i64,
    pub status: FriendStatus,
    pub message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_rejects_unknown_codes() {
        assert_eq!(Gender::try_from(2), Ok(Gender::Female));
        assert!(Gender::try_from(7).is_err());
        assert!(serde_json::from_str::<Gender>("9").is_err());
        assert_eq!(serde_json::to_string(&Gender::Male).unwrap(), "1");
    }

    #[test]
    fn friend_status_codes_match_storage() {
        for status in [
            FriendStatus::Pending,
            FriendStatus::Accepted,
            FriendStatus::Rejected,
            FriendStatus::Expired,
        ] {
            assert_eq!(FriendStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(FriendStatus::Accepted.code(), 2);
        assert_eq!(FriendStatus::from_code(0), None);
    }
}
