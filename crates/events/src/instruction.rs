use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use playsort_core::{PlaylistId, UserId};

/// Action verb that the retry consumer knows how to replay.
pub const REORDER_VERB: &str = "reorder";

/// A deferred operation, queued when the remote platform refused a call for
/// quota reasons.
///
/// Wire shape (JSON, plain-text body):
///
/// ```text
/// {"action_name": "reorder_playlist", "playlist_id": "PL..", "params": "byTitle",
///  "err": "...", "retry_at": 1700000000, "user_id": "u1"}
/// ```
///
/// `retry_at` is unix seconds. `params` carries the sort criterion for
/// reorder actions and may be absent on older messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInstruction {
    pub action_name: String,
    pub playlist_id: PlaylistId,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub err: String,
    pub retry_at: i64,
    #[serde(default = "blank_user")]
    pub user_id: UserId,
}

fn blank_user() -> UserId {
    UserId::new("")
}

impl RetryInstruction {
    pub fn new(
        action_name: impl Into<String>,
        playlist_id: PlaylistId,
        params: impl Into<String>,
        user_id: UserId,
        err: impl Into<String>,
        retry_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            playlist_id,
            params: params.into(),
            err: err.into(),
            retry_at: retry_at.timestamp(),
            user_id,
        }
    }

    /// First `_`-separated token of the action name (`"reorder_playlist"` → `"reorder"`).
    pub fn verb(&self) -> &str {
        self.action_name.split('_').next().unwrap_or_default()
    }

    pub fn is_reorder(&self) -> bool {
        self.verb() == REORDER_VERB
    }

    /// Criterion to replay with.
    ///
    /// `params` wins; otherwise the remainder of the action name after the
    /// verb (`"reorder_byTitle"` → `"byTitle"`) is used.
    pub fn criterion(&self) -> Option<&str> {
        if !self.params.trim().is_empty() {
            return Some(self.params.trim());
        }
        self.action_name
            .split_once('_')
            .map(|(_, rest)| rest)
            .filter(|rest| !rest.is_empty())
    }

    pub fn retry_at_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.retry_at, 0).single()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_documented_wire_shape() {
        let body = r#"{"action_name":"reorder_playlist","playlist_id":"PL1","params":"byTitle",
                       "err":"quota","retry_at":1700000000,"user_id":"u1"}"#;
        let msg = RetryInstruction::from_json(body).unwrap();
        assert_eq!(msg.playlist_id.as_str(), "PL1");
        assert_eq!(msg.user_id.as_str(), "u1");
        assert_eq!(msg.retry_at, 1_700_000_000);
        assert_eq!(msg.verb(), "reorder");
        assert_eq!(msg.criterion(), Some("byTitle"));
    }

    #[test]
    fn encodes_retry_at_as_unix_seconds() {
        let at = Utc.timestamp_opt(1_700_000_123, 0).unwrap();
        let msg = RetryInstruction::new(
            "reorder_playlist",
            PlaylistId::new("PL1"),
            "byPublishedAt",
            UserId::new("u1"),
            "quotaExceeded",
            at,
        );
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["retry_at"], 1_700_000_123);
        assert_eq!(json["params"], "byPublishedAt");
        assert_eq!(json["user_id"], "u1");
        assert_eq!(msg.retry_at_time(), Some(at));
    }

    #[test]
    fn criterion_falls_back_to_action_suffix() {
        let body = r#"{"action_name":"reorder_byTitle","playlist_id":"PL1","retry_at":0}"#;
        let msg = RetryInstruction::from_json(body).unwrap();
        assert_eq!(msg.params, "");
        assert!(msg.user_id.is_blank());
        assert_eq!(msg.criterion(), Some("byTitle"));

        let bare = RetryInstruction::from_json(
            r#"{"action_name":"reorder","playlist_id":"PL1","retry_at":0}"#,
        )
        .unwrap();
        assert_eq!(bare.criterion(), None);
    }

    #[test]
    fn non_reorder_actions_are_recognized() {
        let msg = RetryInstruction::from_json(
            r#"{"action_name":"delete_playlist","playlist_id":"PL1","retry_at":0}"#,
        )
        .unwrap();
        assert!(!msg.is_reorder());
    }

    #[test]
    fn rejects_bodies_missing_required_fields() {
        assert!(RetryInstruction::from_json("not json").is_err());
        assert!(RetryInstruction::from_json(r#"{"playlist_id":"PL1"}"#).is_err());
    }
}
