//! Threads user profile and publishing quota types.

use serde::{Deserialize, Serialize};

pub(crate) const PROFILE_FIELDS: &str =
    "id,username,name,threads_profile_picture_url,threads_biography";

/// The authenticated user's profile.
///
/// See: <https://developers.facebook.com/docs/threads/threads-profiles>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub threads_profile_picture_url: Option<String>,
    #[serde(default)]
    pub threads_biography: Option<String>,
}

pub(crate) const PUBLISHING_LIMIT_FIELDS: &str = "quota_usage,config";

/// How many posts the user has published in the current window, and the cap.
///
/// See: <https://developers.facebook.com/docs/threads/troubleshooting#retrieve-publishing-quota-limit>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingLimit {
    pub quota_usage: u32,
    pub config: QuotaConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub quota_total: u32,
    /// Window length in seconds.
    pub quota_duration: u64,
}

impl PublishingLimit {
    pub fn remaining(&self) -> u32 {
        self.config.quota_total.saturating_sub(self.quota_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_quota() {
        let limit: PublishingLimit = serde_json::from_str(
            r#"{"quota_usage":248,"config":{"quota_total":250,"quota_duration":86400}}"#,
        )
        .unwrap();
        assert_eq!(limit.remaining(), 2);

        let over = PublishingLimit {
            quota_usage: 300,
            ..limit
        };
        assert_eq!(over.remaining(), 0);
    }
}
