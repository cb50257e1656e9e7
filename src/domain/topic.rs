use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A subject the user wants explained. Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    pub fn new(value: impl Into<String>) -> Result<Self, ServiceError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(ServiceError::Validation("No topic provided".to_string()))
        } else {
            Ok(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One explained topic as persisted by the query log. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicQuery {
    pub topic: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl TopicQuery {
    pub fn new(topic: &Topic, response: impl Into<String>) -> Self {
        Self {
            topic: topic.as_str().to_string(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}
