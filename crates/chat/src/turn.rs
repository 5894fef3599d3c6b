use std::fmt;

use chrono::{DateTime, Utc};

/// Stable identifier for one transcript entry, allocated in append order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

/// One immutable transcript entry.
///
/// Only attachment names are kept; file content is released once the
/// dispatch that carried it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: String,
    attachments: Vec<String>,
    created_at: DateTime<Utc>,
}

impl Turn {
    pub(crate) fn user(id: TurnId, content: String, attachments: Vec<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content,
            attachments,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn agent(id: TurnId, content: String) -> Self {
        Self {
            id,
            role: Role::Agent,
            content,
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
