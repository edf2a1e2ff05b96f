//! Image identity handling
//!
//! An [`ImageRef`] names a container image as a (repository, tag) pair with
//! an optional content id. The content id, once known, takes precedence over
//! the human-readable name for runtime operations.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Identity of a container image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    repository: String,
    tag: String,
    id: Option<String>,
}

impl ImageRef {
    /// Coerce a user-supplied string into an image identity.
    ///
    /// A single token becomes `(current user, token)`; a `repository:tag`
    /// pair is split explicitly; anything else is rejected.
    pub fn coerce(value: &str) -> Result<Self> {
        Self::coerce_for_user(value, &current_user())
    }

    /// Like [`ImageRef::coerce`] with an explicit fallback repository
    pub fn coerce_for_user(value: &str, user: &str) -> Result<Self> {
        let components: Vec<&str> = value.split(':').collect();
        let (repository, tag) = match components.as_slice() {
            [tag] => (user, *tag),
            [repository, tag] => (*repository, *tag),
            _ => return Err(CoreError::InvalidImageName(value.to_string())),
        };
        if repository.is_empty() || tag.is_empty() {
            return Err(CoreError::InvalidImageName(value.to_string()));
        }
        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
            id: None,
        })
    }

    /// Adopt an identity reported by the runtime, content id included
    pub fn with_id(
        repository: impl Into<String>,
        tag: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            id: Some(id.into()),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Fill in the content id, e.g. after a commit resolves one
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Human readable `repository:tag` name
    pub fn name(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Registry-addressable form: the content id when known, else the name
    pub fn unique_name(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.name(),
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Name of the invoking user, used as the default repository
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
