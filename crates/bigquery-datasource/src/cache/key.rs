//! Cache key derivation

use std::fmt;

use crate::settings::ConnectionSettings;

/// Identifies one (instance, location, project) triple.
///
/// Rendered as `{instance}/{location}:{project}`, e.g. `1/us-west1:raintank-dev`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    instance: String,
    location: String,
    project: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(
        instance: impl Into<String>,
        location: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            location: location.into(),
            project: project.into(),
        }
    }

    /// Derive the key for resolved connection parameters
    #[must_use]
    pub fn derive(instance: &str, params: &ConnectionSettings) -> Self {
        Self::new(instance, params.location.as_str(), params.project.as_str())
    }

    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.instance, self.location, self.project)
    }
}
