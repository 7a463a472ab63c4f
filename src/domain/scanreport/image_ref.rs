use std::fmt::{Display, Formatter};

/// A tagged image that is eligible for scanning.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    tag: String,
    digest: String,
}

impl ImageRef {
    pub fn new(
        repository: impl Into<String>,
        tag: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            digest: digest.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.repository, self.tag, self.digest)
    }
}
