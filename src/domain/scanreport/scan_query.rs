use super::image_ref::ImageRef;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanQuery {
    registry_id: String,
    repository: String,
    digest: String,
    tag: String,
}

impl ScanQuery {
    pub fn for_image(registry_id: impl Into<String>, image: &ImageRef) -> Self {
        Self {
            registry_id: registry_id.into(),
            repository: image.repository().to_string(),
            digest: image.digest().to_string(),
            tag: image.tag().to_string(),
        }
    }

    pub fn registry_id(&self) -> &str {
        &self.registry_id
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}
