use regex::RegexSet;

/// Allow-list of tag prefixes. A tag is accepted when it starts with any of
/// the configured patterns; an empty list accepts nothing.
#[derive(Clone, Debug)]
pub struct TagPatterns {
    set: RegexSet,
}

impl TagPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let anchored = patterns
            .into_iter()
            .map(|p| format!("^{}", regex::escape(p.as_ref())));

        Ok(Self {
            set: RegexSet::new(anchored)?,
        })
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.set.is_match(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
