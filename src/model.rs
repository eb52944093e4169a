//! Record shapes shared by loaders, remote connectors and the store.
use serde::{Deserialize, Serialize};

/// Separator used when a source reports keywords as a list.
pub const KEYWORD_SEPARATOR: &str = " | ";

/// Bibliographic metadata of one paper. Absent fields are empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceData {
    pub doi: String,
    pub isbn: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: String,
}

impl ResourceData {
    pub fn new(
        doi: impl Into<String>,
        isbn: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        keywords: impl Into<String>,
    ) -> Self {
        Self {
            doi: doi.into(),
            isbn: isbn.into(),
            title: title.into(),
            abstract_text: abstract_text.into(),
            keywords: keywords.into(),
        }
    }

    /// Fields used to recognise the same paper coming from another origin, as
    /// `(column, value)` pairs. Blank values are left out.
    pub fn identity_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("doi", self.doi.as_str()),
            ("title", self.title.as_str()),
            ("abstract", self.abstract_text.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
    }
}

/// Where a record was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrySource {
    pub origin: String,
    pub link: Option<String>,
}

impl EntrySource {
    pub fn new(origin: impl Into<String>, link: Option<String>) -> Self {
        Self {
            origin: origin.into(),
            link,
        }
    }

    /// Source with a link; an empty link is stored as absent.
    pub fn with_link(origin: impl Into<String>, link: impl Into<String>) -> Self {
        let link = link.into();
        Self::new(origin, Some(link).filter(|l| !l.is_empty()))
    }
}

/// Review state assigned by the user. `rejected == 0` means not reviewed yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryState {
    pub rejected: i64,
    pub save_for_later: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub resource: ResourceData,
    pub sources: Vec<EntrySource>,
    #[serde(default)]
    pub state: EntryState,
}

impl Entry {
    pub fn new(resource: ResourceData, sources: Vec<EntrySource>) -> Self {
        Self {
            resource,
            sources,
            state: EntryState::default(),
        }
    }
}

/// Joins a list of keywords the way every source stores them.
pub fn join_keywords<I, S>(keywords: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(KEYWORD_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fields_skip_blank_values() {
        let data = ResourceData::new("10.1/x", "978", "  ", "", "a | b");
        assert_eq!(data.identity_fields(), vec![("doi", "10.1/x")]);
    }

    #[test]
    fn with_link_drops_empty_link() {
        assert_eq!(EntrySource::with_link("ieee", "").link, None);
        assert_eq!(
            EntrySource::with_link("ieee", "http://a").link.as_deref(),
            Some("http://a")
        );
    }

    #[test]
    fn join_keywords_trims_and_skips_empty() {
        assert_eq!(join_keywords(["PLC ", "", " safety"]), "PLC | safety");
        assert_eq!(join_keywords(Vec::<String>::new()), "");
    }

    #[test]
    fn state_defaults_to_unreviewed() {
        let state = EntryState::default();
        assert_eq!(state.rejected, 0);
        assert!(!state.save_for_later);
        assert_eq!(state.notes, "");
    }
}
