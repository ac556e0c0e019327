//! Message header table attached to every published message

use indexmap::IndexMap;

pub const HEADER_NAME: &str = "name";
pub const HEADER_CATEGORY: &str = "category";
pub const HEADER_APPLICATION_NAME: &str = "application_name";

/// Ordered header-name → value table
///
/// Insertion order is kept so the encoded table is reproducible; the broker
/// itself treats headers as unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    /// Build `{name, category}` plus `application_name` when given
    ///
    /// An empty application name is still attached.
    pub fn build(event_name: &str, category: &str, application_name: Option<&str>) -> Self {
        let mut entries = IndexMap::with_capacity(3);
        entries.insert(HEADER_NAME.to_string(), event_name.to_string());
        entries.insert(HEADER_CATEGORY.to_string(), category.to_string());
        if let Some(app) = application_name {
            entries.insert(HEADER_APPLICATION_NAME.to_string(), app.to_string());
        }
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_application() {
        let headers = Headers::build("ChannelVarset", "stasis", None);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("name"), Some("ChannelVarset"));
        assert_eq!(headers.get("category"), Some("stasis"));
        assert_eq!(headers.get("application_name"), None);
    }

    #[test]
    fn test_build_with_application_keeps_order() {
        let headers = Headers::build("StasisStart", "stasis", Some("myApp"));
        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("name", "StasisStart"),
                ("category", "stasis"),
                ("application_name", "myApp"),
            ]
        );
    }

    #[test]
    fn test_empty_application_name_is_included() {
        let headers = Headers::build("StasisEnd", "stasis", Some(""));
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("application_name"), Some(""));
    }
}
