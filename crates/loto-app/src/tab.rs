//! UI tabs and the `?tab=` query parameter.

use url::form_urlencoded;

/// Top-level UI tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    #[default]
    Generator,
    History,
    Statistics,
    AddNumbers,
    Settings,
    Privacy,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Generator,
        Tab::History,
        Tab::Statistics,
        Tab::AddNumbers,
        Tab::Settings,
        Tab::Privacy,
    ];

    /// Name used in links (`?tab=istoric`).
    pub fn slug(self) -> &'static str {
        match self {
            Tab::Generator => "generator",
            Tab::History => "istoric",
            Tab::Statistics => "statistici",
            Tab::AddNumbers => "adaugare",
            Tab::Settings => "setari",
            Tab::Privacy => "confidentialitate",
        }
    }

    /// Case-insensitive lookup by slug.
    pub fn from_slug(slug: &str) -> Option<Tab> {
        let slug = slug.trim().to_lowercase();
        Tab::ALL.into_iter().find(|tab| tab.slug() == slug)
    }

    /// Tab named by the `tab` parameter of a query string, with or without
    /// the leading `?`.
    pub fn from_query(query: &str) -> Option<Tab> {
        let query = query.strip_prefix('?').unwrap_or(query);
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "tab")
            .and_then(|(_, value)| Tab::from_slug(&value))
    }

    /// Initial tab for a page load: the query's tab, else the default.
    pub fn resolve(query: Option<&str>) -> Tab {
        query.and_then(Tab::from_query).unwrap_or_default()
    }
}
