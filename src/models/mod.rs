use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// A partial update: the JSON fields to overwrite on a record.
pub type Patch = Map<String, Value>;

/// A row the admin layer can hold locally and round-trip through the API.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

/// Merges `patch` onto `record` through its JSON form. `id` is never patched.
pub fn apply_patch<R: Record>(record: &R, patch: &Patch) -> Result<R, DataError> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| DataError::validation("record", e.to_string()))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| DataError::validation("record", "record is not an object"))?;

    for (key, v) in patch {
        if key == "id" {
            continue;
        }
        if !object.contains_key(key) {
            return Err(DataError::validation(key.clone(), "unknown field"));
        }
        object.insert(key.clone(), v.clone());
    }

    serde_json::from_value(value).map_err(|e| DataError::validation("patch", e.to_string()))
}

/// The admin-editable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Settings,
    About,
    PortfolioCategories,
    Clients,
    ClientImages,
    NavbarLinks,
}

impl TableKind {
    pub const ALL: [TableKind; 6] = [
        TableKind::Settings,
        TableKind::About,
        TableKind::PortfolioCategories,
        TableKind::Clients,
        TableKind::ClientImages,
        TableKind::NavbarLinks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Settings => "settings",
            TableKind::About => "about",
            TableKind::PortfolioCategories => "portfolio_categories",
            TableKind::Clients => "clients",
            TableKind::ClientImages => "client_images",
            TableKind::NavbarLinks => "navbar_links",
        }
    }

    /// Singletons are seeded once and only ever updated in place.
    pub fn is_singleton(self) -> bool {
        matches!(self, TableKind::Settings | TableKind::About)
    }

    /// Whether the server generates primary keys on create.
    pub fn assigns_ids(self) -> bool {
        matches!(
            self,
            TableKind::Clients | TableKind::ClientImages | TableKind::NavbarLinks
        )
    }

    /// Column stamped once when a row is created.
    pub fn created_column(self) -> Option<&'static str> {
        match self {
            TableKind::Clients | TableKind::ClientImages => Some("created_at"),
            _ => None,
        }
    }

    /// Column stamped on every write.
    pub fn updated_column(self) -> Option<&'static str> {
        match self {
            TableKind::Settings | TableKind::About => Some("updated_at"),
            _ => None,
        }
    }

    /// Columns holding image references.
    pub fn image_columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Settings => &["hero_image"],
            TableKind::About => &["image"],
            TableKind::PortfolioCategories => &["cover_image"],
            TableKind::Clients => &["cover_image"],
            TableKind::ClientImages => &["image"],
            TableKind::NavbarLinks => &[],
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TableKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableKind::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| DataError::NotFound(format!("Unknown table '{}'", s)))
    }
}

/// The fixed portfolio category enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySlug {
    Businesses,
    Events,
    People,
    Restaurants,
}

impl CategorySlug {
    pub const ALL: [CategorySlug; 4] = [
        CategorySlug::Businesses,
        CategorySlug::Events,
        CategorySlug::People,
        CategorySlug::Restaurants,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CategorySlug::Businesses => "businesses",
            CategorySlug::Events => "events",
            CategorySlug::People => "people",
            CategorySlug::Restaurants => "restaurants",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            CategorySlug::Businesses => "Businesses",
            CategorySlug::Events => "Events",
            CategorySlug::People => "People",
            CategorySlug::Restaurants => "Restaurants",
        }
    }
}

impl FromStr for CategorySlug {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategorySlug::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                DataError::validation(
                    "id",
                    format!(
                        "'{}' is not a portfolio category (expected one of businesses, events, people, restaurants)",
                        s
                    ),
                )
            })
    }
}
