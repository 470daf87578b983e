use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of page, open to custom types registered at runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageType {
    News,
    Blog,
    Product,
    Article,
    Forum,
    Documentation,
    #[default]
    Unknown,
    /// A type registered by the caller, stored lowercase
    Custom(String),
}

impl PageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::News => "news",
            Self::Blog => "blog",
            Self::Product => "product",
            Self::Article => "article",
            Self::Forum => "forum",
            Self::Documentation => "documentation",
            Self::Unknown => "unknown",
            Self::Custom(name) => name,
        }
    }

    /// Builds a page type from its name; unrecognised names become custom types
    pub fn from_name(name: &str) -> Self {
        let lowered = name.trim().to_lowercase();
        match lowered.as_str() {
            "news" => Self::News,
            "blog" => Self::Blog,
            "product" => Self::Product,
            "article" => Self::Article,
            "forum" => Self::Forum,
            "documentation" | "docs" => Self::Documentation,
            "unknown" | "" => Self::Unknown,
            _ => Self::Custom(lowered),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for PageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}
