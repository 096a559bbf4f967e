use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Marketplace whose taxonomy has its own vector index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Shopify,
    Ozon,
    Yandex,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported platform: {0}, supported: shopify, ozon, yandex")]
pub struct UnknownPlatform(pub String);

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Shopify, Platform::Ozon, Platform::Yandex];

    /// Primary taxonomy that chain resolution starts from.
    pub const SOURCE: Platform = Platform::Shopify;

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
            Platform::Ozon => "ozon",
            Platform::Yandex => "yandex",
        }
    }

    /// Parse a user supplied identifier. This is the only way a string
    /// becomes a `Platform`.
    pub fn parse(value: &str) -> Result<Self, UnknownPlatform> {
        match value {
            "shopify" => Ok(Platform::Shopify),
            "ozon" => Ok(Platform::Ozon),
            "yandex" => Ok(Platform::Yandex),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }

    /// Every platform except this one, in declaration order.
    pub fn others(self) -> impl Iterator<Item = Platform> {
        Self::ALL.into_iter().filter(move |p| *p != self)
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
