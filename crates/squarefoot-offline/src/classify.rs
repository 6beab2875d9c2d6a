//! Route classification.
//!
//! Pure mapping from request path and mode to a [`Category`]. First match wins:
//! 1. Path starts with a never-cache prefix → [`Category::NetworkData`]
//! 2. Mode is a top-level page load → [`Category::NavigationDocument`]
//! 3. Anything else → [`Category::StaticAsset`]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Request, RequestMode};

/// Purpose of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Live API data (predictions, competitions, saves).
    NetworkData,

    /// Page code, styles and images.
    StaticAsset,

    /// The page shell itself.
    NavigationDocument,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkData => write!(f, "network-data"),
            Self::StaticAsset => write!(f, "static-asset"),
            Self::NavigationDocument => write!(f, "navigation-document"),
        }
    }
}

/// Classifies requests using a configured set of data-endpoint prefixes.
#[derive(Debug, Clone, Default)]
pub struct RouteClassifier {
    never_cache_prefixes: Vec<String>,
}

impl RouteClassifier {
    pub fn new<I, S>(never_cache_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            never_cache_prefixes: never_cache_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, path: &str, mode: RequestMode) -> Category {
        if self.is_network_data(path) {
            Category::NetworkData
        } else if mode == RequestMode::Navigate {
            Category::NavigationDocument
        } else {
            Category::StaticAsset
        }
    }

    pub fn classify_request(&self, request: &Request) -> Category {
        self.classify(request.path(), request.mode)
    }

    pub fn is_network_data(&self, path: &str) -> bool {
        self.never_cache_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.never_cache_prefixes
    }
}
