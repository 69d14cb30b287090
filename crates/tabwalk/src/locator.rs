//! Locators for the elements a traversal touches.
//!
//! A [`Locator`] is declared in configuration as a single-key map, e.g.
//! `{css: "a#accounts"}` or `{xpath: "//table[@class='ListView']"}`. The
//! automation runtime resolves it either as a CSS selector or as an XPath
//! expression, see [`Locator::query`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an element is identified on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LocatorRepr", into = "LocatorRepr")]
pub enum Locator {
    /// CSS selector (e.g., "div#content")
    Css(String),
    /// Element id attribute
    Id(String),
    /// XPath expression
    XPath(String),
    /// Anchor with an exact href value
    Href(String),
}

/// Wire form of a [`Locator`]: a map with exactly one known key.
///
/// A plain struct reads the same from YAML and JSON, where an externally
/// tagged enum would need a YAML tag such as `!css`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocatorRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    href: Option<String>,
}

impl TryFrom<LocatorRepr> for Locator {
    type Error = String;

    fn try_from(repr: LocatorRepr) -> Result<Self, Self::Error> {
        let mut found = [
            repr.css.map(Self::Css),
            repr.id.map(Self::Id),
            repr.xpath.map(Self::XPath),
            repr.href.map(Self::Href),
        ]
        .into_iter()
        .flatten();
        match (found.next(), found.next()) {
            (Some(locator), None) => Ok(locator),
            (None, _) => Err("locator needs one of css, id, xpath or href".to_string()),
            (Some(_), Some(_)) => {
                Err("locator takes exactly one of css, id, xpath or href".to_string())
            }
        }
    }
}

impl From<Locator> for LocatorRepr {
    fn from(locator: Locator) -> Self {
        let mut repr = Self::default();
        match locator {
            Locator::Css(value) => repr.css = Some(value),
            Locator::Id(value) => repr.id = Some(value),
            Locator::XPath(value) => repr.xpath = Some(value),
            Locator::Href(value) => repr.href = Some(value),
        }
        repr
    }
}

/// Resolved query form understood by the automation runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
}

/// Condition an element must satisfy before a lookup succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    /// Attached to the DOM
    #[default]
    Present,
    /// Attached and rendered with a non-empty box
    Visible,
    /// Visible and not disabled
    Clickable,
}

impl Locator {
    /// Create a CSS locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an id locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Create an XPath locator
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Create an href locator
    #[must_use]
    pub fn href(href: impl Into<String>) -> Self {
        Self::Href(href.into())
    }

    /// Short name of the locator strategy
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Css(_) => "css",
            Self::Id(_) => "id",
            Self::XPath(_) => "xpath",
            Self::Href(_) => "href",
        }
    }

    /// Raw locator value as configured
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(v) | Self::Id(v) | Self::XPath(v) | Self::Href(v) => v,
        }
    }

    /// Resolve into a CSS or XPath query
    #[must_use]
    pub fn query(&self) -> Query {
        match self {
            Self::Css(s) => Query::Css(s.clone()),
            Self::Id(id) => Query::Css(format!("[id={id:?}]")),
            Self::XPath(x) => Query::XPath(x.clone()),
            Self::Href(h) => Query::XPath(format!("//a[@href={}]", xpath_literal(h))),
        }
    }

    /// JavaScript expression yielding the first matching node (or null)
    #[must_use]
    pub fn to_query(&self) -> String {
        match self.query() {
            Query::Css(s) => format!("document.querySelector({s:?})"),
            Query::XPath(x) => format!(
                "document.evaluate({x:?}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
            ),
        }
    }

    /// JavaScript expression yielding the number of matching nodes
    #[must_use]
    pub fn to_count_query(&self) -> String {
        match self.query() {
            Query::Css(s) => format!("document.querySelectorAll({s:?}).length"),
            Query::XPath(x) => format!(
                "document.evaluate({x:?}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength"
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

/// Quote a string for use inside an XPath expression.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
