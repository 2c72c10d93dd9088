//! Space identifiers, the registry of valid names, and layout resolution.
//!
//! A space string is either a bare name (`"cosinesimil"`) or a name with one
//! numeric parameter (`"lp:p=3"`). Names are tied to a data layout; the
//! resolver rewrites a name to its counterpart when the data arrives in the
//! other layout.

mod registry;
mod resolver;

use std::fmt;
use std::str::FromStr;

use knn_engine::DataLayout;

pub use registry::{SpaceRegistry, STANDARD_REGISTRY};
pub use resolver::{CoercionAdvisory, Resolution, SpaceResolver};

use crate::error::SpaceError;

/// The numeric suffix of a parameterized space. `raw` is the value text as
/// written and is what gets rendered back.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceParameter {
    pub name: String,
    pub value: f64,
    pub raw: String,
}

/// A parsed space name, optionally carrying its parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceIdentifier {
    base: String,
    parameter: Option<SpaceParameter>,
}

impl SpaceIdentifier {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(base: impl Into<String>, name: impl Into<String>, value: f64) -> Self {
        Self {
            base: base.into(),
            parameter: Some(SpaceParameter {
                name: name.into(),
                value,
                raw: value.to_string(),
            }),
        }
    }

    /// Parameter kept with the text it was parsed from.
    pub(crate) fn parsed(base: &str, name: &str, raw: &str, value: f64) -> Self {
        Self {
            base: base.to_string(),
            parameter: Some(SpaceParameter {
                name: name.to_string(),
                value,
                raw: raw.to_string(),
            }),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn parameter(&self) -> Option<&SpaceParameter> {
        self.parameter.as_ref()
    }

    /// Same parameter, different base name.
    pub fn rebased(&self, base: &str) -> Self {
        Self {
            base: base.to_string(),
            parameter: self.parameter.clone(),
        }
    }

    /// Layout the base name is registered under, if any.
    pub fn layout(&self) -> Option<DataLayout> {
        SpaceRegistry::standard().layout_of(&self.base)
    }
}

impl fmt::Display for SpaceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(p) => write!(f, "{}:{}={}", self.base, p.name, p.raw),
            None => write!(f, "{}", self.base),
        }
    }
}

impl FromStr for SpaceIdentifier {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpaceResolver::standard().parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SpaceIdentifier::new("l2").to_string(), "l2");
        assert_eq!(SpaceIdentifier::with_parameter("lp", "p", 3.0).to_string(), "lp:p=3");
        assert_eq!(
            SpaceIdentifier::with_parameter("renyidiv_fast", "alpha", 0.25).to_string(),
            "renyidiv_fast:alpha=0.25"
        );
    }

    #[test]
    fn test_rebased_keeps_parameter() {
        let id = SpaceIdentifier::with_parameter("lp", "p", 1.5);
        let sparse = id.rebased("lp_sparse");
        assert_eq!(sparse.to_string(), "lp_sparse:p=1.5");
        assert_eq!(sparse.layout(), Some(DataLayout::Sparse));
    }

    #[test]
    fn test_parsed_value_text_is_kept() {
        for raw in ["lp:p=3.0", "lp:p=1e3", "lp:p=0.50"] {
            let id: SpaceIdentifier = raw.parse().unwrap();
            assert_eq!(id.to_string(), raw);
            assert_eq!(id.rebased("lp_sparse").to_string(), raw.replace("lp:", "lp_sparse:"));
        }
        let id: SpaceIdentifier = "lp:p=1e3".parse().unwrap();
        assert_eq!(id.parameter().unwrap().value, 1000.0);
    }
}
