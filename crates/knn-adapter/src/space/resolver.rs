//! Parsing, validation and layout coercion of space identifiers.

use std::fmt;

use knn_engine::DataLayout;

use super::{SpaceIdentifier, SpaceRegistry};
use crate::error::SpaceError;

/// Non-fatal note that coercion picked the exact variant while a faster one
/// exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionAdvisory {
    pub requested: String,
    pub converted: String,
    pub fast: &'static str,
}

impl fmt::Display for CoercionAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Converted {} to {}. For fast version, specify {} explicitly",
            self.requested, self.converted, self.fast
        )
    }
}

/// Outcome of [`SpaceResolver::resolve_for_layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub space: SpaceIdentifier,
    pub advisory: Option<CoercionAdvisory>,
}

#[derive(Debug, Clone, Copy)]
pub struct SpaceResolver<'r> {
    registry: &'r SpaceRegistry,
}

impl SpaceResolver<'static> {
    pub fn standard() -> Self {
        Self::new(SpaceRegistry::standard())
    }
}

impl<'r> SpaceResolver<'r> {
    pub fn new(registry: &'r SpaceRegistry) -> Self {
        Self { registry }
    }

    /// Parse `name` or `name:param=value`.
    ///
    /// The base name is not checked against the registry here unless it
    /// carries a parameter; see [`validate`](Self::validate).
    pub fn parse(&self, raw: &str) -> Result<SpaceIdentifier, SpaceError> {
        let mut parts = raw.split(':');
        let base = parts.next().unwrap_or_default();
        let Some(suffix) = parts.next() else {
            return Ok(SpaceIdentifier::new(base));
        };
        if parts.next().is_some() {
            return Err(SpaceError::TooManyColons(raw.to_string()));
        }

        let mut assignment = suffix.split('=');
        let (Some(name), Some(value), None) =
            (assignment.next(), assignment.next(), assignment.next())
        else {
            return Err(SpaceError::MalformedParameter(raw.to_string()));
        };

        let text = value;
        let value: f64 = value
            .trim()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| SpaceError::InvalidValue {
                raw: raw.to_string(),
                value: value.to_string(),
            })?;

        let expected = self
            .registry
            .required_parameter(base)
            .ok_or_else(|| SpaceError::NotParameterized {
                base: base.to_string(),
                valid: self.registry.parameterized_names(),
            })?;
        if name != expected {
            return Err(SpaceError::WrongParameter {
                base: base.to_string(),
                expected,
                got: name.to_string(),
            });
        }

        Ok(SpaceIdentifier::parsed(base, name, text, value))
    }

    /// The base name must be registered, and carry its parameter when the
    /// registry says it takes one.
    pub fn validate(&self, id: &SpaceIdentifier) -> Result<(), SpaceError> {
        if !self.registry.is_registered(id.base()) {
            return Err(SpaceError::UnknownSpace {
                name: id.base().to_string(),
                valid: self.registry.all(),
            });
        }
        let required = self.registry.required_parameter(id.base());
        if let (Some(expected), None) = (required, id.parameter()) {
            return Err(SpaceError::MissingParameter {
                base: id.base().to_string(),
                expected,
            });
        }
        Ok(())
    }

    /// [`parse`](Self::parse) then [`validate`](Self::validate).
    pub fn parse_valid(&self, raw: &str) -> Result<SpaceIdentifier, SpaceError> {
        let id = self.parse(raw)?;
        self.validate(&id)?;
        Ok(id)
    }

    /// Layout to index `data_layout` data under `id`: sparse when the data is
    /// sparse or the space is a sparse one.
    pub fn infer_layout(&self, id: &SpaceIdentifier, data_layout: DataLayout) -> DataLayout {
        if data_layout == DataLayout::Sparse
            || self.registry.contains(DataLayout::Sparse, id.base())
        {
            DataLayout::Sparse
        } else {
            DataLayout::Dense
        }
    }

    /// Rewrite `id` for `layout`.
    ///
    /// Names already valid for `layout` come back unchanged. Otherwise, with
    /// `coerce` set, the registered counterpart is substituted, keeping the
    /// parameter. A `_fast` sibling of the counterpart produces an advisory,
    /// which is also logged.
    pub fn resolve_for_layout(
        &self,
        id: &SpaceIdentifier,
        layout: DataLayout,
        coerce: bool,
    ) -> Result<Resolution, SpaceError> {
        if self.registry.contains(layout, id.base()) {
            return Ok(Resolution {
                space: id.clone(),
                advisory: None,
            });
        }

        let counterpart = if coerce {
            self.registry.counterpart(id.base(), layout)
        } else {
            None
        };
        let Some(target) = counterpart else {
            return Err(SpaceError::InvalidForLayout {
                space: id.to_string(),
                layout,
                valid: self.registry.spaces(layout).to_vec(),
            });
        };

        let advisory = self
            .registry
            .fast_variant(target, layout)
            .map(|fast| CoercionAdvisory {
                requested: id.base().to_string(),
                converted: target.to_string(),
                fast,
            });
        if let Some(advisory) = &advisory {
            tracing::warn!(
                requested = %advisory.requested,
                converted = %advisory.converted,
                fast = advisory.fast,
                "{advisory}"
            );
        }

        Ok(Resolution {
            space: id.rebased(target),
            advisory,
        })
    }
}
