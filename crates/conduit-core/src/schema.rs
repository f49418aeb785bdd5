//! Model/relationship metadata (spec §3, §4.C) and its invariant check.
//!
//! `Schema` is pure data, consulted by the cache's integrity processor to
//! know which relationships are `hasOne` vs `hasMany`, which declare an
//! inverse, and which cascade a remove to their related records.

use std::collections::HashMap;

use conduit_api::ConduitError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipKind {
    HasOne,
    HasMany,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependentRule {
    /// Removing the owning record also removes every related record.
    Remove,
}

#[derive(Clone, Debug)]
pub struct RelationshipDescriptor {
    pub kind: RelationshipKind,
    /// The related model's name.
    pub model: String,
    /// The relationship name on the related model that points back, if any.
    pub inverse: Option<String>,
    pub dependent: Option<DependentRule>,
}

impl RelationshipDescriptor {
    pub fn has_one(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasOne,
            model: model.into(),
            inverse: None,
            dependent: None,
        }
    }

    pub fn has_many(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            model: model.into(),
            inverse: None,
            dependent: None,
        }
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn with_dependent(mut self, rule: DependentRule) -> Self {
        self.dependent = Some(rule);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelSchema {
    pub attributes: Vec<String>,
    pub relationships: HashMap<String, RelationshipDescriptor>,
}

impl ModelSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, descriptor: RelationshipDescriptor) -> Self {
        self.relationships.insert(name.into(), descriptor);
        self
    }
}

/// The full set of model descriptors a cache/source pair is configured
/// with. Built once at startup and shared (read-only) thereafter.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    models: HashMap<String, ModelSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, name: impl Into<String>, model: ModelSchema) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn model(&self, type_: &str) -> Option<&ModelSchema> {
        self.models.get(type_)
    }

    pub fn relationship(&self, type_: &str, name: &str) -> Option<&RelationshipDescriptor> {
        self.models.get(type_)?.relationships.get(name)
    }

    /// Check the inverse-consistency invariant from spec §3: if relationship
    /// `R` on model `M` declares `inverse: R'` on model `M'`, then `M'` must
    /// exist, declare `R'`, whose own inverse is `R`, and whose cardinality
    /// is the mirror of `R`'s (a `hasMany` side implies a `hasOne` or
    /// `hasMany` inverse, consistently both ways).
    pub fn validate(&self) -> Result<(), ConduitError> {
        for (model_name, model) in &self.models {
            for (rel_name, descriptor) in &model.relationships {
                let Some(inverse_name) = &descriptor.inverse else {
                    continue;
                };
                let related_model = self.models.get(&descriptor.model).ok_or_else(|| {
                    ConduitError::SchemaError {
                        reason: format!(
                            "{model_name}.{rel_name} points at unknown model \"{}\"",
                            descriptor.model
                        ),
                    }
                })?;
                let inverse_descriptor =
                    related_model.relationships.get(inverse_name).ok_or_else(|| {
                        ConduitError::SchemaError {
                            reason: format!(
                                "{model_name}.{rel_name} declares inverse \"{inverse_name}\" on \
                                 \"{}\", but it has no such relationship",
                                descriptor.model
                            ),
                        }
                    })?;
                if inverse_descriptor.inverse.as_deref() != Some(rel_name.as_str()) {
                    return Err(ConduitError::SchemaError {
                        reason: format!(
                            "{model_name}.{rel_name} <-> {}.{inverse_name} inverse declarations disagree",
                            descriptor.model
                        ),
                    });
                }
                if inverse_descriptor.model != *model_name {
                    return Err(ConduitError::SchemaError {
                        reason: format!(
                            "{}.{inverse_name} points at \"{}\", expected \"{model_name}\"",
                            descriptor.model, inverse_descriptor.model
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet_schema() -> Schema {
        Schema::new()
            .with_model(
                "planet",
                ModelSchema::new().with_relationship(
                    "inhabitants",
                    RelationshipDescriptor::has_many("inhabitant")
                        .with_inverse("planet")
                        .with_dependent(DependentRule::Remove),
                ),
            )
            .with_model(
                "inhabitant",
                ModelSchema::new()
                    .with_relationship("planet", RelationshipDescriptor::has_one("planet").with_inverse("inhabitants")),
            )
    }

    #[test]
    fn consistent_inverse_pair_validates() {
        assert!(planet_schema().validate().is_ok());
    }

    #[test]
    fn missing_inverse_model_is_rejected() {
        let schema = Schema::new().with_model(
            "planet",
            ModelSchema::new().with_relationship(
                "inhabitants",
                RelationshipDescriptor::has_many("inhabitant").with_inverse("planet"),
            ),
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn mismatched_inverse_name_is_rejected() {
        let schema = Schema::new()
            .with_model(
                "planet",
                ModelSchema::new().with_relationship(
                    "inhabitants",
                    RelationshipDescriptor::has_many("inhabitant").with_inverse("homeworld"),
                ),
            )
            .with_model(
                "inhabitant",
                ModelSchema::new()
                    .with_relationship("planet", RelationshipDescriptor::has_one("planet").with_inverse("inhabitants")),
            );
        assert!(schema.validate().is_err());
    }
}
