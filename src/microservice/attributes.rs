//! Attribute validation against a microservice definition

use serde_json::{Map, Value};

use super::types::{AttributeSet, AttributeValue, MicroserviceDefinition, MicroserviceId};
use crate::error::ValidationError;

/// Raw attributes as submitted by the registrant
pub type RawAttributes = Map<String, Value>;

/// An attribute set that passed validation for one specific definition
///
/// Only [`validate`] constructs this, so holding one proves the values are
/// well-typed and complete for `microservice`
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAttributes {
    microservice: MicroserviceId,
    attributes: AttributeSet,
}

impl ValidatedAttributes {
    /// Definition these attributes were validated against
    #[must_use]
    pub const fn microservice(&self) -> &MicroserviceId {
        &self.microservice
    }

    /// The validated values
    #[must_use]
    pub const fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Consume into the plain attribute set
    #[must_use]
    pub fn into_set(self) -> AttributeSet {
        self.attributes
    }
}

/// Validate raw attributes against a definition
///
/// Mandatory attributes are checked first, in declaration order, then every
/// supplied value in name order. A `null` value counts as absent.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found
pub fn validate(
    definition: &MicroserviceDefinition,
    raw: &RawAttributes,
) -> Result<ValidatedAttributes, ValidationError> {
    let microservice = definition.id.to_string();

    for spec in definition.attributes.iter().filter(|s| s.mandatory) {
        if raw.get(&spec.name).is_none_or(Value::is_null) {
            return Err(ValidationError::MissingAttribute {
                microservice,
                name: spec.name.clone(),
            });
        }
    }

    let mut attributes = AttributeSet::new();
    for (name, value) in raw {
        if value.is_null() {
            continue;
        }

        let typed = match definition.attribute(name) {
            Some(spec) => AttributeValue::coerce(value, spec.kind).ok_or_else(|| {
                ValidationError::TypeMismatch {
                    name: name.clone(),
                    expected: spec.kind.to_string(),
                    found: json_kind(value).to_string(),
                }
            })?,
            None if definition.extensible => {
                AttributeValue::infer(value).ok_or_else(|| ValidationError::TypeMismatch {
                    name: name.clone(),
                    expected: "string, int, float, bool or list".to_string(),
                    found: json_kind(value).to_string(),
                })?
            }
            None => {
                return Err(ValidationError::UnknownAttribute {
                    microservice,
                    name: name.clone(),
                });
            }
        };

        attributes.insert(name.clone(), typed);
    }

    Ok(ValidatedAttributes {
        microservice: definition.id.clone(),
        attributes,
    })
}

/// Narrow request attributes to the ones a definition declares
///
/// Used when one request configures every microservice of a pattern.
/// Extensible definitions receive everything.
#[must_use]
pub fn scope_to(definition: &MicroserviceDefinition, raw: &RawAttributes) -> RawAttributes {
    if definition.extensible {
        return raw.clone();
    }
    raw.iter()
        .filter(|(name, _)| definition.attribute(name).is_some())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Reject attributes that no definition of a pattern declares
///
/// Runs before [`scope_to`] narrows the request, so a misspelled name fails
/// here instead of being dropped. Any extensible definition accepts every
/// name. A `null` value counts as absent.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownAttribute`] naming `owner`
pub fn check_declared(
    owner: &str,
    definitions: &[MicroserviceDefinition],
    raw: &RawAttributes,
) -> Result<(), ValidationError> {
    if definitions.iter().any(|d| d.extensible) {
        return Ok(());
    }

    let undeclared = raw.iter().find(|(name, value)| {
        !value.is_null() && definitions.iter().all(|d| d.attribute(name).is_none())
    });

    match undeclared {
        Some((name, _)) => Err(ValidationError::UnknownAttribute {
            microservice: owner.to_string(),
            name: name.clone(),
        }),
        None => Ok(()),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::microservice::types::{AttributeSpec, AttributeType, PolicyRole};

    fn definition(extensible: bool) -> MicroserviceDefinition {
        MicroserviceDefinition {
            id: MicroserviceId::new("org", "sensor-svc", "1.0", "amd64"),
            label: "Sensor".to_string(),
            description: None,
            attributes: vec![
                AttributeSpec {
                    name: "pollInterval".to_string(),
                    kind: AttributeType::Int,
                    mandatory: true,
                    policy: PolicyRole::Property,
                },
                AttributeSpec {
                    name: "threshold".to_string(),
                    kind: AttributeType::Float,
                    mandatory: false,
                    policy: PolicyRole::Property,
                },
                AttributeSpec {
                    name: "region".to_string(),
                    kind: AttributeType::String,
                    mandatory: false,
                    policy: PolicyRole::Constraint,
                },
            ],
            dependencies: vec![],
            extensible,
        }
    }

    fn raw(value: serde_json::Value) -> RawAttributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_complete_well_typed_attributes() {
        let validated = validate(
            &definition(false),
            &raw(json!({"pollInterval": 30, "threshold": 2, "region": "eu"})),
        )
        .unwrap();

        let attrs = validated.attributes();
        assert_eq!(attrs.get("pollInterval"), Some(&AttributeValue::Int(30)));
        assert_eq!(attrs.get("threshold"), Some(&AttributeValue::Float(2.0)));
        assert_eq!(
            attrs.get("region"),
            Some(&AttributeValue::String("eu".to_string()))
        );
        assert_eq!(validated.microservice().name, "sensor-svc");
    }

    #[test]
    fn missing_mandatory_attribute_is_named() {
        let err = validate(&definition(false), &raw(json!({"threshold": 1.5}))).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingAttribute {
                microservice: "org/sensor-svc/1.0/amd64".to_string(),
                name: "pollInterval".to_string(),
            }
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let err = validate(&definition(false), &raw(json!({"pollInterval": null}))).unwrap_err();
        assert_eq!(err.attribute(), "pollInterval");
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let err = validate(&definition(false), &raw(json!({"pollInterval": "30"}))).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeMismatch { ref name, ref expected, .. }
                if name == "pollInterval" && expected == "int"
        ));
    }

    #[test]
    fn unknown_attribute_rejected_unless_extensible() {
        let input = raw(json!({"pollInterval": 30, "color": "red"}));

        let err = validate(&definition(false), &input).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::UnknownAttribute { ref name, .. } if name == "color"
        ));

        let validated = validate(&definition(true), &input).unwrap();
        assert_eq!(
            validated.attributes().get("color"),
            Some(&AttributeValue::String("red".to_string()))
        );
    }

    #[test]
    fn scope_drops_undeclared_attributes() {
        let input = raw(json!({"pollInterval": 30, "gpsAccuracy": 5}));

        let scoped = scope_to(&definition(false), &input);
        assert!(scoped.contains_key("pollInterval"));
        assert!(!scoped.contains_key("gpsAccuracy"));

        assert_eq!(scope_to(&definition(true), &input).len(), 2);
    }

    #[test]
    fn undeclared_pattern_attribute_is_rejected() {
        let mut other = definition(false);
        other.id = MicroserviceId::new("org", "gps", "2.0", "amd64");
        other.attributes.truncate(1);
        other.attributes[0].name = "highAccuracy".to_string();
        let definitions = [definition(false), other];

        let input = raw(json!({"pollInterval": 30, "highAccuracy": true}));
        check_declared("org/weather", &definitions, &input).unwrap();

        let input = raw(json!({"pollInterval": 30, "regoin": "eu", "unset": null}));
        let err = check_declared("org/weather", &definitions, &input).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownAttribute {
                microservice: "org/weather".to_string(),
                name: "regoin".to_string(),
            }
        );
    }

    #[test]
    fn extensible_constituent_accepts_any_pattern_attribute() {
        let definitions = [definition(false), definition(true)];
        let input = raw(json!({"regoin": "eu"}));

        check_declared("org/weather", &definitions, &input).unwrap();
    }
}
