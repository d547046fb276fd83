//! Structural response matching
//!
//! Response bodies carry no type tag, so their identity is inferred from
//! their key set: a mapping is consistent with a definition when all of its
//! keys are declared properties and every required property is present. Two
//! mappings match when some definition is consistent with both.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};

use crate::resolver::Resolver;
use crate::spec::{ScalarType, Shape, Specification};

/// Property-name fingerprints of every closed definition, built once per
/// loaded specification.
#[derive(Debug, Clone, Default)]
pub struct DefinitionIndex {
    /// Property name → definitions declaring it.
    by_property: HashMap<String, BTreeSet<String>>,
    /// Definition → its required properties.
    required: HashMap<String, BTreeSet<String>>,
}

impl DefinitionIndex {
    pub fn new(spec: &Specification) -> Self {
        let mut index = Self::default();
        for def in spec
            .definitions
            .values()
            .filter(|d| !d.is_open_map() && d.alias.is_none())
        {
            for prop in def.properties.keys() {
                index
                    .by_property
                    .entry(prop.clone())
                    .or_default()
                    .insert(def.name.clone());
            }
            index
                .required
                .insert(def.name.clone(), def.required.iter().cloned().collect());
        }
        index
    }

    /// Definitions whose property set covers the mapping's keys and whose
    /// required properties all appear among them.
    pub fn candidates(&self, object: &Map<String, Value>) -> BTreeSet<String> {
        let mut keys = object.keys();
        let mut found: BTreeSet<String> = match keys.next() {
            Some(first) => self.by_property.get(first).cloned().unwrap_or_default(),
            None => self.required.keys().cloned().collect(),
        };
        for key in keys {
            if found.is_empty() {
                break;
            }
            match self.by_property.get(key) {
                Some(defs) => found.retain(|name| defs.contains(name)),
                None => found.clear(),
            }
        }
        found.retain(|name| {
            self.required
                .get(name)
                .is_some_and(|req| req.iter().all(|r| object.contains_key(r)))
        });
        found
    }
}

/// Decides whether an observed body is consistent with a declared shape.
#[derive(Debug, Clone)]
pub struct DefinitionMatcher<'a> {
    spec: &'a Specification,
    index: DefinitionIndex,
    examples: Resolver<'a>,
}

impl<'a> DefinitionMatcher<'a> {
    pub fn new(spec: &'a Specification) -> Self {
        Self {
            spec,
            index: DefinitionIndex::new(spec),
            examples: Resolver::new(spec, false),
        }
    }

    /// `true` when `observed` is consistent with `expected`.
    pub fn matches(&self, expected: &Shape, observed: &Value) -> bool {
        let expected = self.spec.unalias(expected);

        // Open maps have arbitrary keys; only their values can be checked.
        if let Some(values) = self.open_map_values(expected) {
            return observed
                .as_object()
                .is_some_and(|map| map.values().all(|v| self.conforms(values, v)));
        }

        match (*expected == Shape::Empty, is_absent(observed)) {
            (true, true) => return true,
            (true, false) | (false, true) => return false,
            (false, false) => {}
        }

        match expected {
            Shape::Any => true,
            // Only the first element is compared.
            Shape::Array(inner) => match observed.as_array() {
                Some(items) => items.first().map_or(true, |first| self.matches(inner, first)),
                None => false,
            },
            _ => self.matches_values(&self.examples.example_for(expected), observed),
        }
    }

    /// Compare two untyped values. Symmetric when both are mappings.
    pub fn matches_values(&self, expected: &Value, observed: &Value) -> bool {
        match (expected, observed) {
            (Value::Object(a), Value::Object(b)) => {
                !self
                    .index
                    .candidates(a)
                    .is_disjoint(&self.index.candidates(b))
            }
            (Value::String(_), Value::String(_)) => true,
            (a, b) => kind(a) == kind(b),
        }
    }

    fn open_map_values(&self, shape: &Shape) -> Option<&'a Shape> {
        match shape {
            Shape::Definition(name) => self.spec.definitions.get(name)?.open_map.as_ref(),
            _ => None,
        }
    }

    /// Whether a single value satisfies a declared value type.
    fn conforms(&self, shape: &Shape, value: &Value) -> bool {
        match shape {
            Shape::Any | Shape::File => true,
            Shape::Empty => value.is_null(),
            Shape::Scalar(ScalarType::String) => value.is_string(),
            Shape::Scalar(ScalarType::Integer) => value.is_i64() || value.is_u64(),
            Shape::Scalar(ScalarType::Number) => value.is_number(),
            Shape::Scalar(ScalarType::Boolean) => value.is_boolean(),
            Shape::Array(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| self.conforms(inner, v))),
            Shape::Definition(_) => self.matches(shape, value),
        }
    }
}

/// No body: JSON `null` or empty text.
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Kind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

fn kind(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::Array,
        Value::Object(_) => Kind::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TypeDefinition;
    use serde_json::json;

    fn spec() -> Specification {
        Specification::new("http", "localhost", "/")
            .definition(
                TypeDefinition::new("Pet")
                    .property("id", Shape::Scalar(ScalarType::Integer))
                    .property("name", Shape::Scalar(ScalarType::String))
                    .property("status", Shape::Scalar(ScalarType::String))
                    .required(["name"]),
            )
            .definition(
                TypeDefinition::new("Tag")
                    .property("id", Shape::Scalar(ScalarType::Integer))
                    .property("name", Shape::Scalar(ScalarType::String)),
            )
            .definition(
                TypeDefinition::new("ApiError")
                    .property("code", Shape::Scalar(ScalarType::Integer))
                    .property("message", Shape::Scalar(ScalarType::String))
                    .required(["code", "message"]),
            )
            .definition(TypeDefinition::new("Inventory").open_map(Shape::Scalar(ScalarType::Integer)))
    }

    #[test]
    fn open_map_checks_every_value() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        let inventory = Shape::definition("Inventory");

        assert!(m.matches(&inventory, &json!({ "a": 1, "b": 2 })));
        assert!(!m.matches(&inventory, &json!({ "a": 1, "b": "two" })));
        assert!(!m.matches(&inventory, &json!([1, 2])));
    }

    #[test]
    fn open_map_match_does_not_use_property_index() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        let observed = json!({ "a": 1, "b": 2 });

        // No closed definition declares `a` or `b`.
        assert!(m.index.candidates(observed.as_object().unwrap()).is_empty());
        assert!(m.matches(&Shape::definition("Inventory"), &observed));
    }

    #[test]
    fn empty_expected_and_empty_observed_match() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        assert!(m.matches(&Shape::Empty, &Value::Null));
        assert!(m.matches(&Shape::Empty, &json!("")));
    }

    #[test]
    fn one_side_empty_does_not_match() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        assert!(!m.matches(&Shape::Empty, &json!({ "code": 1, "message": "x" })));
        assert!(!m.matches(&Shape::definition("ApiError"), &Value::Null));
        assert!(!m.matches(&Shape::definition("ApiError"), &json!("")));
    }

    #[test]
    fn empty_observed_array_always_matches() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        for inner in [
            Shape::definition("Pet"),
            Shape::Scalar(ScalarType::Boolean),
            Shape::array_of(Shape::definition("Tag")),
        ] {
            assert!(m.matches(&Shape::array_of(inner), &json!([])));
        }
    }

    #[test]
    fn array_compares_first_element_only() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        let pets = Shape::array_of(Shape::definition("Pet"));

        assert!(m.matches(&pets, &json!([{ "id": 1, "name": "rex" }, 17])));
        assert!(!m.matches(&pets, &json!([17, { "id": 1, "name": "rex" }])));
        assert!(!m.matches(&pets, &json!({ "id": 1, "name": "rex" })));
    }

    #[test]
    fn scalars_compare_by_kind() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        assert!(m.matches(&Shape::Scalar(ScalarType::Integer), &json!(3.5)));
        assert!(m.matches(&Shape::Scalar(ScalarType::Boolean), &json!(false)));
        assert!(!m.matches(&Shape::Scalar(ScalarType::Boolean), &json!(1)));
        assert!(m.matches(&Shape::Scalar(ScalarType::String), &json!("plain text")));
        assert!(!m.matches(&Shape::definition("ApiError"), &json!("plain text")));
    }

    #[test]
    fn mapping_matches_through_shared_definition() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        let error = Shape::definition("ApiError");

        assert!(m.matches(&error, &json!({ "code": 404, "message": "missing" })));
        // Missing a required property.
        assert!(!m.matches(&error, &json!({ "message": "missing" })));
        // Undeclared key.
        assert!(!m.matches(&error, &json!({ "code": 1, "message": "m", "trace": "t" })));
    }

    #[test]
    fn named_array_and_scalar_definitions_match_their_targets() {
        let spec = spec()
            .definition(TypeDefinition::new("Pets").alias(Shape::array_of(Shape::definition("Pet"))))
            .definition(TypeDefinition::new("Status").alias(Shape::Scalar(ScalarType::String)))
            .definition(TypeDefinition::new("Animal").alias(Shape::definition("Pet")));
        let m = DefinitionMatcher::new(&spec);
        let pets = Shape::definition("Pets");

        assert!(m.matches(&pets, &json!([])));
        assert!(m.matches(&pets, &json!([{ "name": "rex" }])));
        assert!(!m.matches(&pets, &json!({ "name": "rex" })));
        assert!(m.matches(&Shape::definition("Status"), &json!("sold")));
        assert!(!m.matches(&Shape::definition("Status"), &json!(3)));
        assert!(m.matches(&Shape::definition("Animal"), &json!({ "id": 1, "name": "rex" })));
    }

    #[test]
    fn alias_definitions_are_not_fingerprinted() {
        let spec = spec().definition(TypeDefinition::new("Status").alias(Shape::Scalar(ScalarType::String)));
        let index = DefinitionIndex::new(&spec);
        let names: Vec<String> = index.candidates(&Map::new()).into_iter().collect();
        assert_eq!(names, ["Tag"]);
    }

    #[test]
    fn overlapping_definitions_are_all_candidates() {
        let spec = spec();
        let index = DefinitionIndex::new(&spec);
        let found = index.candidates(json!({ "id": 1, "name": "x" }).as_object().unwrap());
        let names: Vec<&str> = found.iter().map(String::as_str).collect();
        assert_eq!(names, ["Pet", "Tag"]);
    }

    #[test]
    fn empty_mapping_matches_definitions_without_required_fields() {
        let spec = spec();
        let index = DefinitionIndex::new(&spec);
        let found = index.candidates(&Map::new());
        let names: Vec<&str> = found.iter().map(String::as_str).collect();
        assert_eq!(names, ["Tag"]);
    }

    #[test]
    fn mapping_comparison_is_symmetric() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        let samples = [
            json!({ "id": 1, "name": "a" }),
            json!({ "name": "a", "status": "sold" }),
            json!({ "id": 1 }),
            json!({ "code": 1, "message": "m" }),
            json!({ "unknown": true }),
            json!({}),
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(
                    m.matches_values(a, b),
                    m.matches_values(b, a),
                    "asymmetric for {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn any_shape_accepts_any_body() {
        let spec = spec();
        let m = DefinitionMatcher::new(&spec);
        assert!(m.matches(&Shape::Any, &json!({ "whatever": [1, 2] })));
        assert!(m.matches(&Shape::Any, &json!(3)));
    }
}
