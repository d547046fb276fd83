//! Parameter declarations → concrete example values
//!
//! Every value is either taken from the document (example, then default) or
//! synthesized from the declared shape. Resolution never fails: a shape with
//! nothing to go on resolves to `null`.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::spec::{Operation, ParameterSpec, ScalarType, Shape, Specification};

pub const STRING_PLACEHOLDER: &str = "string";
pub const INTEGER_PLACEHOLDER: i64 = 42;
pub const NUMBER_PLACEHOLDER: f64 = 5.5;
pub const UPLOAD_FILE_NAME: &str = "file.txt";
const UPLOAD_CONTENTS: &[u8] = b"swagger-conform upload\n";

/// Nesting limit for self-referencing definitions.
const MAX_DEPTH: usize = 8;

/// A file sent as a multipart attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileAttachment {
    pub filename: String,
    #[serde(skip)]
    pub contents: Vec<u8>,
}

impl FileAttachment {
    pub fn new(filename: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            contents: contents.into(),
        }
    }

    fn placeholder() -> Self {
        Self::new(UPLOAD_FILE_NAME, UPLOAD_CONTENTS)
    }
}

/// Resolved value of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Json(Value),
    File(FileAttachment),
}

impl ParamValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::File(_) => None,
        }
    }
}

/// Parameter name → value, in declaration order.
pub type ResolvedParams = IndexMap<String, ParamValue>;

/// Resolve every parameter of `op`. Deterministic for a given operation.
pub fn resolve_parameters(spec: &Specification, op: &Operation, use_examples: bool) -> ResolvedParams {
    Resolver::new(spec, use_examples).resolve(op)
}

/// Produces example values from shapes and type definitions.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    spec: &'a Specification,
    use_examples: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(spec: &'a Specification, use_examples: bool) -> Self {
        Self { spec, use_examples }
    }

    pub fn resolve(&self, op: &Operation) -> ResolvedParams {
        op.parameters
            .iter()
            .map(|(name, param)| (name.clone(), self.parameter(param)))
            .collect()
    }

    pub fn parameter(&self, param: &ParameterSpec) -> ParamValue {
        if param.shape == Shape::File {
            return ParamValue::File(FileAttachment::placeholder());
        }
        let value = self
            .declared(param.example.as_ref(), param.default.as_ref())
            .unwrap_or_else(|| self.example_for(&param.shape));
        ParamValue::Json(value)
    }

    /// Canonical example of a shape. Arrays get exactly one element.
    pub fn example_for(&self, shape: &Shape) -> Value {
        self.shape_at(shape, 0)
    }

    fn declared(&self, example: Option<&Value>, default: Option<&Value>) -> Option<Value> {
        example.filter(|_| self.use_examples).or(default).cloned()
    }

    fn shape_at(&self, shape: &Shape, depth: usize) -> Value {
        match shape {
            Shape::Empty => Value::Null,
            Shape::Any => json!({}),
            Shape::Scalar(scalar) => scalar_example(*scalar),
            Shape::File => Value::String(UPLOAD_FILE_NAME.to_string()),
            Shape::Array(inner) => Value::Array(vec![self.shape_at(inner, depth + 1)]),
            Shape::Definition(name) => self.definition_at(name, depth),
        }
    }

    fn definition_at(&self, name: &str, depth: usize) -> Value {
        let Some(def) = self.spec.definitions.get(name) else {
            return Value::Null;
        };
        if let Some(example) = def.example.as_ref().filter(|_| self.use_examples) {
            return example.clone();
        }
        if depth >= MAX_DEPTH {
            return Value::Null;
        }
        if let Some(target) = &def.alias {
            return self.shape_at(target, depth + 1);
        }
        if let Some(values) = &def.open_map {
            return json!({ "additionalProp1": self.shape_at(values, depth + 1) });
        }

        let mut obj = Map::new();
        for (prop_name, prop) in &def.properties {
            let value = self
                .declared(prop.example.as_ref(), prop.default.as_ref())
                .unwrap_or_else(|| self.shape_at(&prop.shape, depth + 1));
            obj.insert(prop_name.clone(), value);
        }
        Value::Object(obj)
    }
}

fn scalar_example(scalar: ScalarType) -> Value {
    match scalar {
        ScalarType::String => Value::String(STRING_PLACEHOLDER.to_string()),
        ScalarType::Integer => json!(INTEGER_PLACEHOLDER),
        ScalarType::Number => json!(NUMBER_PLACEHOLDER),
        ScalarType::Boolean => Value::Bool(true),
    }
}
