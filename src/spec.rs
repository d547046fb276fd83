//! Swagger 2.0 JSON → contract model
//!
//! Parses a Swagger document into a `Specification`: operations keyed by
//! path and method, their parameters and declared responses, and the named
//! type definitions used to recognise response bodies by shape.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{SpecError, UnknownMethod};

/// HTTP methods a Swagger path item can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
}

impl HttpMethod {
    /// Path item order from the Swagger 2.0 document format.
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
    ];

    /// Lowercase key used in the document (`"get"`, `"post"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// Where a parameter travels in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
}

impl ParamLocation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
}

/// Declared shape of a parameter, property or response body.
///
/// Shapes are only compared structurally; nothing is ever deserialized
/// into them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Shape {
    /// No body, or a type the loader does not recognise.
    Empty,
    /// A schema with no type constraint.
    Any,
    Scalar(ScalarType),
    /// Reference to a named `TypeDefinition`.
    Definition(String),
    Array(Box<Shape>),
    File,
}

impl Shape {
    pub fn definition(name: impl Into<String>) -> Self {
        Self::Definition(name.into())
    }

    pub fn array_of(inner: Shape) -> Self {
        Self::Array(Box::new(inner))
    }

    fn scalar(type_name: &str) -> Self {
        match type_name {
            "string" => Self::Scalar(ScalarType::String),
            "integer" => Self::Scalar(ScalarType::Integer),
            "number" => Self::Scalar(ScalarType::Number),
            "boolean" => Self::Scalar(ScalarType::Boolean),
            "file" => Self::File,
            _ => Self::Empty,
        }
    }

    fn referenced_definitions<'s>(&'s self, out: &mut Vec<&'s str>) {
        match self {
            Self::Definition(name) => out.push(name),
            Self::Array(inner) => inner.referenced_definitions(out),
            _ => {}
        }
    }
}

/// One property of a `TypeDefinition`.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub shape: Shape,
    pub example: Option<Value>,
    pub default: Option<Value>,
}

impl Property {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            example: None,
            default: None,
        }
    }
}

/// A named, reusable object shape.
///
/// Definitions declared as an array, a scalar or a bare `$ref` carry no
/// properties; `alias` holds the shape they stand for.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct TypeDefinition {
    pub name: String,
    /// Declared properties, in document order.
    pub properties: IndexMap<String, Property>,
    pub required: Vec<String>,
    /// Value shape of an arbitrary-keyed map (`additionalProperties`).
    pub open_map: Option<Shape>,
    /// Declared `example` for the whole object.
    pub example: Option<Value>,
    pub alias: Option<Shape>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: IndexMap::new(),
            required: Vec::new(),
            open_map: None,
            example: None,
            alias: None,
        }
    }

    pub fn property(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.properties.insert(name.into(), Property::new(shape));
        self
    }

    pub fn property_with_example(
        mut self,
        name: impl Into<String>,
        shape: Shape,
        example: Value,
    ) -> Self {
        let mut prop = Property::new(shape);
        prop.example = Some(example);
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn open_map(mut self, values: Shape) -> Self {
        self.open_map = Some(values);
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn alias(mut self, shape: Shape) -> Self {
        self.alias = Some(shape);
        self
    }

    pub fn is_open_map(&self) -> bool {
        self.open_map.is_some()
    }
}

/// A single declared parameter of an operation.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParamLocation,
    pub shape: Shape,
    pub required: bool,
    pub example: Option<Value>,
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, location: ParamLocation, shape: Shape) -> Self {
        Self {
            name: name.into(),
            location,
            shape,
            required: location == ParamLocation::Path,
            example: None,
            default: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Key of an operation's response map: a status code or `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResponseKey {
    Status(u16),
    Default,
}

impl fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "{code}"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// One (path, method) pair of the specification.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Operation {
    pub method: HttpMethod,
    /// Path template relative to the base path (e.g. "/pets/{petId}")
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: String,
    /// Parameters in declaration order, unique by name.
    pub parameters: IndexMap<String, ParameterSpec>,
    pub responses: IndexMap<ResponseKey, Shape>,
}

impl Operation {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            operation_id: None,
            summary: String::new(),
            parameters: IndexMap::new(),
            responses: IndexMap::new(),
        }
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    pub fn param(mut self, param: ParameterSpec) -> Self {
        self.parameters.insert(param.name.clone(), param);
        self
    }

    pub fn response(mut self, key: ResponseKey, shape: Shape) -> Self {
        self.responses.insert(key, shape);
        self
    }

    /// Expected shape for `status`: the exact entry, else `default`.
    pub fn response_for(&self, status: u16) -> Option<&Shape> {
        self.responses
            .get(&ResponseKey::Status(status))
            .or_else(|| self.responses.get(&ResponseKey::Default))
    }
}

/// The parsed API contract. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Specification {
    pub scheme: String,
    pub host: String,
    pub base_path: String,
    pub paths: IndexMap<String, IndexMap<HttpMethod, Operation>>,
    pub definitions: IndexMap<String, TypeDefinition>,
}

impl Specification {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            base_path: base_path.into(),
            paths: IndexMap::new(),
            definitions: IndexMap::new(),
        }
    }

    pub fn definition(mut self, def: TypeDefinition) -> Self {
        self.definitions.insert(def.name.clone(), def);
        self
    }

    pub fn operation(mut self, op: Operation) -> Self {
        self.insert_operation(op);
        self
    }

    fn insert_operation(&mut self, op: Operation) {
        self.paths
            .entry(op.path.clone())
            .or_default()
            .insert(op.method, op);
    }

    /// All operations, in document order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.paths.values().flat_map(|methods| methods.values())
    }

    /// Follow definition aliases down to the shape they name. Alias cycles
    /// stop at the last definition visited.
    pub fn unalias<'s>(&'s self, shape: &'s Shape) -> &'s Shape {
        let mut current = shape;
        for _ in 0..=self.definitions.len() {
            let Shape::Definition(name) = current else {
                break;
            };
            match self.definitions.get(name).and_then(|d| d.alias.as_ref()) {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    /// `scheme://host` as declared by the document.
    pub fn default_base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Check the invariants a run relies on.
    pub fn validate(&self) -> Result<(), SpecError> {
        for (field, value) in [
            ("schemes", &self.scheme),
            ("host", &self.host),
            ("basePath", &self.base_path),
        ] {
            if value.is_empty() {
                return Err(SpecError::MissingField { field });
            }
        }

        let mut referenced = Vec::new();
        for op in self.operations() {
            let bodies = op
                .parameters
                .values()
                .filter(|p| p.location == ParamLocation::Body)
                .count();
            if bodies > 1 {
                return Err(SpecError::DuplicateBody {
                    method: op.method,
                    path: op.path.clone(),
                });
            }

            for name in path_placeholders(&op.path) {
                let bound = op.parameters.get(name).is_some_and(|p| {
                    p.location == ParamLocation::Path && p.required
                });
                if !bound {
                    return Err(SpecError::UnboundPlaceholder {
                        method: op.method,
                        path: op.path.clone(),
                        name: name.to_string(),
                    });
                }
            }

            for param in op.parameters.values() {
                param.shape.referenced_definitions(&mut referenced);
            }
            for shape in op.responses.values() {
                shape.referenced_definitions(&mut referenced);
            }
        }
        for def in self.definitions.values() {
            for prop in def.properties.values() {
                prop.shape.referenced_definitions(&mut referenced);
            }
            for shape in def.open_map.iter().chain(def.alias.iter()) {
                shape.referenced_definitions(&mut referenced);
            }
        }

        match referenced
            .into_iter()
            .find(|name| !self.definitions.contains_key(*name))
        {
            Some(missing) => Err(SpecError::UnresolvedReference {
                reference: format!("#/definitions/{missing}"),
            }),
            None => Ok(()),
        }
    }

    /// Parse a Swagger 2.0 document.
    pub fn from_swagger(doc: &Value) -> Result<Self, SpecError> {
        let scheme = doc
            .get("schemes")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .ok_or(SpecError::MissingField { field: "schemes" })?;
        let host = doc
            .get("host")
            .and_then(|v| v.as_str())
            .ok_or(SpecError::MissingField { field: "host" })?;
        let base_path = doc
            .get("basePath")
            .and_then(|v| v.as_str())
            .ok_or(SpecError::MissingField { field: "basePath" })?;

        let mut loader = Loader {
            root: doc,
            definitions: IndexMap::new(),
        };

        if let Some(defs) = doc.get("definitions").and_then(|v| v.as_object()) {
            for (name, schema) in defs {
                let def = loader.definition(name, schema)?;
                loader.definitions.insert(name.clone(), def);
            }
        }

        let mut spec = Specification::new(scheme, host, base_path);

        if let Some(paths) = doc.get("paths").and_then(|v| v.as_object()) {
            for (path, item) in paths {
                let path_level = item.get("parameters");
                for method in HttpMethod::ALL {
                    let Some(raw) = item.get(method.as_str()) else {
                        continue;
                    };
                    let op = loader.operation(path, method, raw, path_level)?;
                    spec.insert_operation(op);
                }
            }
        }

        spec.definitions = loader.definitions;
        spec.validate()?;
        Ok(spec)
    }
}

/// Names of the `{placeholder}` segments of a path template, in order.
pub fn path_placeholders(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

struct Loader<'a> {
    root: &'a Value,
    definitions: IndexMap<String, TypeDefinition>,
}

impl<'a> Loader<'a> {
    fn operation(
        &mut self,
        path: &str,
        method: HttpMethod,
        raw: &'a Value,
        path_level: Option<&'a Value>,
    ) -> Result<Operation, SpecError> {
        let mut op = Operation::new(method, path);
        op.operation_id = raw
            .get("operationId")
            .and_then(|v| v.as_str())
            .map(String::from);
        op.summary = raw
            .get("summary")
            .or_else(|| raw.get("description"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        // Operation-level parameters override path-level ones of the same name.
        for source in [path_level, raw.get("parameters")].into_iter().flatten() {
            let params = source
                .as_array()
                .ok_or_else(|| SpecError::InvalidParameters {
                    method,
                    path: path.to_string(),
                })?;
            for param in params {
                let param = self.deref(param, "parameters")?;
                if let Some(spec) = self.parameter(method, path, param)? {
                    if spec.location == ParamLocation::Body
                        && op.parameters.values().any(|p| {
                            p.location == ParamLocation::Body && p.name != spec.name
                        })
                    {
                        return Err(SpecError::DuplicateBody {
                            method,
                            path: path.to_string(),
                        });
                    }
                    op.parameters.insert(spec.name.clone(), spec);
                }
            }
        }

        if let Some(responses) = raw.get("responses").and_then(|v| v.as_object()) {
            for (key, response) in responses {
                let key = match key.as_str() {
                    "default" => ResponseKey::Default,
                    code => match code.parse::<u16>() {
                        Ok(code) => ResponseKey::Status(code),
                        Err(_) => continue,
                    },
                };
                let response = self.deref(response, "responses")?;
                let shape = match response.get("schema") {
                    Some(schema) => self.schema_shape(schema, &format!("{method} {path} {key}"))?,
                    None => Shape::Empty,
                };
                op.responses.insert(key, shape);
            }
        }

        Ok(op)
    }

    fn parameter(
        &mut self,
        method: HttpMethod,
        path: &str,
        raw: &'a Value,
    ) -> Result<Option<ParameterSpec>, SpecError> {
        let (Some(name), Some(location)) = (
            raw.get("name").and_then(|v| v.as_str()),
            raw.get("in")
                .and_then(|v| v.as_str())
                .and_then(ParamLocation::parse),
        ) else {
            return Ok(None);
        };

        let shape = if location == ParamLocation::Body {
            let schema = raw.get("schema").unwrap_or(&Value::Null);
            self.schema_shape(schema, &format!("{method} {path} {name}"))?
        } else {
            param_type_shape(raw)
        };

        let mut spec = ParameterSpec::new(name, location, shape);
        if let Some(required) = raw.get("required").and_then(|v| v.as_bool()) {
            spec.required = required;
        }
        spec.example = raw.get("x-example").or_else(|| raw.get("example")).cloned();
        spec.default = raw.get("default").cloned();
        Ok(Some(spec))
    }

    /// Follow a local `$ref` into `#/<section>/<name>`.
    fn deref(&self, value: &'a Value, section: &str) -> Result<&'a Value, SpecError> {
        let Some(reference) = value.get("$ref").and_then(|v| v.as_str()) else {
            return Ok(value);
        };
        reference
            .strip_prefix(&format!("#/{section}/"))
            .and_then(|name| self.root.get(section)?.get(name))
            .ok_or_else(|| SpecError::UnresolvedReference {
                reference: reference.to_string(),
            })
    }

    /// Convert a schema to a `Shape`, registering inline object schemas as
    /// definitions named `inline_name`.
    fn schema_shape(&mut self, schema: &'a Value, inline_name: &str) -> Result<Shape, SpecError> {
        if let Some(reference) = schema.get("$ref").and_then(|v| v.as_str()) {
            return reference
                .strip_prefix("#/definitions/")
                .map(Shape::definition)
                .ok_or_else(|| SpecError::UnresolvedReference {
                    reference: reference.to_string(),
                });
        }

        let has_structure = is_object_schema(schema);

        match schema.get("type").and_then(|v| v.as_str()) {
            Some("array") => {
                let items = schema.get("items").unwrap_or(&Value::Null);
                let inner = self.schema_shape(items, &format!("{inline_name}[]"))?;
                Ok(Shape::array_of(inner))
            }
            Some("object") | None if has_structure => {
                let def = self.definition(inline_name, schema)?;
                self.definitions.insert(inline_name.to_string(), def);
                Ok(Shape::definition(inline_name))
            }
            Some("object") | None => Ok(Shape::Any),
            Some(other) => Ok(Shape::scalar(other)),
        }
    }

    fn definition(&mut self, name: &str, schema: &'a Value) -> Result<TypeDefinition, SpecError> {
        let mut def = TypeDefinition::new(name);
        def.example = schema.get("example").cloned();

        let declared_type = schema.get("type").and_then(|v| v.as_str());
        if schema.get("$ref").is_some()
            || (!is_object_schema(schema) && declared_type.is_some_and(|t| t != "object"))
        {
            def.alias = Some(self.schema_shape(schema, name)?);
            return Ok(def);
        }

        // allOf members contribute their properties and required lists first.
        if let Some(members) = schema.get("allOf").and_then(|v| v.as_array()) {
            for (i, member) in members.iter().enumerate() {
                let member = self.deref(member, "definitions")?;
                let part = self.definition(&format!("{name}.allOf[{i}]"), member)?;
                def.properties.extend(part.properties);
                for req in part.required {
                    if !def.required.contains(&req) {
                        def.required.push(req);
                    }
                }
                if def.open_map.is_none() {
                    def.open_map = part.open_map;
                }
            }
        }

        if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
            for (prop_name, prop_schema) in props {
                let shape = self.schema_shape(prop_schema, &format!("{name}.{prop_name}"))?;
                def.properties.insert(
                    prop_name.clone(),
                    Property {
                        shape,
                        example: prop_schema.get("example").cloned(),
                        default: prop_schema.get("default").cloned(),
                    },
                );
            }
        }

        let required = schema
            .get("required")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str());
        for req in required {
            if !def.required.iter().any(|r| r == req) {
                def.required.push(req.to_string());
            }
        }

        if let Some(values) = schema
            .get("additionalProperties")
            .filter(|v| v.is_object())
        {
            def.open_map = Some(self.schema_shape(values, &format!("{name}.*"))?);
        }
        // Declared properties win over an open map.
        if !def.properties.is_empty() {
            def.open_map = None;
        }

        Ok(def)
    }
}

/// Object-like: declares properties, an `additionalProperties` schema or an
/// `allOf` composition.
fn is_object_schema(schema: &Value) -> bool {
    schema.get("properties").is_some()
        || schema.get("allOf").is_some()
        || schema
            .get("additionalProperties")
            .is_some_and(|v| v.is_object())
}

/// Shape of a non-body parameter, declared inline with `type`/`items`.
fn param_type_shape(raw: &Value) -> Shape {
    match raw.get("type").and_then(|v| v.as_str()) {
        Some("array") => {
            let items = raw.get("items").unwrap_or(&Value::Null);
            Shape::array_of(param_type_shape(items))
        }
        Some(other) => Shape::scalar(other),
        None => Shape::Empty,
    }
}
