// Copyright 2025 RADAR-base
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Schema evolution mapping
//
// Producers compile their records against a local schema, while the
// registry may list a newer or older schema for the same subject. An
// EvolutionMapping converts values of the local (source) schema into values
// of the registered (destination) schema so that records can be sent in the
// shape the server expects.
//
// A mapping is compiled once into a flat arena of transform nodes that
// reference each other by index, then applied to every record:
//
//   let mapping = EvolutionMapping::build(topic.value_schema(), metadata.schema())?;
//   let converted = mapping.apply(value)?;
//
// Whenever a conversion is impossible and the destination field declares a
// default value, the field is filled with that default instead.

use apache_avro::schema::{EnumSchema, Name, RecordSchema, UnionSchema};
use apache_avro::types::Value;
use apache_avro::Schema;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{ProducerError, Result};

type NodeId = usize;

/// Enum symbol used for values the destination enum does not know
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

impl NumericType {
    fn of(schema: &Schema) -> Option<Self> {
        match schema {
            Schema::Int => Some(NumericType::Int),
            Schema::Long => Some(NumericType::Long),
            Schema::Float => Some(NumericType::Float),
            Schema::Double => Some(NumericType::Double),
            _ => None,
        }
    }

    fn cast(self, value: &Value) -> Option<Value> {
        let converted = match (self, value) {
            (NumericType::Int, Value::Int(v)) => Value::Int(*v),
            (NumericType::Int, Value::Long(v)) => Value::Int(*v as i32),
            (NumericType::Int, Value::Float(v)) => Value::Int(*v as i32),
            (NumericType::Int, Value::Double(v)) => Value::Int(*v as i32),
            (NumericType::Long, Value::Int(v)) => Value::Long(i64::from(*v)),
            (NumericType::Long, Value::Long(v)) => Value::Long(*v),
            (NumericType::Long, Value::Float(v)) => Value::Long(*v as i64),
            (NumericType::Long, Value::Double(v)) => Value::Long(*v as i64),
            (NumericType::Float, Value::Int(v)) => Value::Float(*v as f32),
            (NumericType::Float, Value::Long(v)) => Value::Float(*v as f32),
            (NumericType::Float, Value::Float(v)) => Value::Float(*v),
            (NumericType::Float, Value::Double(v)) => Value::Float(*v as f32),
            (NumericType::Double, Value::Int(v)) => Value::Double(f64::from(*v)),
            (NumericType::Double, Value::Long(v)) => Value::Double(*v as f64),
            (NumericType::Double, Value::Float(v)) => Value::Double(f64::from(*v)),
            (NumericType::Double, Value::Double(v)) => Value::Double(*v),
            _ => return None,
        };
        Some(converted)
    }

    fn parse(self, text: &str) -> Option<Value> {
        let text = text.trim();
        match self {
            NumericType::Int => text.parse().ok().map(Value::Int),
            NumericType::Long => text.parse().ok().map(Value::Long),
            NumericType::Float => text.parse().ok().map(Value::Float),
            NumericType::Double => text.parse().ok().map(Value::Double),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldMapping {
    name: String,
    /// Name of the source field; `None` when `node` is a constant default
    source: Option<String>,
    node: NodeId,
}

/// One node of a compiled mapping
#[derive(Debug, Clone)]
enum Transform {
    Identity,
    Constant(Value),
    /// Non-union source into a union destination
    WrapUnion { index: u32, inner: NodeId },
    /// Nullable source into nullable destination
    UnionToUnion {
        null_index: Option<u32>,
        value_index: u32,
        inner: NodeId,
    },
    /// Nullable source into a non-union destination
    UnwrapUnion {
        inner: NodeId,
        default: Option<Value>,
    },
    Record(Vec<FieldMapping>),
    Array(NodeId),
    Map(NodeId),
    Enum {
        symbols: Vec<String>,
        fallback: Option<u32>,
    },
    NumericCast(NumericType),
    ParseNumber { target: NumericType, default: Value },
    ToText,
    Base64,
    TextToBytes,
    FixedToBytes,
    BytesToFixed { size: usize, default: Value },
}

/// Compiled conversion from values of one schema to values of another
#[derive(Debug, Clone)]
pub struct EvolutionMapping {
    nodes: Vec<Transform>,
    root: NodeId,
}

impl EvolutionMapping {
    /// Mapping that returns values unchanged
    pub fn identity() -> Self {
        Self {
            nodes: vec![Transform::Identity],
            root: 0,
        }
    }

    /// Compile a mapping from `source` values to `destination` values
    ///
    /// Fails with `SchemaIncompatible` when some destination field can
    /// neither be derived from the source nor filled with a default.
    pub fn build(source: &Schema, destination: &Schema) -> Result<Self> {
        MappingBuilder::new(source, destination).build()
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.nodes[self.root], Transform::Identity)
    }

    /// Number of compiled transform nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Convert a value of the source schema to the destination schema
    pub fn apply(&self, value: Value) -> Result<Value> {
        self.apply_node(self.root, value)
    }

    fn apply_node(&self, id: NodeId, value: Value) -> Result<Value> {
        match &self.nodes[id] {
            Transform::Identity => Ok(value),
            Transform::Constant(constant) => Ok(constant.clone()),
            Transform::WrapUnion { index, inner } => {
                let value = self.apply_node(*inner, unwrap_union(value))?;
                Ok(Value::Union(*index, Box::new(value)))
            }
            Transform::UnionToUnion {
                null_index,
                value_index,
                inner,
            } => match unwrap_union(value) {
                Value::Null => match null_index {
                    Some(index) => Ok(Value::Union(*index, Box::new(Value::Null))),
                    None => Err(incompatible_value("null", "non-nullable union")),
                },
                value => {
                    let value = self.apply_node(*inner, value)?;
                    Ok(Value::Union(*value_index, Box::new(value)))
                }
            },
            Transform::UnwrapUnion { inner, default } => match unwrap_union(value) {
                Value::Null => default
                    .clone()
                    .ok_or_else(|| incompatible_value("null", "non-nullable field")),
                value => self.apply_node(*inner, value),
            },
            Transform::Record(fields) => self.apply_record(fields, value),
            Transform::Array(items) => match value {
                Value::Array(values) => values
                    .into_iter()
                    .map(|v| self.apply_node(*items, v))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Err(incompatible_value(&kind_of(&other), "array")),
            },
            Transform::Map(values) => match value {
                Value::Map(entries) => entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.apply_node(*values, v)?)))
                    .collect::<Result<HashMap<_, _>>>()
                    .map(Value::Map),
                other => Err(incompatible_value(&kind_of(&other), "map")),
            },
            Transform::Enum { symbols, fallback } => {
                let symbol = match value {
                    Value::Enum(_, symbol) | Value::String(symbol) => symbol,
                    other => return Err(incompatible_value(&kind_of(&other), "enum")),
                };
                match symbols.iter().position(|s| *s == symbol) {
                    Some(index) => Ok(Value::Enum(index as u32, symbol)),
                    None => match fallback {
                        Some(index) => Ok(Value::Enum(*index, symbols[*index as usize].clone())),
                        None => Err(ProducerError::SchemaIncompatible(format!(
                            "enum symbol {} has no counterpart",
                            symbol
                        ))),
                    },
                }
            }
            Transform::NumericCast(target) => target
                .cast(&value)
                .ok_or_else(|| incompatible_value(&kind_of(&value), "number")),
            Transform::ParseNumber { target, default } => match value {
                Value::String(text) => Ok(target.parse(&text).unwrap_or_else(|| default.clone())),
                other => Err(incompatible_value(&kind_of(&other), "numeric string")),
            },
            Transform::ToText => match value {
                Value::String(text) => Ok(Value::String(text)),
                Value::Enum(_, symbol) => Ok(Value::String(symbol)),
                Value::Boolean(v) => Ok(Value::String(v.to_string())),
                Value::Int(v) => Ok(Value::String(v.to_string())),
                Value::Long(v) => Ok(Value::String(v.to_string())),
                Value::Float(v) => Ok(Value::String(v.to_string())),
                Value::Double(v) => Ok(Value::String(v.to_string())),
                other => Err(incompatible_value(&kind_of(&other), "string")),
            },
            Transform::Base64 => match value {
                Value::Bytes(bytes) | Value::Fixed(_, bytes) => {
                    Ok(Value::String(BASE64.encode(bytes)))
                }
                other => Err(incompatible_value(&kind_of(&other), "bytes")),
            },
            Transform::TextToBytes => match value {
                Value::String(text) => Ok(Value::Bytes(text.into_bytes())),
                other => Err(incompatible_value(&kind_of(&other), "string")),
            },
            Transform::FixedToBytes => match value {
                Value::Fixed(_, bytes) | Value::Bytes(bytes) => Ok(Value::Bytes(bytes)),
                other => Err(incompatible_value(&kind_of(&other), "fixed")),
            },
            Transform::BytesToFixed { size, default } => match value {
                Value::Bytes(bytes) | Value::Fixed(_, bytes) if bytes.len() == *size => {
                    Ok(Value::Fixed(*size, bytes))
                }
                Value::Bytes(_) | Value::Fixed(_, _) => Ok(default.clone()),
                other => Err(incompatible_value(&kind_of(&other), "bytes")),
            },
        }
    }

    fn apply_record(&self, fields: &[FieldMapping], value: Value) -> Result<Value> {
        let mut source = match value {
            Value::Record(source) => source,
            other => return Err(incompatible_value(&kind_of(&other), "record")),
        };

        let mut converted = Vec::with_capacity(fields.len());
        for field in fields {
            let input = match &field.source {
                Some(name) => match source.iter_mut().find(|(n, _)| n == name) {
                    Some((_, v)) => std::mem::replace(v, Value::Null),
                    None => {
                        return Err(ProducerError::SchemaIncompatible(format!(
                            "record value is missing field {}",
                            name
                        )))
                    }
                },
                None => Value::Null,
            };
            converted.push((field.name.clone(), self.apply_node(field.node, input)?));
        }
        Ok(Value::Record(converted))
    }
}

fn unwrap_union(value: Value) -> Value {
    match value {
        Value::Union(_, inner) => *inner,
        other => other,
    }
}

fn kind_of(value: &Value) -> String {
    let debug = format!("{:?}", value);
    debug
        .split(|c: char| c == '(' || c == ' ')
        .next()
        .unwrap_or("value")
        .to_string()
}

fn incompatible_value(actual: &str, expected: &str) -> ProducerError {
    ProducerError::SchemaIncompatible(format!("cannot convert {} value to {}", actual, expected))
}

fn incompatible(source: &Schema, destination: &Schema) -> ProducerError {
    ProducerError::SchemaIncompatible(format!(
        "cannot map {} to {}",
        source.canonical_form(),
        destination.canonical_form()
    ))
}

fn full_name(name: &Name) -> String {
    match &name.namespace {
        Some(namespace) if !namespace.is_empty() => format!("{}.{}", namespace, name.name),
        _ => name.name.clone(),
    }
}

/// Named types reachable from a schema, for resolving references
struct NamedTypes<'a> {
    types: HashMap<String, &'a Schema>,
}

impl<'a> NamedTypes<'a> {
    fn collect(schema: &'a Schema) -> Self {
        let mut named = Self {
            types: HashMap::new(),
        };
        named.visit(schema);
        named
    }

    fn visit(&mut self, schema: &'a Schema) {
        match schema {
            Schema::Record(record) => {
                if self.types.insert(full_name(&record.name), schema).is_none() {
                    for field in &record.fields {
                        self.visit(&field.schema);
                    }
                }
            }
            Schema::Enum(e) => {
                self.types.insert(full_name(&e.name), schema);
            }
            Schema::Fixed(f) => {
                self.types.insert(full_name(&f.name), schema);
            }
            Schema::Array(array) => self.visit(&array.items),
            Schema::Map(map) => self.visit(&map.types),
            Schema::Union(union) => {
                for variant in union.variants() {
                    self.visit(variant);
                }
            }
            _ => {}
        }
    }

    fn resolve(&self, schema: &'a Schema) -> &'a Schema {
        match schema {
            Schema::Ref { name } => self.types.get(&full_name(name)).copied().unwrap_or(schema),
            other => other,
        }
    }
}

/// Whether `schema` refers by name to one of `names`
fn references_any(schema: &Schema, names: &HashSet<String>) -> bool {
    match schema {
        Schema::Ref { name } => names.contains(&full_name(name)),
        Schema::Record(record) => record
            .fields
            .iter()
            .any(|field| references_any(&field.schema, names)),
        Schema::Array(array) => references_any(&array.items, names),
        Schema::Map(map) => references_any(&map.types, names),
        Schema::Union(union) => union.variants().iter().any(|v| references_any(v, names)),
        _ => false,
    }
}

/// Named types whose definition differs between source and destination
///
/// Canonical forms print references as bare names, so a type that only
/// refers to a changed type is marked changed as well.
fn changed_types(source: &NamedTypes<'_>, destination: &NamedTypes<'_>) -> HashSet<String> {
    let mut changed: HashSet<String> = source
        .types
        .iter()
        .filter(|(name, schema)| {
            destination
                .types
                .get(*name)
                .map_or(true, |other| other.canonical_form() != schema.canonical_form())
        })
        .map(|(name, _)| name.clone())
        .collect();

    loop {
        let referencing: Vec<String> = source
            .types
            .iter()
            .filter(|(name, schema)| !changed.contains(*name) && references_any(schema, &changed))
            .map(|(name, _)| name.clone())
            .collect();
        if referencing.is_empty() {
            return changed;
        }
        changed.extend(referencing);
    }
}

/// Compiles an [`EvolutionMapping`] for one source/destination pair
pub struct MappingBuilder<'a> {
    source: &'a Schema,
    destination: &'a Schema,
    source_types: NamedTypes<'a>,
    destination_types: NamedTypes<'a>,
    changed: HashSet<String>,
    nodes: Vec<Transform>,
    records: HashMap<(String, String), NodeId>,
}

impl<'a> MappingBuilder<'a> {
    pub fn new(source: &'a Schema, destination: &'a Schema) -> Self {
        let source_types = NamedTypes::collect(source);
        let destination_types = NamedTypes::collect(destination);
        let changed = changed_types(&source_types, &destination_types);
        Self {
            source,
            destination,
            source_types,
            destination_types,
            changed,
            nodes: Vec::new(),
            records: HashMap::new(),
        }
    }

    pub fn build(mut self) -> Result<EvolutionMapping> {
        if self.source.canonical_form() == self.destination.canonical_form() {
            return Ok(EvolutionMapping::identity());
        }
        let root = self.map(self.source, self.destination, None)?;
        debug!("Compiled schema mapping with {} nodes", self.nodes.len());
        Ok(EvolutionMapping {
            nodes: self.nodes,
            root,
        })
    }

    fn push(&mut self, transform: Transform) -> NodeId {
        self.nodes.push(transform);
        self.nodes.len() - 1
    }

    /// Map with a constant-default fallback when the conversion is impossible
    fn map_or_default(
        &mut self,
        source: &'a Schema,
        destination: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<NodeId> {
        match self.map(source, destination, default) {
            Ok(id) => Ok(id),
            Err(e) => match default {
                Some(default) => {
                    debug!("Using default value for unmappable field: {}", e);
                    let value = self.default_value(default, destination)?;
                    Ok(self.push(Transform::Constant(value)))
                }
                None => Err(e),
            },
        }
    }

    fn default_value(&self, default: &JsonValue, schema: &'a Schema) -> Result<Value> {
        let schema = self.destination_types.resolve(schema);
        Value::from(default.clone()).resolve(schema).map_err(|e| {
            ProducerError::SchemaIncompatible(format!(
                "default {} does not match {}: {}",
                default,
                schema.canonical_form(),
                e
            ))
        })
    }

    fn map(
        &mut self,
        source: &'a Schema,
        destination: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<NodeId> {
        let source = self.source_types.resolve(source);
        let destination = self.destination_types.resolve(destination);

        if source.canonical_form() == destination.canonical_form()
            && !references_any(source, &self.changed)
        {
            return Ok(self.push(Transform::Identity));
        }

        match (source, destination) {
            (Schema::Union(s), Schema::Union(d)) => self.map_union_to_union(s, d, default),
            (_, Schema::Union(d)) => {
                let (index, branch) = self.destination_branch(source, d)?;
                let inner = self.map(source, branch, non_null(default))?;
                Ok(self.push(Transform::WrapUnion { index, inner }))
            }
            (Schema::Union(s), _) => {
                let branch = single_non_null(s).ok_or_else(|| incompatible(source, destination))?;
                let inner = self.map(branch, destination, default)?;
                let default = match default {
                    Some(default) => Some(self.default_value(default, destination)?),
                    None => None,
                };
                Ok(self.push(Transform::UnwrapUnion { inner, default }))
            }
            (Schema::Record(s), Schema::Record(d)) => self.map_record(s, d),
            (Schema::Array(s), Schema::Array(d)) => {
                let items = self.map(&s.items, &d.items, None)?;
                Ok(self.push(Transform::Array(items)))
            }
            (Schema::Map(s), Schema::Map(d)) => {
                let values = self.map(&s.types, &d.types, None)?;
                Ok(self.push(Transform::Map(values)))
            }
            (_, Schema::Enum(d)) => self.map_enum(source, d, default),
            (_, Schema::Int | Schema::Long | Schema::Float | Schema::Double) => {
                self.map_numeric(source, destination, default)
            }
            (Schema::Int | Schema::Long | Schema::Float | Schema::Double, Schema::String)
            | (Schema::Boolean | Schema::Enum(_), Schema::String) => {
                Ok(self.push(Transform::ToText))
            }
            (Schema::Bytes | Schema::Fixed(_), Schema::String) => Ok(self.push(Transform::Base64)),
            (Schema::Fixed(_), Schema::Bytes) => Ok(self.push(Transform::FixedToBytes)),
            (Schema::String, Schema::Bytes) => Ok(self.push(Transform::TextToBytes)),
            (Schema::Fixed(s), Schema::Fixed(d)) if s.size == d.size => {
                Ok(self.push(Transform::Identity))
            }
            (Schema::Bytes, Schema::Fixed(d)) => {
                let default = default.ok_or_else(|| incompatible(source, destination))?;
                let default = self.default_value(default, destination)?;
                Ok(self.push(Transform::BytesToFixed {
                    size: d.size,
                    default,
                }))
            }
            _ => Err(incompatible(source, destination)),
        }
    }

    fn destination_branch(
        &self,
        source: &'a Schema,
        destination: &'a UnionSchema,
    ) -> Result<(u32, &'a Schema)> {
        let branches: Vec<(usize, &'a Schema)> = destination
            .variants()
            .iter()
            .enumerate()
            .filter(|(_, v)| !matches!(v, Schema::Null))
            .collect();

        let chosen = match branches.as_slice() {
            [single] => Some(*single),
            _ => branches.iter().copied().find(|(_, branch)| {
                self.destination_types.resolve(branch).canonical_form() == source.canonical_form()
            }),
        };

        chosen
            .map(|(index, branch)| (index as u32, branch))
            .ok_or_else(|| {
                ProducerError::SchemaIncompatible(format!(
                    "no union branch of {:?} accepts {}",
                    destination.variants(),
                    source.canonical_form()
                ))
            })
    }

    fn map_union_to_union(
        &mut self,
        source: &'a UnionSchema,
        destination: &'a UnionSchema,
        default: Option<&JsonValue>,
    ) -> Result<NodeId> {
        let source_branch = single_non_null(source).ok_or_else(|| {
            ProducerError::SchemaIncompatible(format!(
                "source union {:?} has more than one non-null branch",
                source.variants()
            ))
        })?;
        let (value_index, destination_branch) =
            self.destination_branch(self.source_types.resolve(source_branch), destination)?;
        let null_index = destination
            .variants()
            .iter()
            .position(|v| matches!(v, Schema::Null))
            .map(|i| i as u32);

        let inner = self.map(source_branch, destination_branch, non_null(default))?;
        Ok(self.push(Transform::UnionToUnion {
            null_index,
            value_index,
            inner,
        }))
    }

    fn map_record(
        &mut self,
        source: &'a RecordSchema,
        destination: &'a RecordSchema,
    ) -> Result<NodeId> {
        let key = (full_name(&source.name), full_name(&destination.name));
        if let Some(id) = self.records.get(&key) {
            return Ok(*id);
        }
        // Reserve the slot first so recursive types refer back to it
        let id = self.push(Transform::Identity);
        self.records.insert(key.clone(), id);

        match self.map_fields(source, destination) {
            Ok(fields) => {
                self.nodes[id] = Transform::Record(fields);
                Ok(id)
            }
            Err(e) => {
                self.records.remove(&key);
                Err(e)
            }
        }
    }

    fn map_fields(
        &mut self,
        source: &'a RecordSchema,
        destination: &'a RecordSchema,
    ) -> Result<Vec<FieldMapping>> {
        let mut fields = Vec::with_capacity(destination.fields.len());
        for field in &destination.fields {
            let matching = source.fields.iter().find(|f| {
                f.name == field.name
                    || field
                        .aliases
                        .as_ref()
                        .is_some_and(|aliases| aliases.contains(&f.name))
            });

            let mapping = match matching {
                Some(source_field) => FieldMapping {
                    name: field.name.clone(),
                    source: Some(source_field.name.clone()),
                    node: self.map_or_default(
                        &source_field.schema,
                        &field.schema,
                        field.default.as_ref(),
                    )?,
                },
                None => {
                    let default = field.default.as_ref().ok_or_else(|| {
                        ProducerError::SchemaIncompatible(format!(
                            "field {} of {} has no source field and no default",
                            field.name,
                            full_name(&destination.name)
                        ))
                    })?;
                    let value = self.default_value(default, &field.schema)?;
                    FieldMapping {
                        name: field.name.clone(),
                        source: None,
                        node: self.push(Transform::Constant(value)),
                    }
                }
            };
            fields.push(mapping);
        }
        Ok(fields)
    }

    fn map_enum(
        &mut self,
        source: &'a Schema,
        destination: &'a EnumSchema,
        default: Option<&JsonValue>,
    ) -> Result<NodeId> {
        let fallback = enum_fallback(destination, default);
        let symbols = destination.symbols.clone();

        match source {
            Schema::Enum(s) => {
                let complete = s.symbols.iter().all(|sym| symbols.contains(sym));
                if !complete && fallback.is_none() {
                    return Err(ProducerError::SchemaIncompatible(format!(
                        "enum {} lacks symbols of {} and has no default symbol",
                        full_name(&destination.name),
                        full_name(&s.name)
                    )));
                }
                Ok(self.push(Transform::Enum { symbols, fallback }))
            }
            Schema::String => {
                if fallback.is_none() {
                    return Err(ProducerError::SchemaIncompatible(format!(
                        "string cannot map to enum {} without a default symbol",
                        full_name(&destination.name)
                    )));
                }
                Ok(self.push(Transform::Enum { symbols, fallback }))
            }
            other => Err(ProducerError::SchemaIncompatible(format!(
                "cannot map {} to enum {}",
                other.canonical_form(),
                full_name(&destination.name)
            ))),
        }
    }

    fn map_numeric(
        &mut self,
        source: &'a Schema,
        destination: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<NodeId> {
        let target = NumericType::of(destination).ok_or_else(|| incompatible(source, destination))?;
        match source {
            Schema::Int | Schema::Long | Schema::Float | Schema::Double => {
                Ok(self.push(Transform::NumericCast(target)))
            }
            Schema::String => {
                let default = default.ok_or_else(|| incompatible(source, destination))?;
                let default = self.default_value(default, destination)?;
                Ok(self.push(Transform::ParseNumber { target, default }))
            }
            _ => Err(incompatible(source, destination)),
        }
    }
}

fn non_null(default: Option<&JsonValue>) -> Option<&JsonValue> {
    default.filter(|d| !d.is_null())
}

fn single_non_null(union: &UnionSchema) -> Option<&Schema> {
    let mut branches = union.variants().iter().filter(|v| !matches!(v, Schema::Null));
    match (branches.next(), branches.next()) {
        (Some(branch), None) => Some(branch),
        _ => None,
    }
}

/// Symbol used for unmapped values: UNKNOWN, else the enum or field default
fn enum_fallback(destination: &EnumSchema, default: Option<&JsonValue>) -> Option<u32> {
    let position = |symbol: &str| {
        destination
            .symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| i as u32)
    };

    position(UNKNOWN_SYMBOL)
        .or_else(|| destination.default.as_deref().and_then(position))
        .or_else(|| match default {
            Some(JsonValue::String(symbol)) => position(symbol),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_casts() {
        assert_eq!(NumericType::Long.cast(&Value::Int(4)), Some(Value::Long(4)));
        assert_eq!(NumericType::Int.cast(&Value::Double(4.7)), Some(Value::Int(4)));
        assert_eq!(NumericType::Double.cast(&Value::Float(0.5)), Some(Value::Double(0.5)));
        assert_eq!(NumericType::Float.cast(&Value::String("1".to_string())), None);
    }

    #[test]
    fn test_numeric_parse() {
        assert_eq!(NumericType::Int.parse(" 12 "), Some(Value::Int(12)));
        assert_eq!(NumericType::Double.parse("1.5"), Some(Value::Double(1.5)));
        assert_eq!(NumericType::Long.parse("abc"), None);
    }

    #[test]
    fn test_enum_fallback_prefers_unknown() {
        let schema = Schema::parse_str(
            r#"{"type":"enum","name":"E","symbols":["A","UNKNOWN","B"],"default":"B"}"#,
        )
        .unwrap();
        if let Schema::Enum(e) = &schema {
            assert_eq!(enum_fallback(e, None), Some(1));
        } else {
            panic!("expected enum");
        }
    }

    #[test]
    fn test_enum_fallback_uses_field_default() {
        let schema =
            Schema::parse_str(r#"{"type":"enum","name":"E","symbols":["A","B"]}"#).unwrap();
        if let Schema::Enum(e) = &schema {
            assert_eq!(enum_fallback(e, Some(&JsonValue::String("B".to_string()))), Some(1));
            assert_eq!(enum_fallback(e, None), None);
        } else {
            panic!("expected enum");
        }
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of(&Value::Int(3)), "Int");
        assert_eq!(kind_of(&Value::Null), "Null");
    }
}
