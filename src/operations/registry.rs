//! Operation registry: constructing operations from parameter records.
//!
//! The authoring side of the node graph hands the engine an operation
//! kind plus a flat parameter record; everything the engine needs is that
//! each kind can be constructed from such a record. Buffer-backed sources
//! are the exception and are bound programmatically.

use crate::core::error::{GraphError, GraphResult};
use crate::core::geometry::Size;
use crate::graph::operation::{Operation, Signature};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One parameter value in a record.
///
/// Untagged so JSON records stay flat: numbers, booleans, strings and
/// 3- or 4-element float arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer parameter.
    Int(i64),
    /// Float parameter.
    Float(f32),
    /// Per-channel triple (e.g. lift/gamma/gain).
    Vec3([f32; 3]),
    /// RGBA color.
    Color([f32; 4]),
    /// Free-form text.
    Text(String),
}

/// A flat parameter record for constructing one operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(HashMap<String, ParamValue>);

impl Params {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, builder-style.
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Set a parameter.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    /// Raw lookup.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Float parameter, coercing integers; `default` when absent.
    pub fn float_or(&self, name: &str, default: f32) -> f32 {
        match self.0.get(name) {
            Some(ParamValue::Float(f)) => *f,
            Some(ParamValue::Int(i)) => *i as f32,
            _ => default,
        }
    }

    /// Integer parameter; `default` when absent.
    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        match self.0.get(name) {
            Some(ParamValue::Int(i)) => *i,
            _ => default,
        }
    }

    /// Boolean parameter; `default` when absent.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.0.get(name) {
            Some(ParamValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// Triple parameter; `default` when absent.
    pub fn vec3_or(&self, name: &str, default: [f32; 3]) -> [f32; 3] {
        match self.0.get(name) {
            Some(ParamValue::Vec3(v)) => *v,
            _ => default,
        }
    }

    /// Color parameter; `default` when absent.
    pub fn color_or(&self, name: &str, default: [f32; 4]) -> [f32; 4] {
        match self.0.get(name) {
            Some(ParamValue::Color(c)) => *c,
            _ => default,
        }
    }

    /// Text parameter.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Optional `width`/`height` pair as a size.
    pub fn size(&self) -> Option<Size> {
        let width = self.int_or("width", 0);
        let height = self.int_or("height", 0);
        if width > 0 && height > 0 {
            Some(Size::new(width as u32, height as u32))
        } else {
            None
        }
    }
}

/// Factory function creating an operation from a parameter record.
pub type OperationFactory = Arc<dyn Fn(&Params) -> Box<dyn Operation> + Send + Sync>;

/// Registry entry with the factory and a cached signature.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: OperationFactory,
    /// Signature of a default-constructed instance.
    pub signature: Signature,
}

/// Registry of operation kinds constructible from parameter records.
pub struct OperationRegistry {
    entries: IndexMap<String, RegistryEntry>,
}

impl OperationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in operations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::operations::register_all(&mut registry);
        registry
    }

    /// Register an operation kind.
    ///
    /// `kind` must match the signature kind the factory produces.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&Params) -> Box<dyn Operation> + Send + Sync + 'static,
    {
        // Default-construct once to capture the signature.
        let signature = factory(&Params::new()).signature();
        self.entries.insert(
            kind.to_string(),
            RegistryEntry {
                factory: Arc::new(factory),
                signature,
            },
        );
    }

    /// Create an operation from a kind tag and parameter record.
    pub fn create(&self, kind: &str, params: &Params) -> GraphResult<Box<dyn Operation>> {
        let entry = self
            .entries
            .get(kind)
            .ok_or_else(|| GraphError::UnknownKind(kind.to_string()))?;
        Ok((entry.factory)(params))
    }

    /// Signature of a kind without creating an instance.
    pub fn signature(&self, kind: &str) -> Option<&Signature> {
        self.entries.get(kind).map(|e| &e.signature)
    }

    /// Whether a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// All registered kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
