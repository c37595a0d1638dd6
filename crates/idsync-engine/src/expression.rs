//! Expression-based attribute flow.
//!
//! The engine only depends on the [`ExpressionEvaluator`] contract. The
//! bundled [`RhaiExpressionEvaluator`] runs each expression in a fresh,
//! sandboxed Rhai engine with the metaverse object's attributes exposed as
//! the `mv` map.

use rhai::{Engine, Scope};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use idsync_core::model::{ConnectedSystemObject, MetaverseObject};
use idsync_core::value::AttributeValue;

/// Error raised while evaluating an expression mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("Compilation error: {0}")]
    Compilation(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Unsupported result: {0}")]
    UnsupportedResult(String),
}

/// Attribute values an expression can read, keyed by attribute name.
///
/// Single values are exposed as scalars, multiple values as arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionContext {
    pub metaverse: Map<String, Value>,
    pub connected_system: Map<String, Value>,
}

impl ExpressionContext {
    #[must_use]
    pub fn for_metaverse_object(mvo: &MetaverseObject) -> Self {
        Self {
            metaverse: to_attribute_map(
                mvo.attribute_values
                    .iter()
                    .filter(|v| !v.value.is_empty())
                    .map(|v| (v.attribute_name.as_str(), &v.value)),
            ),
            connected_system: Map::new(),
        }
    }

    #[must_use]
    pub fn with_connected_system_object(mut self, cso: &ConnectedSystemObject) -> Self {
        self.connected_system = to_attribute_map(
            cso.attribute_values
                .iter()
                .filter(|v| !v.value.is_empty())
                .map(|v| (v.attribute_name.as_str(), &v.value)),
        );
        self
    }
}

fn to_attribute_map<'a>(values: impl Iterator<Item = (&'a str, &'a AttributeValue)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in values {
        let json = value.to_json();
        match map.get_mut(name) {
            None => {
                map.insert(name.to_string(), json);
            }
            Some(Value::Array(items)) => items.push(json),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, json]);
            }
        }
    }
    map
}

/// Evaluates the expression of an expression-based mapping.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` against `context`.
    ///
    /// An empty result means the target attribute should hold no value.
    fn evaluate(
        &self,
        expression: &str,
        context: &ExpressionContext,
    ) -> Result<Vec<AttributeValue>, ExpressionError>;
}

/// Default maximum number of operations in the Rhai engine.
const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Default maximum call stack depth.
const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 64;

/// Default maximum string size in bytes.
const DEFAULT_MAX_STRING_SIZE: usize = 65536;

/// Default maximum array size.
const DEFAULT_MAX_ARRAY_SIZE: usize = 10_000;

/// Default maximum map size.
const DEFAULT_MAX_MAP_SIZE: usize = 10_000;

/// Resource limits for the Rhai sandbox.
#[derive(Debug, Clone)]
pub struct RhaiEvaluatorConfig {
    pub max_operations: u64,
    pub max_call_stack_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for RhaiEvaluatorConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_stack_depth: DEFAULT_MAX_CALL_STACK_DEPTH,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
        }
    }
}

/// Rhai-backed expression evaluator.
///
/// A fresh engine is built per evaluation so no state leaks between records.
#[derive(Debug, Clone, Default)]
pub struct RhaiExpressionEvaluator {
    config: RhaiEvaluatorConfig,
}

impl RhaiExpressionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: RhaiEvaluatorConfig) -> Self {
        Self { config }
    }

    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_operations(self.config.max_operations);
        engine.set_max_call_levels(self.config.max_call_stack_depth);
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_array_size(self.config.max_array_size);
        engine.set_max_map_size(self.config.max_map_size);
        engine.set_strict_variables(true);

        engine
    }

    fn build_scope(context: &ExpressionContext) -> Result<Scope<'static>, ExpressionError> {
        let mut scope = Scope::new();
        let mv = rhai::serde::to_dynamic(&context.metaverse)
            .map_err(|e| ExpressionError::Runtime(e.to_string()))?;
        let cs = rhai::serde::to_dynamic(&context.connected_system)
            .map_err(|e| ExpressionError::Runtime(e.to_string()))?;
        scope.push_constant("mv", mv);
        scope.push_constant("cs", cs);
        Ok(scope)
    }
}

impl ExpressionEvaluator for RhaiExpressionEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        context: &ExpressionContext,
    ) -> Result<Vec<AttributeValue>, ExpressionError> {
        let engine = self.create_engine();
        let mut scope = Self::build_scope(context)?;

        let ast = engine
            .compile_with_scope(&scope, expression)
            .map_err(|e| ExpressionError::Compilation(e.to_string()))?;

        let result = engine
            .eval_ast_with_scope::<rhai::Dynamic>(&mut scope, &ast)
            .map_err(|e| ExpressionError::Runtime(e.to_string()))?;

        let json: Value = rhai::serde::from_dynamic(&result)
            .map_err(|e| ExpressionError::UnsupportedResult(e.to_string()))?;

        let values = flatten_result(json)?;
        debug!(count = values.len(), "Evaluated expression mapping");
        Ok(values)
    }
}

fn flatten_result(json: Value) -> Result<Vec<AttributeValue>, ExpressionError> {
    match json {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.extend(flatten_result(item)?);
            }
            Ok(values)
        }
        Value::Object(_) => Err(ExpressionError::UnsupportedResult(
            "maps cannot be assigned to an attribute".to_string(),
        )),
        scalar => AttributeValue::from_json(&scalar)
            .map(|v| if v.is_empty() { Vec::new() } else { vec![v] })
            .ok_or_else(|| ExpressionError::UnsupportedResult(scalar.to_string())),
    }
}
