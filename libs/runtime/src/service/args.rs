use crate::error::{Result, RuntimeError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Positional arguments of one invocation
#[derive(Debug, Clone)]
pub struct Args {
    method: String,
    data: Vec<Value>,
}

impl Args {
    pub fn new(method: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            data,
        }
    }

    pub fn empty(method: impl Into<String>) -> Self {
        Self::new(method, Vec::new())
    }

    /// Argument `index`, which must be present and non-null
    pub fn required<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        match self.data.get(index) {
            Some(Value::Null) | None => Err(RuntimeError::invalid_argument(
                &self.method,
                format!("missing argument {}", index),
            )),
            Some(value) => self.convert(index, value),
        }
    }

    /// Argument `index`; absent and null both read as `None`
    pub fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        match self.data.get(index) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => self.convert(index, value).map(Some),
        }
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.data.get(index)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn convert<T: DeserializeOwned>(&self, index: usize, value: &Value) -> Result<T> {
        serde_json::from_value(value.clone()).map_err(|e| {
            RuntimeError::invalid_argument(&self.method, format!("argument {}: {}", index, e))
        })
    }
}
