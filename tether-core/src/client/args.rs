//! Argument normalization for remote requests
//!
//! A request carries `{args}` where `args` is either an ordered sequence or a
//! keyed bag. Scalars are wrapped into a one-element sequence; an absent
//! argument omits `args` entirely.

use serde_json::{Map, Value, json};

/// Arguments of a remote call
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Args {
    /// No arguments
    #[default]
    None,
    /// Ordered positional arguments
    Positional(Vec<Value>),
    /// A single bag of named arguments
    Named(Map<String, Value>),
}

impl Args {
    /// Normalize a single argument value.
    ///
    /// Arrays stay positional, objects become a keyed bag and any other scalar
    /// is wrapped into a one-element sequence. `null` means no arguments: the
    /// request is sent as `{}` rather than `{"args": null}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::Array(items) => Self::Positional(items),
            Value::Object(map) => Self::Named(map),
            scalar => Self::Positional(vec![scalar]),
        }
    }

    /// Normalize the arguments of a method-style call.
    ///
    /// Exactly one object argument collapses to a keyed bag; anything else is
    /// passed as the full positional sequence.
    pub fn from_call(mut args: Vec<Value>) -> Self {
        if args.len() == 1
            && args[0].is_object()
            && let Some(Value::Object(map)) = args.pop()
        {
            return Self::Named(map);
        }
        Self::Positional(args)
    }

    /// Wire payload for this request.
    pub fn into_payload(self) -> Value {
        match self {
            Self::None => json!({}),
            Self::Positional(items) => json!({ "args": items }),
            Self::Named(map) => json!({ "args": map }),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Value> for Args {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Vec<Value>> for Args {
    fn from(items: Vec<Value>) -> Self {
        Self::Positional(items)
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self::Named(map)
    }
}

impl From<&str> for Args {
    fn from(value: &str) -> Self {
        Self::Positional(vec![Value::from(value)])
    }
}

impl From<String> for Args {
    fn from(value: String) -> Self {
        Self::Positional(vec![Value::from(value)])
    }
}

impl From<i64> for Args {
    fn from(value: i64) -> Self {
        Self::Positional(vec![Value::from(value)])
    }
}

impl From<f64> for Args {
    fn from(value: f64) -> Self {
        Self::Positional(vec![Value::from(value)])
    }
}

impl From<bool> for Args {
    fn from(value: bool) -> Self {
        Self::Positional(vec![Value::from(value)])
    }
}

impl<T: Into<Args>> From<Option<T>> for Args {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}
