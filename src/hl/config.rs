//! Opaque backend configuration.
//!
//! A configuration is a JSON object that is handed to the storage backend verbatim. It can be
//! written as JSON or TOML text, or loaded from a file by passing `@path`:
//!
//! ```text
//! {"backend": "json", "json": {"indent": 2}}
//!
//! backend = "json"
//! [json]
//! indent = 2
//!
//! @config/series.toml
//! ```

use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::internal_prelude::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    value: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// An empty configuration.
    pub fn new() -> Self {
        Self { value: Value::Object(Map::new()) }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        ensure!(value.is_object(), "configuration must be an object, got: {}", value);
        Ok(Self { value })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;
        let value =
            serde_json::to_value(table).map_err(|e| Error::Backend(format!("toml error: {e}")))?;
        Self::from_value(value)
    }

    /// Loads a `.json` or `.toml` file; any other extension is sniffed like [`parse`].
    ///
    /// [`parse`]: Self::parse
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Backend(format!("cannot read config {}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("toml") => Self::from_toml(&text),
            _ => Self::parse_inline(&text),
        }
    }

    /// Parses configuration text: `@path` loads a file, text starting with `{` is JSON,
    /// anything else is TOML. Blank text is an empty configuration.
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().strip_prefix('@') {
            Some(path) => Self::from_file(path.trim()),
            None => Self::parse_inline(text),
        }
    }

    fn parse_inline(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            Ok(Self::new())
        } else if text.starts_with('{') {
            Self::from_json(text)
        } else {
            Self::from_toml(text)
        }
    }

    /// The requested backend name (the top-level `"backend"` key), if any.
    pub fn backend(&self) -> Option<&str> {
        self.value.get("backend").and_then(Value::as_str)
    }

    /// Looks up a dotted path such as `"json.indent"`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.value, |value, key| value.get(key))
    }

    /// A sub-object as its own configuration, e.g. the options for one backend.
    pub fn section(&self, name: &str) -> Option<Self> {
        self.value.get(name).filter(|v| v.is_object()).map(|v| Self { value: v.clone() })
    }

    /// Sets a value at a dotted path, creating intermediate objects.
    pub fn set<V: Into<Value>>(&mut self, path: &str, value: V) -> Result<()> {
        let keys: Vec<&str> = path.split('.').collect();
        ensure!(keys.iter().all(|k| !k.is_empty()), "invalid config path: {:?}", path);
        let (last, parents) = match keys.split_last() {
            Some(split) => split,
            None => fail!("invalid config path: {:?}", path),
        };
        let mut node = &mut self.value;
        for key in parents {
            let map = match node {
                Value::Object(map) => map,
                _ => fail!("config key {:?} is not an object", key),
            };
            node = map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
        }
        match node {
            Value::Object(map) => {
                map.insert(last.to_string(), value.into());
                Ok(())
            }
            _ => fail!("cannot set {:?}: parent is not an object", path),
        }
    }

    /// Deep-merges `other` into `self`; on conflicting leaves `other` wins.
    pub fn merge(&mut self, other: &Self) {
        merge_values(&mut self.value, &other.value);
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_object().map_or(true, Map::is_empty)
    }
}

fn merge_values(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        dst.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
