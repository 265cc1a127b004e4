//! A single stored document.

use serde_json::Value;

use crate::transform::PathExpr;

/// One named unit of structured content.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    data: Value,
}

impl Document {
    pub(crate) fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read-only view of the document data.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Replace the data wholesale. Only the owning namespace calls this.
    pub(crate) fn update(&mut self, data: Value) {
        self.data = data;
    }

    /// Rewrite every node matched by `path` with `f`, in place.
    ///
    /// On failure the document is left as it was.
    pub fn apply<F>(&mut self, path: &PathExpr, f: F) -> Result<usize, String>
    where
        F: FnMut(Value) -> Result<Value, String>,
    {
        path.apply(&mut self.data, f)
    }

    pub fn into_data(self) -> Value {
        self.data
    }
}
