//! Flattening serialized records into analyzed fields.

use serde_json::Value as JsonValue;

/// One indexed field: dotted path plus the analyzed tokens of each value.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedField {
    pub path: String,
    pub values: Vec<Vec<String>>,
}

/// Analyzed form of one record, as the in-memory index stores it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedDocument {
    fields: Vec<IndexedField>,
}

impl IndexedDocument {
    pub fn from_json(value: &JsonValue) -> Self {
        let mut fields: Vec<IndexedField> = Vec::new();
        flatten(value, String::new(), &mut |path, text| {
            let tokens = analyze(&text);
            match fields.iter_mut().find(|f| f.path == path) {
                Some(field) => field.values.push(tokens),
                None => fields.push(IndexedField {
                    path,
                    values: vec![tokens],
                }),
            }
        });
        Self { fields }
    }

    pub fn fields(&self) -> &[IndexedField] {
        &self.fields
    }

    /// Fields addressed by `name`: an exact path or any path nested under it.
    /// `None` addresses every field.
    pub fn fields_named<'a>(&'a self, name: Option<&'a str>) -> impl Iterator<Item = &'a IndexedField> + 'a {
        self.fields.iter().filter(move |f| match name {
            None => true,
            Some(name) => {
                f.path == name
                    || f.path
                        .strip_prefix(name)
                        .is_some_and(|rest| rest.starts_with('.'))
            }
        })
    }
}

fn flatten(value: &JsonValue, path: String, sink: &mut impl FnMut(String, String)) {
    match value {
        JsonValue::Null => {}
        JsonValue::Bool(b) => sink(path, b.to_string()),
        JsonValue::Number(n) => sink(path, n.to_string()),
        JsonValue::String(s) => sink(path, s.clone()),
        JsonValue::Array(items) => {
            for item in items {
                flatten(item, path.clone(), sink);
            }
        }
        JsonValue::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten(child, child_path, sink);
            }
        }
    }
}

/// Lowercase alphanumeric tokens, the analysis applied to both documents and query terms.
pub fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
