//! Payload validation gate.
//!
//! Validation only runs when the server forces it or the payload sets
//! `strict: true`; a client can opt in but never out. The bundled
//! [`SchemaValidator`] reports every problem it finds, in document order,
//! using JSON-pointer paths so clients can locate the offending node.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{
    payload::{Payload, json_kind},
    tree::{Orientation, Rgb, standard_page_size},
};

/// One structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub instance_path: String,
    pub keyword: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Vec<ValidationIssue>),
}

pub trait PayloadValidator: Send + Sync {
    fn validate(&self, payload: &Payload) -> ValidationOutcome;
}

/// Whether the gate applies to this payload.
pub fn requires_validation(force_validation: bool, payload: &Payload) -> bool {
    force_validation || payload.is_strict()
}

const CHILD_TYPES: [&str; 3] = ["view", "text", "break"];
const ORIENTATIONS: [&str; 2] = ["portrait", "landscape"];
const METADATA_FIELDS: [&str; 4] = ["title", "author", "subject", "keywords"];
const POSITIVE_STYLE_FIELDS: [&str; 2] = ["fontSize", "lineHeight"];
const NON_NEGATIVE_STYLE_FIELDS: [&str; 4] = ["marginTop", "marginBottom", "marginLeft", "padding"];

/// Validates document descriptions against the bundled document schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl PayloadValidator for SchemaValidator {
    fn validate(&self, payload: &Payload) -> ValidationOutcome {
        let mut walker = Walker::default();
        walker.document(payload.fields());
        if walker.issues.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid(walker.issues)
        }
    }
}

#[derive(Default)]
struct Walker {
    issues: Vec<ValidationIssue>,
}

impl Walker {
    fn report(&mut self, path: &str, keyword: &'static str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            instance_path: path.to_string(),
            keyword,
            message: message.into(),
        });
    }

    fn document(&mut self, fields: &Map<String, Value>) {
        for field in METADATA_FIELDS {
            if let Some(value) = fields.get(field) {
                self.expect_string(&format!("/{field}"), value);
            }
        }

        if let Some(strict) = fields.get("strict")
            && !strict.is_boolean()
        {
            self.report("/strict", "type", format!("must be boolean, found {}", json_kind(strict)));
        }

        self.page_geometry("", fields);

        match fields.get("content") {
            None => self.report("", "required", "must have required property 'content'"),
            Some(Value::Array(pages)) if pages.is_empty() => {
                self.report("/content", "minItems", "must NOT have fewer than 1 items")
            }
            Some(Value::Array(pages)) => {
                for (index, page) in pages.iter().enumerate() {
                    self.page(&format!("/content/{index}"), page);
                }
            }
            Some(other) => self.report(
                "/content",
                "type",
                format!("must be array, found {}", json_kind(other)),
            ),
        }
    }

    fn page(&mut self, path: &str, node: &Value) {
        let Some(fields) = self.expect_object(path, node) else {
            return;
        };

        match fields.get("type").and_then(Value::as_str) {
            Some("page") => {}
            Some(other) => self.report(
                &format!("{path}/type"),
                "const",
                format!("must be equal to 'page', found '{other}'"),
            ),
            None => self.report(path, "required", "must have required property 'type'"),
        }

        self.page_geometry(path, fields);
        self.style(path, fields);
        self.children(path, fields);
    }

    fn node(&mut self, path: &str, node: &Value) {
        let Some(fields) = self.expect_object(path, node) else {
            return;
        };

        let kind = match fields.get("type") {
            None => {
                self.report(path, "required", "must have required property 'type'");
                return;
            }
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => {
                self.report(
                    &format!("{path}/type"),
                    "type",
                    format!("must be string, found {}", json_kind(other)),
                );
                return;
            }
        };

        match kind {
            "view" => {
                self.style(path, fields);
                self.children(path, fields);
            }
            "text" => {
                match fields.get("value") {
                    None => self.report(path, "required", "must have required property 'value'"),
                    Some(value) => self.expect_string(&format!("{path}/value"), value),
                }
                self.style(path, fields);
            }
            "break" => {}
            other => self.report(
                &format!("{path}/type"),
                "enum",
                format!(
                    "must be equal to one of the allowed values ({}), found '{other}'",
                    CHILD_TYPES.join(", ")
                ),
            ),
        }
    }

    fn children(&mut self, path: &str, fields: &Map<String, Value>) {
        match fields.get("children") {
            None => {}
            Some(Value::Array(children)) => {
                for (index, child) in children.iter().enumerate() {
                    self.node(&format!("{path}/children/{index}"), child);
                }
            }
            Some(other) => self.report(
                &format!("{path}/children"),
                "type",
                format!("must be array, found {}", json_kind(other)),
            ),
        }
    }

    fn page_geometry(&mut self, path: &str, fields: &Map<String, Value>) {
        if let Some(size) = fields.get("pageSize") {
            self.page_size(&format!("{path}/pageSize"), size);
        }

        if let Some(orientation) = fields.get("orientation") {
            let path = format!("{path}/orientation");
            match orientation.as_str() {
                Some(value) if Orientation::parse(value).is_some() => {}
                _ => self.report(
                    &path,
                    "enum",
                    format!(
                        "must be equal to one of the allowed values ({})",
                        ORIENTATIONS.join(", ")
                    ),
                ),
            }
        }
    }

    fn page_size(&mut self, path: &str, size: &Value) {
        match size {
            Value::String(name) => {
                if standard_page_size(name).is_none() {
                    self.report(path, "enum", format!("unknown page size '{name}'"));
                }
            }
            Value::Array(dimensions) => {
                if dimensions.len() != 2 {
                    self.report(path, "maxItems", "must contain exactly 2 items");
                    return;
                }
                for (index, dimension) in dimensions.iter().enumerate() {
                    self.positive_number(&format!("{path}/{index}"), dimension);
                }
            }
            Value::Object(fields) => {
                for key in ["width", "height"] {
                    match fields.get(key) {
                        Some(dimension) => self.positive_number(&format!("{path}/{key}"), dimension),
                        None => self.report(
                            path,
                            "required",
                            format!("must have required property '{key}'"),
                        ),
                    }
                }
            }
            other => self.report(
                path,
                "type",
                format!(
                    "must be a page size name, [width, height] or {{ width, height }}, found {}",
                    json_kind(other)
                ),
            ),
        }
    }

    fn style(&mut self, path: &str, fields: &Map<String, Value>) {
        let Some(style) = fields.get("style") else {
            return;
        };
        let path = format!("{path}/style");
        let Some(style) = self.expect_object(&path, style) else {
            return;
        };

        for key in POSITIVE_STYLE_FIELDS {
            if let Some(value) = style.get(key) {
                self.positive_number(&format!("{path}/{key}"), value);
            }
        }
        for key in NON_NEGATIVE_STYLE_FIELDS {
            if let Some(value) = style.get(key) {
                self.non_negative_number(&format!("{path}/{key}"), value);
            }
        }

        if let Some(color) = style.get("color") {
            let valid = color.as_str().and_then(Rgb::parse_hex).is_some();
            if !valid {
                self.report(
                    &format!("{path}/color"),
                    "pattern",
                    "must match format \"#rgb\" or \"#rrggbb\"",
                );
            }
        }

        if let Some(weight) = style.get("fontWeight") {
            let valid = match weight {
                Value::String(name) => matches!(name.as_str(), "normal" | "bold"),
                Value::Number(number) => number.as_f64().is_some_and(|n| n > 0.0),
                _ => false,
            };
            if !valid {
                self.report(
                    &format!("{path}/fontWeight"),
                    "enum",
                    "must be 'normal', 'bold' or a positive number",
                );
            }
        }
    }

    fn expect_object<'v>(&mut self, path: &str, value: &'v Value) -> Option<&'v Map<String, Value>> {
        match value {
            Value::Object(fields) => Some(fields),
            other => {
                self.report(path, "type", format!("must be object, found {}", json_kind(other)));
                None
            }
        }
    }

    fn expect_string(&mut self, path: &str, value: &Value) {
        if !value.is_string() {
            self.report(path, "type", format!("must be string, found {}", json_kind(value)));
        }
    }

    fn positive_number(&mut self, path: &str, value: &Value) {
        match value.as_f64() {
            Some(number) if number > 0.0 => {}
            Some(_) => self.report(path, "exclusiveMinimum", "must be > 0"),
            None => self.report(path, "type", format!("must be number, found {}", json_kind(value))),
        }
    }

    fn non_negative_number(&mut self, path: &str, value: &Value) {
        match value.as_f64() {
            Some(number) if number >= 0.0 => {}
            Some(_) => self.report(path, "minimum", "must be >= 0"),
            None => self.report(path, "type", format!("must be number, found {}", json_kind(value))),
        }
    }
}
