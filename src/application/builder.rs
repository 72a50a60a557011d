//! Document tree construction from decoded payloads.
//!
//! The builder runs even when validation is skipped, so it has to fail cleanly
//! on any shape of input. Failures carry the trail of nodes entered so far
//! (`Document > Page[0] > View[1] > Text[2]`) to help clients find the culprit.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{
    payload::{Payload, json_kind},
    tree::{
        Block, DEFAULT_PAGE_SIZE, DocumentMetadata, DocumentTree, Orientation, PageTree, Rgb,
        TextStyle, standard_page_size,
    },
};

/// Margin applied to pages that do not set `style.padding`.
pub const DEFAULT_PAGE_MARGIN: f32 = 36.0;

const BOLD_WEIGHT_THRESHOLD: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    UnknownElement,
    MissingField,
    InvalidValue,
    EmptyDocument,
}

impl BuildErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildErrorKind::UnknownElement => "UnknownElement",
            BuildErrorKind::MissingField => "MissingField",
            BuildErrorKind::InvalidValue => "InvalidValue",
            BuildErrorKind::EmptyDocument => "EmptyDocument",
        }
    }
}

/// A tree-building failure attributable to the client's payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub message: String,
    pub render_stack: Vec<String>,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            render_stack: Vec::new(),
        }
    }

    pub fn with_render_stack(mut self, stack: &[String]) -> Self {
        self.render_stack = stack.to_vec();
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// `Error (<kind>): <message>`, followed by the render stack when one was recorded.
    pub fn client_message(&self) -> String {
        let mut message = format!("Error ({}): {}", self.name(), self.message);
        if !self.render_stack.is_empty() {
            message.push_str("\nRender Stack: ");
            message.push_str(&self.render_stack.join(" > "));
        }
        message
    }
}

#[async_trait]
pub trait TreeBuilder: Send + Sync {
    async fn generate(&self, payload: &Payload) -> Result<DocumentTree, BuildError>;
}

/// Builds document trees from the JSON document description format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTreeBuilder;

#[async_trait]
impl TreeBuilder for JsonTreeBuilder {
    async fn generate(&self, payload: &Payload) -> Result<DocumentTree, BuildError> {
        Build::default().document(payload.fields())
    }
}

/// Style fields as written in the payload, before inheritance.
#[derive(Debug, Default)]
struct StyleSpec {
    font_size: Option<f32>,
    line_height: Option<f32>,
    color: Option<Rgb>,
    bold: Option<bool>,
    margin_top: Option<f32>,
    margin_bottom: Option<f32>,
    margin_left: Option<f32>,
    padding: Option<f32>,
}

impl StyleSpec {
    /// Inherited text properties plus the accumulated indent for content inside this node.
    fn inherit(&self, parent: &TextStyle) -> TextStyle {
        TextStyle {
            font_size: self.font_size.unwrap_or(parent.font_size),
            line_height: self.line_height.unwrap_or(parent.line_height),
            color: self.color.unwrap_or(parent.color),
            bold: self.bold.unwrap_or(parent.bold),
            margin_top: 0.0,
            margin_bottom: 0.0,
            indent: parent.indent
                + self.margin_left.unwrap_or(0.0)
                + self.padding.unwrap_or(0.0),
        }
    }

    fn space_before(&self) -> f32 {
        self.margin_top.unwrap_or(0.0) + self.padding.unwrap_or(0.0)
    }

    fn space_after(&self) -> f32 {
        self.margin_bottom.unwrap_or(0.0) + self.padding.unwrap_or(0.0)
    }
}

#[derive(Default)]
struct Build {
    stack: Vec<String>,
}

impl Build {
    fn fail(&self, kind: BuildErrorKind, message: impl Into<String>) -> BuildError {
        BuildError::new(kind, message).with_render_stack(&self.stack)
    }

    fn document(&mut self, fields: &Map<String, Value>) -> Result<DocumentTree, BuildError> {
        self.stack.push("Document".to_string());

        let metadata = DocumentMetadata {
            title: string_field(fields, "title"),
            author: string_field(fields, "author"),
            subject: string_field(fields, "subject"),
            keywords: string_field(fields, "keywords"),
        };
        let default_size = self.page_size(fields, DEFAULT_PAGE_SIZE)?;

        let pages = match fields.get("content") {
            None => {
                return Err(self.fail(
                    BuildErrorKind::MissingField,
                    "document is missing its `content` array",
                ));
            }
            Some(Value::Array(pages)) if pages.is_empty() => {
                return Err(self.fail(BuildErrorKind::EmptyDocument, "document has no pages"));
            }
            Some(Value::Array(pages)) => pages,
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("`content` must be an array, found {}", json_kind(other)),
                ));
            }
        };

        let mut built = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            self.stack.push(format!("Page[{index}]"));
            built.push(self.page(page, default_size)?);
            self.stack.pop();
        }

        self.stack.pop();
        Ok(DocumentTree {
            metadata,
            pages: built,
        })
    }

    fn page(&mut self, node: &Value, default_size: (f32, f32)) -> Result<PageTree, BuildError> {
        let fields = self.object(node)?;
        match fields.get("type").and_then(Value::as_str) {
            Some("page") => {}
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::UnknownElement,
                    format!("expected a `page` node at the top level, found `{other}`"),
                ));
            }
            None => {
                return Err(self.fail(BuildErrorKind::MissingField, "node is missing its `type`"));
            }
        }

        let (width, height) = self.page_size(fields, default_size)?;
        let spec = self.style(fields)?;
        let margin = spec.padding.unwrap_or(DEFAULT_PAGE_MARGIN);
        // Page padding becomes the page margin, not an indent.
        let mut base = spec.inherit(&TextStyle::default());
        base.indent = 0.0;

        let mut blocks = Vec::new();
        self.children(fields, &base, &mut blocks)?;

        Ok(PageTree {
            width,
            height,
            margin,
            blocks,
        })
    }

    fn children(
        &mut self,
        fields: &Map<String, Value>,
        inherited: &TextStyle,
        blocks: &mut Vec<Block>,
    ) -> Result<(), BuildError> {
        let children = match fields.get("children") {
            None => return Ok(()),
            Some(Value::Array(children)) => children,
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("`children` must be an array, found {}", json_kind(other)),
                ));
            }
        };

        for (index, child) in children.iter().enumerate() {
            self.node(index, child, inherited, blocks)?;
        }
        Ok(())
    }

    fn node(
        &mut self,
        index: usize,
        node: &Value,
        inherited: &TextStyle,
        blocks: &mut Vec<Block>,
    ) -> Result<(), BuildError> {
        let kind = node.get("type").and_then(Value::as_str).unwrap_or("?");
        self.stack.push(format!("{}[{index}]", frame_name(kind)));

        let fields = self.object(node)?;
        match fields.get("type") {
            None => {
                return Err(self.fail(BuildErrorKind::MissingField, "node is missing its `type`"));
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("`type` must be a string, found {}", json_kind(other)),
                ));
            }
        }

        match kind {
            "view" => {
                let spec = self.style(fields)?;
                let style = spec.inherit(inherited);
                push_spacer(blocks, spec.space_before());
                self.children(fields, &style, blocks)?;
                push_spacer(blocks, spec.space_after());
            }
            "text" => {
                let text = match fields.get("value") {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => {
                        return Err(self.fail(
                            BuildErrorKind::InvalidValue,
                            format!("`value` must be a string, found {}", json_kind(other)),
                        ));
                    }
                    None => {
                        return Err(
                            self.fail(BuildErrorKind::MissingField, "text node has no `value`")
                        );
                    }
                };
                let spec = self.style(fields)?;
                let mut style = spec.inherit(inherited);
                style.margin_top = spec.space_before();
                style.margin_bottom = spec.space_after();
                blocks.push(Block::Text { text, style });
            }
            "break" => blocks.push(Block::PageBreak),
            other => {
                return Err(self.fail(
                    BuildErrorKind::UnknownElement,
                    format!("unknown element type `{other}`"),
                ));
            }
        }

        self.stack.pop();
        Ok(())
    }

    fn object<'v>(&self, node: &'v Value) -> Result<&'v Map<String, Value>, BuildError> {
        node.as_object().ok_or_else(|| {
            self.fail(
                BuildErrorKind::InvalidValue,
                format!("expected an object node, found {}", json_kind(node)),
            )
        })
    }

    fn page_size(
        &self,
        fields: &Map<String, Value>,
        fallback: (f32, f32),
    ) -> Result<(f32, f32), BuildError> {
        let size = match fields.get("pageSize") {
            None => fallback,
            Some(Value::String(name)) => standard_page_size(name).ok_or_else(|| {
                self.fail(BuildErrorKind::InvalidValue, format!("unknown page size `{name}`"))
            })?,
            Some(Value::Array(dimensions)) if dimensions.len() == 2 => (
                self.dimension(&dimensions[0], "pageSize[0]")?,
                self.dimension(&dimensions[1], "pageSize[1]")?,
            ),
            Some(Value::Object(dimensions)) => (
                self.dimension(dimensions.get("width").unwrap_or(&Value::Null), "pageSize.width")?,
                self.dimension(
                    dimensions.get("height").unwrap_or(&Value::Null),
                    "pageSize.height",
                )?,
            ),
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("unsupported `pageSize` value {other}"),
                ));
            }
        };

        match fields.get("orientation") {
            None => Ok(size),
            Some(value) => value
                .as_str()
                .and_then(Orientation::parse)
                .map(|orientation| orientation.apply(size))
                .ok_or_else(|| {
                    self.fail(
                        BuildErrorKind::InvalidValue,
                        format!("unsupported `orientation` value {value}"),
                    )
                }),
        }
    }

    fn dimension(&self, value: &Value, label: &str) -> Result<f32, BuildError> {
        match value.as_f64() {
            Some(number) if number > 0.0 => Ok(number as f32),
            _ => Err(self.fail(
                BuildErrorKind::InvalidValue,
                format!("`{label}` must be a positive number, found {value}"),
            )),
        }
    }

    fn style(&self, fields: &Map<String, Value>) -> Result<StyleSpec, BuildError> {
        let style = match fields.get("style") {
            None => return Ok(StyleSpec::default()),
            Some(Value::Object(style)) => style,
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("`style` must be an object, found {}", json_kind(other)),
                ));
            }
        };

        let color = match style.get("color") {
            None => None,
            Some(value) => Some(value.as_str().and_then(Rgb::parse_hex).ok_or_else(|| {
                self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("`style.color` must be a hex colour, found {value}"),
                )
            })?),
        };

        let bold = match style.get("fontWeight") {
            None => None,
            Some(Value::String(weight)) if weight == "bold" => Some(true),
            Some(Value::String(weight)) if weight == "normal" => Some(false),
            Some(Value::Number(weight)) if weight.as_f64().is_some_and(|w| w > 0.0) => {
                weight.as_f64().map(|w| w >= BOLD_WEIGHT_THRESHOLD)
            }
            Some(other) => {
                return Err(self.fail(
                    BuildErrorKind::InvalidValue,
                    format!("unsupported `style.fontWeight` value {other}"),
                ));
            }
        };

        Ok(StyleSpec {
            font_size: self.style_number(style, "fontSize", false)?,
            line_height: self.style_number(style, "lineHeight", false)?,
            color,
            bold,
            margin_top: self.style_number(style, "marginTop", true)?,
            margin_bottom: self.style_number(style, "marginBottom", true)?,
            margin_left: self.style_number(style, "marginLeft", true)?,
            padding: self.style_number(style, "padding", true)?,
        })
    }

    fn style_number(
        &self,
        style: &Map<String, Value>,
        key: &str,
        allow_zero: bool,
    ) -> Result<Option<f32>, BuildError> {
        let Some(value) = style.get(key) else {
            return Ok(None);
        };
        match value.as_f64() {
            Some(number) if number > 0.0 || (allow_zero && number == 0.0) => {
                Ok(Some(number as f32))
            }
            _ => Err(self.fail(
                BuildErrorKind::InvalidValue,
                format!("`style.{key}` has unsupported value {value}"),
            )),
        }
    }
}

fn frame_name(kind: &str) -> &str {
    match kind {
        "view" => "View",
        "text" => "Text",
        "break" => "Break",
        "page" => "Page",
        other => other,
    }
}

fn push_spacer(blocks: &mut Vec<Block>, height: f32) {
    if height > 0.0 {
        blocks.push(Block::Spacer { height });
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}
