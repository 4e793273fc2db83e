/// Manifest renderer using Tera
/// Accepts Tera syntax plus the Go `text/template` subset the stock manifests use:
/// `{{ .Field }}`, `{{ range }}`, `{{ if }}`, `{{ else }}` and `{{ end }}`.
use crate::error::ProvisionError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tera::{Context, Tera};

static GO_ACTION: OnceLock<Regex> = OnceLock::new();
static GO_RANGE: OnceLock<Regex> = OnceLock::new();

fn go_action() -> &'static Regex {
    GO_ACTION.get_or_init(|| Regex::new(r"(?s)\{\{(-?)\s*(.*?)\s*(-?)\}\}").expect("action pattern"))
}

fn go_range() -> &'static Regex {
    GO_RANGE.get_or_init(|| {
        Regex::new(r"^range\s+(?:(?:\$(\w+)\s*,\s*)?\$(\w+)\s*:=\s*)?(\S+)$").expect("range pattern")
    })
}

enum Block {
    For { var: String, index: Option<String> },
    If,
}

/// Go block and variable scopes while walking a template.
#[derive(Default)]
struct Scope {
    blocks: Vec<Block>,
}

impl Scope {
    /// Innermost range variable, i.e. what `.` refers to.
    fn dot(&self) -> Option<&str> {
        self.blocks.iter().rev().find_map(|b| match b {
            Block::For { var, .. } => Some(var.as_str()),
            Block::If => None,
        })
    }

    fn loops(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::For { .. }))
            .count()
    }

    fn is_index(&self, name: &str) -> bool {
        self.blocks
            .iter()
            .rev()
            .find_map(|b| match b {
                Block::For { index, .. } => Some(index.as_deref() == Some(name)),
                Block::If => None,
            })
            .unwrap_or(false)
    }

    /// Translate a Go operand (`.`, `.A.B`, `$`, `$.A`, `$v.A`) into a Tera expression.
    fn operand(&self, expr: &str) -> Option<String> {
        if let Some(rest) = expr.strip_prefix("$.") {
            return is_path(rest).then(|| rest.to_string());
        }
        if let Some(var) = expr.strip_prefix('$') {
            let (head, tail) = var.split_once('.').unwrap_or((var, ""));
            if head.is_empty() || !is_path(head) || (!tail.is_empty() && !is_path(tail)) {
                return None;
            }
            if tail.is_empty() && self.is_index(head) {
                return Some("loop.index0".to_string());
            }
            return Some(var.to_string());
        }
        if expr == "." {
            return self.dot().map(str::to_string);
        }
        let path = expr.strip_prefix('.')?;
        if !is_path(path) {
            return None;
        }
        Some(match self.dot() {
            Some(var) => format!("{}.{}", var, path),
            None => path.to_string(),
        })
    }

    fn condition(&self, expr: &str) -> Option<String> {
        match expr.strip_prefix("not ") {
            Some(inner) => self.operand(inner.trim()).map(|e| format!("not {}", e)),
            None => self.operand(expr),
        }
    }

    /// Tera text for one Go action, or `None` to leave it untouched.
    fn action(&mut self, body: &str, left: &str, right: &str) -> Option<String> {
        let tag = |inner: String| format!("{{%{} {} {}%}}", left, inner, right);

        if body.starts_with("/*") && body.ends_with("*/") {
            return Some(String::new());
        }
        if let Some(caps) = go_range().captures(body) {
            let source = self.operand(&caps[3])?;
            let var = match caps.get(2) {
                Some(v) => v.as_str().to_string(),
                None if self.loops() == 0 => "item".to_string(),
                None => format!("item{}", self.loops() + 1),
            };
            let index = caps.get(1).map(|i| i.as_str().to_string());
            let out = tag(format!("for {} in {}", var, source));
            self.blocks.push(Block::For { var, index });
            return Some(out);
        }
        if let Some(cond) = body.strip_prefix("else if ") {
            return Some(tag(format!("elif {}", self.condition(cond.trim())?)));
        }
        if let Some(cond) = body.strip_prefix("if ") {
            let out = tag(format!("if {}", self.condition(cond.trim())?));
            self.blocks.push(Block::If);
            return Some(out);
        }
        match body {
            "else" => Some(tag("else".to_string())),
            "end" => match self.blocks.pop()? {
                Block::For { .. } => Some(tag("endfor".to_string())),
                Block::If => Some(tag("endif".to_string())),
            },
            _ => {
                let expr = self.operand(body)?;
                Some(format!("{{{{{} {} {}}}}}", left, expr, right))
            }
        }
    }
}

fn is_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|seg| {
            let mut chars = seg.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Rewrite Go template actions into Tera. Tera syntax and actions outside
/// the supported subset are left alone.
pub fn normalise_go_template(raw: &str) -> String {
    let mut scope = Scope::default();
    go_action()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            scope
                .action(&caps[2], &caps[1], &caps[3])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub struct TemplateRenderer {
    tera: Tera,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
        }
    }

    /// Register a fetched manifest under `name`, replacing any earlier one.
    pub fn add_manifest(&mut self, name: &str, raw: &str) -> Result<(), ProvisionError> {
        self.tera
            .add_raw_template(name, &normalise_go_template(raw))
            .map_err(|e| ProvisionError::Template(format!("Failed to add template {}: {}", name, e)))?;
        tracing::debug!("[TemplateRenderer] Loaded template: {}", name);
        Ok(())
    }

    /// Render a registered manifest with a Tera Context
    pub fn render_with_context(
        &self,
        name: &str,
        context: &Context,
    ) -> Result<String, ProvisionError> {
        let rendered = self.tera.render(name, context).map_err(|e| {
            ProvisionError::Template(format!("Failed to render template {}: {}", name, e))
        })?;

        tracing::debug!(
            "[TemplateRenderer] Rendered template {} ({} bytes)",
            name,
            rendered.len()
        );
        Ok(rendered)
    }

    /// Register and render in one step.
    pub fn render_manifest(
        &mut self,
        name: &str,
        raw: &str,
        context: &Context,
    ) -> Result<String, ProvisionError> {
        self.add_manifest(name, raw)?;
        self.render_with_context(name, context)
    }

    /// Write rendered manifest to a file
    pub fn write_manifest(rendered: &str, output_path: &Path) -> Result<(), ProvisionError> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, rendered)?;

        tracing::info!(
            "[TemplateRenderer] Wrote manifest to {}",
            output_path.display()
        );
        Ok(())
    }
}
