// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Template rendering.
//!
//! Tracked files marked as templates are generated instead of copied, so
//! one manifest can produce machine-specific variants of a dotfile. A
//! template is plain text with `{{ ... }}` tags:
//!
//! ```text
//! [user]
//!     name = {{ user }}
//!     email = {{ user }}@{{ if contains(hostname, "work") }}company.com{{ else }}{{ email_domain }}{{ end }}
//! [core]
//!     editor = {{ editor }}
//! ```
//!
//! A tag holds either a value expression or one of the block keywords
//! `if`, `else`, `end`. Value expressions are variable names, quoted
//! string literals, or helper calls:
//!
//! - `upper(x)`, `lower(x)`, `replace(x, a, b)` transform strings,
//! - `split(x, sep)` produces a list, `join(xs, sep)` collapses one,
//! - `contains(x, y)`, `hasprefix(x, y)`, `hassuffix(x, y)`, `not(c)`
//!   produce booleans for `if` blocks,
//! - `env(key)` reads an environment variable, empty when unset.
//!
//! Variable names resolve against the built-in identity values (`user`,
//! `hostname`, `editor`, `shell`) and the merged global plus file-specific
//! variable tables. Unknown variables or helpers are syntax errors naming
//! the template path.
//!
//! # Template Lookup
//!
//! Templates live in the template directories under names derived from the
//! tracked file. The lookup order is fixed and the first match wins: for
//! each directory, for each configured extension, try `{basename}{ext}`,
//! `{fullname}{ext}`, `{category}_{basename}{ext}`, then
//! `{category}/{basename}{ext}`, where basename is the file name without
//! its leading dot.

use crate::manifest::{Manifest, TrackedFile};

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Variable context a template renders against.
///
/// Holds the built-in identity values plus the merged custom variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    pub user: String,
    pub hostname: String,
    pub editor: String,
    pub shell: String,
    pub variables: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Build the context for one tracked file.
    ///
    /// Identity values come from the running system and the manifest;
    /// custom variables are the global table overlaid with the file's
    /// overrides.
    pub fn for_file(manifest: &Manifest, file: &TrackedFile) -> Self {
        Self {
            user: whoami::username(),
            hostname: whoami::fallible::hostname().unwrap_or_else(|_| "localhost".into()),
            editor: manifest.editor.clone(),
            shell: manifest.shell.clone(),
            variables: manifest.merged_variables(file),
        }
    }

    /// Placeholder context used to validate a template without rendering
    /// it for real.
    pub fn dummy() -> Self {
        Self {
            user: "testuser".into(),
            hostname: "testhost".into(),
            editor: "vim".into(),
            shell: "bash".into(),
            variables: BTreeMap::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "user" => Some(&self.user),
            "hostname" => Some(&self.hostname),
            "editor" => Some(&self.editor),
            "shell" => Some(&self.shell),
            _ => self.variables.get(name).map(String::as_str),
        }
    }
}

/// Render a template file against a context.
///
/// # Errors
///
/// - Return [`TemplateError::Read`] if the template cannot be read.
/// - Return [`TemplateError::Render`] naming the template path and the
///   underlying syntax or evaluation error.
pub fn render_file(path: impl AsRef<Path>, ctx: &TemplateContext) -> Result<String> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| TemplateError::Read {
        source: err,
        path: path.to_path_buf(),
    })?;

    render_str(&text, ctx).map_err(|err| TemplateError::Render {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Render template text against a context.
pub fn render_str(text: &str, ctx: &TemplateContext) -> Result<String, SyntaxError> {
    let nodes = Parser::new(text).parse()?;
    let mut out = String::new();
    eval_nodes(&nodes, ctx, &mut out)?;
    Ok(out)
}

/// Check a template for syntax and evaluation errors without touching the
/// filesystem beyond the read.
///
/// Renders against [`TemplateContext::dummy`] extended with the given
/// variables, discarding the output.
pub fn validate_file(
    path: impl AsRef<Path>,
    variables: &BTreeMap<String, String>,
) -> Result<()> {
    let mut ctx = TemplateContext::dummy();
    ctx.variables = variables.clone();
    render_file(path, &ctx).map(|_| ())
}

/// Locate the template backing a tracked file.
///
/// Applies the fixed lookup order documented at the module level; returns
/// the first candidate that exists.
pub fn find_template(
    template_dirs: &[PathBuf],
    exts: &[String],
    file: &TrackedFile,
) -> Option<PathBuf> {
    let fullname = file.name.as_str();
    let basename = fullname.trim_start_matches('.');

    for dir in template_dirs {
        for ext in exts {
            let candidates = [
                dir.join(format!("{basename}{ext}")),
                dir.join(format!("{fullname}{ext}")),
                dir.join(format!("{}_{basename}{ext}", file.category)),
                dir.join(&file.category).join(format!("{basename}{ext}")),
            ];

            for candidate in candidates {
                if candidate.is_file() {
                    debug!("template for {} found at {:?}", file.name, candidate.display());
                    return Some(candidate);
                }
            }
        }
    }

    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Expr(Expr),
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Var(String),
    Lit(String),
    Call { helper: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    List(Vec<String>),
    Bool(bool),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Bool(_) => "boolean",
        }
    }

    fn into_str(self, helper: &str) -> Result<String, SyntaxError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(SyntaxError::TypeMismatch {
                helper: helper.into(),
                expected: "string",
                found: other.kind(),
            }),
        }
    }
}

/// Splits raw text into literal runs and tag bodies.
struct Parser<'a> {
    rest: &'a str,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text, line: 1 }
    }

    fn parse(mut self) -> Result<Vec<Node>, SyntaxError> {
        let (nodes, terminator) = self.parse_block()?;
        match terminator {
            None => Ok(nodes),
            Some(keyword) => Err(SyntaxError::StrayKeyword {
                keyword,
                line: self.line,
            }),
        }
    }

    /// Parse nodes until EOF or a block keyword (`else`/`end`), which is
    /// returned to the caller for matching.
    fn parse_block(&mut self) -> Result<(Vec<Node>, Option<String>), SyntaxError> {
        let mut nodes = Vec::new();

        loop {
            let Some(open) = self.rest.find("{{") else {
                if !self.rest.is_empty() {
                    nodes.push(Node::Text(self.rest.to_string()));
                    self.advance(self.rest.len());
                }
                return Ok((nodes, None));
            };

            if open > 0 {
                nodes.push(Node::Text(self.rest[..open].to_string()));
            }
            self.advance(open);

            let after_open = &self.rest[2..];
            let Some(close) = after_open.find("}}") else {
                return Err(SyntaxError::UnclosedTag { line: self.line });
            };
            let body = after_open[..close].trim().to_string();
            self.advance(2 + close + 2);

            match body.split_whitespace().next() {
                Some("if") => {
                    let cond = parse_expr(body["if".len()..].trim(), self.line)?;
                    let (then, terminator) = self.parse_block()?;
                    let (otherwise, terminator) = match terminator.as_deref() {
                        Some("else") => {
                            let (otherwise, terminator) = self.parse_block()?;
                            (otherwise, terminator)
                        }
                        other => (Vec::new(), other.map(String::from)),
                    };

                    if terminator.as_deref() != Some("end") {
                        return Err(SyntaxError::UnclosedBlock { line: self.line });
                    }
                    nodes.push(Node::If {
                        cond,
                        then,
                        otherwise,
                    });
                }
                Some("else") | Some("end") => return Ok((nodes, Some(body))),
                Some(_) => nodes.push(Node::Expr(parse_expr(&body, self.line)?)),
                None => return Err(SyntaxError::EmptyTag { line: self.line }),
            }
        }
    }

    fn advance(&mut self, len: usize) {
        let (consumed, rest) = self.rest.split_at(len);
        self.line += consumed.matches('\n').count();
        self.rest = rest;
    }
}

/// Parse a single value expression: variable, string literal, or helper
/// call with parenthesized arguments.
fn parse_expr(text: &str, line: usize) -> Result<Expr, SyntaxError> {
    let mut cursor = Cursor { text, pos: 0, line };
    let expr = cursor.expr()?;
    cursor.skip_ws();
    if cursor.pos != text.len() {
        return Err(SyntaxError::Malformed {
            tag: text.into(),
            line,
        });
    }
    Ok(expr)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl Cursor<'_> {
    fn skip_ws(&mut self) {
        while self.text[self.pos..].starts_with(|c: char| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.skip_ws();
        let rest = &self.text[self.pos..];

        if rest.starts_with('"') {
            return self.literal();
        }

        let ident: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if ident.is_empty() {
            return Err(SyntaxError::Malformed {
                tag: self.text.into(),
                line: self.line,
            });
        }
        self.pos += ident.len();
        self.skip_ws();

        if self.text[self.pos..].starts_with('(') {
            self.pos += 1;
            let mut args = Vec::new();
            loop {
                args.push(self.expr()?);
                self.skip_ws();
                if self.text[self.pos..].starts_with(',') {
                    self.pos += 1;
                    continue;
                }
                if self.text[self.pos..].starts_with(')') {
                    self.pos += 1;
                    break;
                }
                return Err(SyntaxError::Malformed {
                    tag: self.text.into(),
                    line: self.line,
                });
            }
            return Ok(Expr::Call {
                helper: ident,
                args,
            });
        }

        Ok(Expr::Var(ident))
    }

    fn literal(&mut self) -> Result<Expr, SyntaxError> {
        let rest = &self.text[self.pos + 1..];
        let Some(end) = rest.find('"') else {
            return Err(SyntaxError::Malformed {
                tag: self.text.into(),
                line: self.line,
            });
        };
        let value = rest[..end].to_string();
        self.pos += end + 2;
        Ok(Expr::Lit(value))
    }
}

fn eval_nodes(nodes: &[Node], ctx: &TemplateContext, out: &mut String) -> Result<(), SyntaxError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Expr(expr) => match eval_expr(expr, ctx)? {
                Value::Str(s) => out.push_str(&s),
                Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
                Value::List(items) => out.push_str(&items.join(" ")),
            },
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let truthy = match eval_expr(cond, ctx)? {
                    Value::Bool(b) => b,
                    Value::Str(s) => !s.is_empty(),
                    Value::List(items) => !items.is_empty(),
                };
                eval_nodes(if truthy { then } else { otherwise }, ctx, out)?;
            }
        }
    }

    Ok(())
}

fn eval_expr(expr: &Expr, ctx: &TemplateContext) -> Result<Value, SyntaxError> {
    match expr {
        Expr::Lit(value) => Ok(Value::Str(value.clone())),
        Expr::Var(name) => ctx
            .lookup(name)
            .map(|value| Value::Str(value.to_string()))
            .ok_or_else(|| SyntaxError::UnknownVariable { name: name.clone() }),
        Expr::Call { helper, args } => eval_call(helper, args, ctx),
    }
}

fn eval_call(helper: &str, args: &[Expr], ctx: &TemplateContext) -> Result<Value, SyntaxError> {
    let arity = |expected: usize| -> Result<(), SyntaxError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(SyntaxError::WrongArity {
                helper: helper.into(),
                expected,
                found: args.len(),
            })
        }
    };
    let string_arg = |index: usize| -> Result<String, SyntaxError> {
        eval_expr(&args[index], ctx)?.into_str(helper)
    };

    match helper {
        "upper" => {
            arity(1)?;
            Ok(Value::Str(string_arg(0)?.to_uppercase()))
        }
        "lower" => {
            arity(1)?;
            Ok(Value::Str(string_arg(0)?.to_lowercase()))
        }
        "replace" => {
            arity(3)?;
            Ok(Value::Str(
                string_arg(0)?.replace(&string_arg(1)?, &string_arg(2)?),
            ))
        }
        "split" => {
            arity(2)?;
            let (value, sep) = (string_arg(0)?, string_arg(1)?);
            Ok(Value::List(
                value.split(&sep).map(str::to_owned).collect(),
            ))
        }
        "join" => {
            arity(2)?;
            let list = match eval_expr(&args[0], ctx)? {
                Value::List(items) => items,
                other => {
                    return Err(SyntaxError::TypeMismatch {
                        helper: helper.into(),
                        expected: "list",
                        found: other.kind(),
                    })
                }
            };
            Ok(Value::Str(list.join(&string_arg(1)?)))
        }
        "contains" => {
            arity(2)?;
            Ok(Value::Bool(string_arg(0)?.contains(&string_arg(1)?)))
        }
        "hasprefix" => {
            arity(2)?;
            Ok(Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?)))
        }
        "hassuffix" => {
            arity(2)?;
            Ok(Value::Bool(string_arg(0)?.ends_with(&string_arg(1)?)))
        }
        "not" => {
            arity(1)?;
            match eval_expr(&args[0], ctx)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(SyntaxError::TypeMismatch {
                    helper: helper.into(),
                    expected: "boolean",
                    found: other.kind(),
                }),
            }
        }
        "env" => {
            arity(1)?;
            Ok(Value::Str(
                std::env::var(string_arg(0)?).unwrap_or_default(),
            ))
        }
        _ => Err(SyntaxError::UnknownHelper {
            helper: helper.into(),
        }),
    }
}

/// Template error types.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Template file cannot be read.
    #[error("failed to read template at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Template failed to parse or evaluate.
    #[error("template {:?}: {source}", path.display())]
    Render {
        #[source]
        source: SyntaxError,
        path: PathBuf,
    },
}

/// Template syntax and evaluation error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    /// A `{{` without its matching `}}`.
    #[error("unclosed tag starting at line {line}")]
    UnclosedTag { line: usize },

    /// An `if` block without its matching `end`.
    #[error("unclosed if block at line {line}")]
    UnclosedBlock { line: usize },

    /// `else` or `end` outside of any `if` block.
    #[error("stray '{keyword}' at line {line}")]
    StrayKeyword { keyword: String, line: usize },

    /// Tag with no content.
    #[error("empty tag at line {line}")]
    EmptyTag { line: usize },

    /// Tag content does not parse as an expression.
    #[error("malformed expression '{tag}' at line {line}")]
    Malformed { tag: String, line: usize },

    /// Variable not present in the context.
    #[error("undefined variable '{name}'")]
    UnknownVariable { name: String },

    /// Helper name not recognized.
    #[error("unknown helper '{helper}'")]
    UnknownHelper { helper: String },

    /// Helper called with the wrong number of arguments.
    #[error("helper '{helper}' expects {expected} argument(s), found {found}")]
    WrongArity {
        helper: String,
        expected: usize,
        found: usize,
    },

    /// Helper called with the wrong kind of value.
    #[error("helper '{helper}' expects a {expected}, found a {found}")]
    TypeMismatch {
        helper: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
