//! The minimal expression grammar from spec §4.5:
//!
//! - `{{ IDENT }}` — variable substitution
//! - `{{ 'literal' }}` — string literal
//! - `{{ 'fmt'.format(arg, …) }}` — positional `{}` substitution
//! - `{{ lookup('file', PATH_EXPR) }}` — read a file as UTF-8 text
//! - `EXPR | from_json`, `EXPR | to_json`, chained with more `| f`
//!
//! No general-purpose template engine is pulled in (REDESIGN FLAGS §9 scopes
//! this down deliberately) — it's a small enough grammar to hand-parse, the
//! way the rest of this codebase prefers a hand-rolled parser over a crate
//! for a narrow job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};

/// Resolution context for one string's worth of template expansion.
pub struct TemplateContext<'a> {
    pub vars: &'a HashMap<String, String>,
    /// Directory `lookup('file', …)` resolves relative paths against.
    pub base_dir: PathBuf,
    /// File the string being rendered came from, for error messages.
    pub origin: String,
}

impl<'a> TemplateContext<'a> {
    pub fn new(vars: &'a HashMap<String, String>, base_dir: impl Into<PathBuf>, origin: impl Into<String>) -> Self {
        Self {
            vars,
            base_dir: base_dir.into(),
            origin: origin.into(),
        }
    }

    fn resolve_ident(&self, name: &str) -> anyhow::Result<String> {
        if let Some(v) = self.vars.get(name) {
            return Ok(v.clone());
        }
        if let Ok(v) = std::env::var(name) {
            return Ok(v);
        }
        bail!(
            "unresolved template variable '{{{{{name}}}}}' in '{}'",
            self.origin
        )
    }
}

/// A value flowing through a pipe chain. Most expressions are plain strings;
/// `from_json` can produce any JSON shape, `to_json` always collapses back
/// to a string.
#[derive(Debug, Clone)]
enum TplValue {
    Str(String),
    Json(serde_json::Value),
}

impl TplValue {
    fn into_display_string(self) -> String {
        match self {
            TplValue::Str(s) => s,
            TplValue::Json(serde_json::Value::String(s)) => s,
            TplValue::Json(v) => v.to_string(),
        }
    }

    fn as_str_for_parse(&self) -> anyhow::Result<&str> {
        match self {
            TplValue::Str(s) => Ok(s.as_str()),
            TplValue::Json(serde_json::Value::String(s)) => Ok(s.as_str()),
            TplValue::Json(_) => bail!("from_json expects a string input"),
        }
    }
}

/// Render every `{{ ... }}` placeholder in `input`, returning the expanded
/// string. Total at the call site: any unresolved identifier or lookup
/// failure is a hard error (spec §4.5, §8 law 3).
pub fn render(input: &str, ctx: &TemplateContext) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .with_context(|| format!("unterminated '{{{{' in '{}'", ctx.origin))?;
        let expr_src = after_open[..end].trim();
        let value = eval(expr_src, ctx)
            .with_context(|| format!("while evaluating '{{{{ {expr_src} }}}}' in '{}'", ctx.origin))?;
        out.push_str(&value.into_display_string());
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// True if `s` still contains an unresolved placeholder (used by the
/// fixed-point `vars` expansion pass in `app_config.rs`).
pub fn has_placeholder(s: &str) -> bool {
    s.contains("{{")
}

fn eval(expr: &str, ctx: &TemplateContext) -> anyhow::Result<TplValue> {
    let mut parser = Parser::new(expr);
    let value = parser.parse_pipeline(ctx)?;
    parser.expect_end()?;
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let skipped = self.remaining().len() - self.remaining().trim_start().len();
        self.pos += skipped;
    }

    fn expect_end(&mut self) -> anyhow::Result<()> {
        self.skip_ws();
        if !self.remaining().is_empty() {
            bail!("unexpected trailing input '{}'", self.remaining());
        }
        Ok(())
    }

    fn eat_char(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.remaining().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_literal(&mut self, lit: &str) -> bool {
        self.skip_ws();
        if self.remaining().starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn parse_pipeline(&mut self, ctx: &TemplateContext) -> anyhow::Result<TplValue> {
        let mut value = self.parse_primary(ctx)?;
        loop {
            self.skip_ws();
            if self.eat_char('|') {
                self.skip_ws();
                let filter = self.parse_ident_raw()?;
                value = match filter.as_str() {
                    "from_json" => {
                        let parsed: serde_json::Value = serde_json::from_str(value.as_str_for_parse()?)
                            .context("from_json: invalid JSON")?;
                        TplValue::Json(parsed)
                    }
                    "to_json" => {
                        let json = match &value {
                            TplValue::Str(s) => serde_json::Value::String(s.clone()),
                            TplValue::Json(v) => v.clone(),
                        };
                        TplValue::Str(serde_json::to_string(&json).context("to_json: serialization failed")?)
                    }
                    other => bail!("unknown filter '{other}'"),
                };
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_primary(&mut self, ctx: &TemplateContext) -> anyhow::Result<TplValue> {
        self.skip_ws();
        if self.remaining().starts_with('\'') {
            let literal = self.parse_string_literal()?;
            // a string literal may be followed by `.format(...)`
            self.skip_ws();
            if self.eat_literal(".format(") {
                let args = self.parse_arg_list(ctx)?;
                self.skip_ws();
                if !self.eat_char(')') {
                    bail!("expected ')' to close .format(...)");
                }
                return Ok(TplValue::Str(apply_format(&literal, &args)?));
            }
            return Ok(TplValue::Str(literal));
        }
        if self.eat_literal("lookup(") {
            self.skip_ws();
            let kind = self.parse_string_literal()?;
            if kind != "file" {
                bail!("unknown lookup plugin '{kind}'");
            }
            self.skip_ws();
            if !self.eat_char(',') {
                bail!("expected ',' after lookup plugin name");
            }
            let path_value = self.parse_pipeline(ctx)?;
            self.skip_ws();
            if !self.eat_char(')') {
                bail!("expected ')' to close lookup(...)");
            }
            let path_str = path_value.into_display_string();
            let path = resolve_path(&ctx.base_dir, &path_str);
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("lookup('file', ...): cannot read '{}'", path.display()))?;
            return Ok(TplValue::Str(contents));
        }
        let ident = self.parse_ident_raw()?;
        Ok(TplValue::Str(ctx.resolve_ident(&ident)?))
    }

    fn parse_arg_list(&mut self, ctx: &TemplateContext) -> anyhow::Result<Vec<TplValue>> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.remaining().starts_with(')') {
            return Ok(args);
        }
        loop {
            args.push(self.parse_pipeline(ctx)?);
            self.skip_ws();
            if self.eat_char(',') {
                continue;
            }
            break;
        }
        Ok(args)
    }

    fn parse_string_literal(&mut self) -> anyhow::Result<String> {
        self.skip_ws();
        if !self.eat_char('\'') {
            bail!("expected string literal");
        }
        let rest = self.remaining();
        let end = rest.find('\'').context("unterminated string literal")?;
        let literal = rest[..end].to_string();
        self.pos += end + 1;
        Ok(literal)
    }

    fn parse_ident_raw(&mut self) -> anyhow::Result<String> {
        self.skip_ws();
        let rest = self.remaining();
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            bail!("expected identifier, found '{rest}'");
        }
        let ident = rest[..end].to_string();
        self.pos += end;
        Ok(ident)
    }
}

fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

fn apply_format(fmt: &str, args: &[TplValue]) -> anyhow::Result<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut arg_iter = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'}') {
            chars.next();
            let arg = arg_iter
                .next()
                .context("not enough arguments for .format(...)")?;
            out.push_str(&arg.clone().into_display_string());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(vars: &HashMap<String, String>) -> TemplateContext<'_> {
        TemplateContext::new(vars, ".", "test.yaml")
    }

    #[test]
    fn substitutes_variable() {
        let mut vars = HashMap::new();
        vars.insert("ENV".to_string(), "prod".to_string());
        let result = render("value-{{ ENV }}", &ctx(&vars)).unwrap();
        assert_eq!(result, "value-prod");
    }

    #[test]
    fn string_literal() {
        let vars = HashMap::new();
        let result = render("{{ 'hello' }}", &ctx(&vars)).unwrap();
        assert_eq!(result, "hello");
    }

    #[test]
    fn format_call() {
        let mut vars = HashMap::new();
        vars.insert("NAME".to_string(), "db".to_string());
        let result = render("{{ '{}-url'.format(NAME) }}", &ctx(&vars)).unwrap();
        assert_eq!(result, "db-url");
    }

    #[test]
    fn unresolved_identifier_is_an_error() {
        let vars = HashMap::new();
        assert!(render("{{ MISSING }}", &ctx(&vars)).is_err());
    }

    #[test]
    fn from_json_then_to_json_roundtrips() {
        let mut vars = HashMap::new();
        vars.insert("BLOB".to_string(), r#"{"a":1}"#.to_string());
        let result = render("{{ BLOB | from_json | to_json }}", &ctx(&vars)).unwrap();
        assert_eq!(result, r#"{"a":1}"#);
    }

    #[test]
    fn has_placeholder_detects_braces() {
        assert!(has_placeholder("{{ X }}"));
        assert!(!has_placeholder("plain"));
    }
}
