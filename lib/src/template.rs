//! Minimal string templating for generated-module assembly.
//!
//! Supports placeholder substitution (`{{name}}`), sequence iteration
//! (`{{#each items}}...{{/each}}`) and conditionals
//! (`{{#if field}}...{{/if}}`), nested to any depth, evaluated against a
//! `serde_json::Value` context. Unknown names render as empty text.
//!
//! The engine is intentionally small: output templates are owned by the
//! language registry and never user-supplied, so there is no escaping,
//! no expression language, and no pluggability.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// A `{{#each}}` or `{{#if}}` block is missing its closing tag.
    #[error("unterminated {{{{#{kind} {name}}}}} block")]
    UnterminatedBlock { kind: String, name: String },

    /// A `{{` without a matching `}}`.
    #[error("unterminated placeholder at byte offset {offset}")]
    UnterminatedPlaceholder { offset: usize },
}

/// Renders `template` against `context`.
///
/// `context` is expected to be a JSON object; name lookups walk the scope
/// stack innermost-first, so fields of the current `{{#each}}` item shadow
/// root-level fields.
pub fn render(template: &str, context: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    render_into(&mut out, template, &[context])?;
    Ok(out)
}

fn render_into(out: &mut String, template: &str, scopes: &[&Value]) -> Result<(), TemplateError> {
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            return Err(TemplateError::UnterminatedPlaceholder { offset: open });
        };
        let tag = after_open[..close].trim();
        let after_tag = &after_open[close + 2..];

        if let Some(name) = tag.strip_prefix("#each ") {
            let name = name.trim();
            let (body, remainder) = split_block(after_tag, "each", name)?;
            if let Some(Value::Array(items)) = lookup(scopes, name) {
                for item in items {
                    let mut inner = scopes.to_vec();
                    inner.push(item);
                    render_into(out, body, &inner)?;
                }
            }
            rest = remainder;
        } else if let Some(name) = tag.strip_prefix("#if ") {
            let name = name.trim();
            let (body, remainder) = split_block(after_tag, "if", name)?;
            if lookup(scopes, name).is_some_and(truthy) {
                render_into(out, body, scopes)?;
            }
            rest = remainder;
        } else {
            if let Some(value) = lookup(scopes, tag) {
                push_scalar(out, value);
            }
            rest = after_tag;
        }
    }

    out.push_str(rest);
    Ok(())
}

/// Splits `text` into the body of the current block and the text after its
/// closing tag, accounting for nested blocks of the same kind.
fn split_block<'a>(
    text: &'a str,
    kind: &str,
    name: &str,
) -> Result<(&'a str, &'a str), TemplateError> {
    let open_marker = format!("{{{{#{kind} ");
    let close_marker = format!("{{{{/{kind}}}}}");

    let mut depth = 1usize;
    let mut search = 0usize;

    loop {
        let next_open = text[search..].find(&open_marker);
        let next_close = text[search..].find(&close_marker);

        match next_close {
            None => {
                return Err(TemplateError::UnterminatedBlock {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
            }
            Some(close_at) => {
                if let Some(open_at) = next_open {
                    if open_at < close_at {
                        depth += 1;
                        search += open_at + open_marker.len();
                        continue;
                    }
                }
                depth -= 1;
                let close_abs = search + close_at;
                if depth == 0 {
                    return Ok((&text[..close_abs], &text[close_abs + close_marker.len()..]));
                }
                search = close_abs + close_marker.len();
            }
        }
    }
}

fn lookup<'a>(scopes: &[&'a Value], name: &str) -> Option<&'a Value> {
    for scope in scopes.iter().rev() {
        if let Value::Object(map) = scope {
            if let Some(value) = map.get(name) {
                return Some(value);
            }
        }
    }
    None
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn push_scalar(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null | Value::Array(_) | Value::Object(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_placeholders() {
        let ctx = json!({"name": "users_User", "count": 2});
        let out = render("const {{name}} = {{count}};", &ctx).unwrap();
        assert_eq!(out, "const users_User = 2;");
    }

    #[test]
    fn unknown_names_render_empty() {
        let ctx = json!({});
        let out = render("[{{missing}}]", &ctx).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn iterates_sequences() {
        let ctx = json!({"items": [{"v": "a"}, {"v": "b"}]});
        let out = render("{{#each items}}{{v}},{{/each}}", &ctx).unwrap();
        assert_eq!(out, "a,b,");
    }

    #[test]
    fn each_over_missing_sequence_renders_nothing() {
        let ctx = json!({});
        let out = render("x{{#each items}}y{{/each}}z", &ctx).unwrap();
        assert_eq!(out, "xz");
    }

    #[test]
    fn conditional_on_empty_string_is_false() {
        let ctx = json!({"code": "", "type": "T"});
        let out = render("{{#if code}}C{{/if}}{{#if type}}T{{/if}}", &ctx).unwrap();
        assert_eq!(out, "T");
    }

    #[test]
    fn item_fields_shadow_root_fields() {
        let ctx = json!({"v": "root", "items": [{"v": "item"}, {}]});
        let out = render("{{#each items}}{{v}} {{/each}}", &ctx).unwrap();
        assert_eq!(out, "item root ");
    }

    #[test]
    fn nested_each_and_if() {
        let ctx = json!({
            "schemas": [
                {"key": "a", "code": "z.string()"},
                {"key": "b", "code": ""}
            ]
        });
        let tpl = "{{#each schemas}}{{#if code}}{{key}}={{code}};{{/if}}{{/each}}";
        let out = render(tpl, &ctx).unwrap();
        assert_eq!(out, "a=z.string();");
    }

    #[test]
    fn nested_blocks_of_same_kind_balance() {
        let ctx = json!({"outer": [{"inner": [{"v": 1}, {"v": 2}]}]});
        let tpl = "{{#each outer}}({{#each inner}}{{v}}{{/each}}){{/each}}";
        let out = render(tpl, &ctx).unwrap();
        assert_eq!(out, "(12)");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let ctx = json!({"items": []});
        let err = render("{{#each items}}no close", &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::UnterminatedBlock { .. }));
        assert!(err.to_string().contains("each"));
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let err = render("broken {{name", &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::UnterminatedPlaceholder { .. }));
    }

    #[test]
    fn rendering_is_deterministic() {
        let ctx = json!({"items": [{"v": "x"}, {"v": "y"}]});
        let tpl = "{{#each items}}{{v}}{{/each}}";
        assert_eq!(render(tpl, &ctx).unwrap(), render(tpl, &ctx).unwrap());
    }
}
