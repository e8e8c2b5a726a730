//! Output templates and header/footer builders.
//!
//! Templates render against `{imports, header, footer, schemas}` where each
//! schema row carries `key`, `var_name`, `code` and `type`. A row may be
//! code-only, type-only, or both; the conditionals below handle all three.

use super::SchemaEntry;

pub(super) const TS_TEMPLATE: &str = r#"// Code generated by xschema. DO NOT EDIT.
{{#if header}}{{header}}
{{/if}}{{#if imports}}{{imports}}

{{/if}}{{#each schemas}}{{#if code}}export const {{var_name}} = {{code}};
{{/if}}{{#if type}}export type {{var_name}}Type = {{type}};
{{/if}}{{/each}}
export const schemas = {
{{#each schemas}}{{#if code}}  "{{key}}": {{var_name}},
{{/if}}{{/each}}};
{{#if footer}}
{{footer}}
{{/if}}"#;

pub(super) const PY_TEMPLATE: &str = r#"# Code generated by xschema. DO NOT EDIT.
from typing import Literal, overload

from xschema.runtime import XSchemaAdapter, XSchemaBase
{{#if imports}}{{imports}}
{{/if}}{{#if header}}{{header}}
{{/if}}

{{#each schemas}}{{#if code}}{{var_name}} = {{code}}
{{/if}}{{/each}}
_schemas: dict[str, type] = {
{{#each schemas}}{{#if code}}    "{{key}}": {{var_name}},
{{/if}}{{/each}}}


class xschema(XSchemaBase):
{{footer}}


schemas = _schemas
"#;

/// Builds the `@overload` stubs giving `xschema.from_url`/`from_file` a
/// typed surface: one overload per generated schema keyed by its
/// `Literal["namespace:id"]`, plus a generic fallback and the runtime
/// implementation backed by the `_schemas` table.
pub(super) fn build_python_footer(schemas: &[SchemaEntry]) -> String {
    let typed: Vec<&SchemaEntry> = schemas.iter().filter(|s| !s.code.is_empty()).collect();
    if typed.is_empty() {
        return "    pass".to_string();
    }

    let mut lines: Vec<String> = Vec::new();

    for method in ["from_url", "from_file"] {
        let arg = if method == "from_url" { "url" } else { "path" };
        for entry in &typed {
            lines.push(format!(
                "    @staticmethod\n    @overload\n    def {method}(name: Literal[\"{}\"], {arg}: str, adapter: XSchemaAdapter) -> type[{}]: ...",
                entry.key(),
                entry.variable_name,
            ));
        }
        lines.push(format!(
            "    @staticmethod\n    @overload\n    def {method}(name: str, {arg}: str, adapter: XSchemaAdapter) -> type: ..."
        ));
        lines.push(format!(
            "\n    @staticmethod\n    def {method}(name: str, {arg}: str, adapter: XSchemaAdapter) -> type:\n        _ = {arg}, adapter\n        return _schemas[name]"
        ));
        if method == "from_url" {
            lines.push(String::new());
        }
    }

    lines.join("\n")
}
