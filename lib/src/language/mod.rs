//! Target-language registry.
//!
//! Each supported language is a capability record: plain data (extensions,
//! `$schema` URL, output filename, regexes, template source) plus function
//! pointers for the behavior that genuinely differs per language (runner
//! detection, import merging, header/footer synthesis, import-path
//! spelling). Lookups are pure; the table is immutable after startup.

mod imports;
mod runner;
mod templates;

pub use imports::{merge_py_imports, merge_ts_imports};
pub use runner::Runner;

use std::path::Path;

/// Base URL that marks a config document as belonging to xschema.
pub const XSCHEMA_SCHEMA_BASE: &str = "https://xschema.dev/schemas/";

/// One schema row handed to the output template and to the header/footer
/// builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub namespace: String,
    pub id: String,
    /// Safe identifier, conventionally `namespace_id`.
    pub variable_name: String,
    /// Validator expression emitted by the adapter. May be empty.
    pub code: String,
    /// Compile-time type expression emitted by the adapter. May be empty.
    pub type_expression: String,
}

impl SchemaEntry {
    /// The namespaced key, e.g. `users:User`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

/// Capability record describing one target language.
pub struct Language {
    pub name: &'static str,
    /// Source-file extensions (with leading dot) this language claims.
    pub extensions: &'static [&'static str],
    /// The exact `$schema` URL binding a config document to this language.
    pub schema_url: &'static str,
    /// Filename of the generated module inside the output directory.
    pub output_file: &'static str,
    /// Regex matching one import statement line in a client file.
    pub import_pattern: &'static str,
    /// Name of the client-factory function whose first argument is edited.
    pub client_factory: &'static str,
    /// Template for the generated module; see [`crate::template`].
    pub template: &'static str,
    /// Directory names pruned during project walks.
    pub skip_dirs: &'static [&'static str],

    /// Builds the import statement that pulls `schemas` into the client.
    pub build_import: fn(import_path: &str) -> String,
    /// Turns `<out_base>/<output stem>` into the language's module path
    /// (e.g. `./.xschema/xschema.gen` or `.xschema.__init__`).
    pub import_path: fn(relative_path: &str) -> String,
    /// Optional text above the schema entries (package decls and the like).
    pub build_header: Option<fn(&[SchemaEntry]) -> String>,
    /// Optional text below the schema entries (overload stubs and the like).
    pub build_footer: Option<fn(&[SchemaEntry]) -> String>,
    /// Reduces all adapter-emitted import statements to a canonical block.
    pub merge_imports: fn(&[String]) -> String,
    /// Derives the generated variable name for one `(namespace, id)`.
    pub variable_name: fn(namespace: &str, id: &str) -> String,
    /// Picks the subprocess runner for adapters of this language.
    pub detect_runner: fn(project_root: &Path) -> Runner,
}

impl std::fmt::Debug for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Language").field("name", &self.name).finish()
    }
}

/// The registry. Order is stable and user-visible in error listings.
pub static LANGUAGES: &[Language] = &[
    Language {
        name: "typescript",
        extensions: &[".ts", ".tsx", ".js", ".jsx"],
        schema_url: "https://xschema.dev/schemas/ts.jsonc",
        output_file: "xschema.gen.ts",
        import_pattern: r"(?m)^import\s+.*$",
        client_factory: "createXSchemaClient",
        template: templates::TS_TEMPLATE,
        skip_dirs: &["node_modules", "dist", "build", ".next", "coverage"],
        build_import: ts_build_import,
        import_path: ts_import_path,
        build_header: None,
        build_footer: None,
        merge_imports: merge_ts_imports,
        variable_name: default_variable_name,
        detect_runner: runner::detect_ts_runner,
    },
    Language {
        name: "python",
        extensions: &[".py"],
        schema_url: "https://xschema.dev/schemas/py.jsonc",
        output_file: "__init__.py",
        import_pattern: r"(?m)^(?:import\s+|from\s+).*$",
        client_factory: "create_xschema_client",
        template: templates::PY_TEMPLATE,
        skip_dirs: &["__pycache__", ".venv", "venv", ".tox", ".mypy_cache"],
        build_import: py_build_import,
        import_path: py_import_path,
        build_header: None,
        build_footer: Some(templates::build_python_footer),
        merge_imports: merge_py_imports,
        variable_name: default_variable_name,
        detect_runner: runner::detect_python_runner,
    },
];

/// Returns the language with the given name.
pub fn by_name(name: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|lang| lang.name == name)
}

/// Returns the language claiming the given file extension (with dot).
pub fn by_extension(ext: &str) -> Option<&'static Language> {
    LANGUAGES
        .iter()
        .find(|lang| lang.extensions.contains(&ext))
}

/// Returns the language bound to the given config `$schema` URL.
pub fn by_schema_url(url: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|lang| lang.schema_url == url)
}

/// Whether a `$schema` URL falls under the xschema namespace at all.
pub fn is_xschema_url(url: &str) -> bool {
    url.starts_with(XSCHEMA_SCHEMA_BASE)
}

/// Directory names pruned during project walks, across all languages.
pub fn all_skip_dirs() -> Vec<&'static str> {
    let mut dirs: Vec<&'static str> = vec![".git", ".xschema", "target"];
    for lang in LANGUAGES {
        for &dir in lang.skip_dirs {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

/// `namespace_id` with non-identifier bytes replaced by `_`; a leading
/// digit gains a `_` prefix.
fn default_variable_name(namespace: &str, id: &str) -> String {
    let raw = format!("{namespace}_{id}");
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

fn ts_import_path(relative_path: &str) -> String {
    format!("./{relative_path}")
}

fn ts_build_import(import_path: &str) -> String {
    format!("import {{ schemas }} from \"{import_path}\";")
}

/// `.xschema/xschema` spelled as a relative Python module: `.xschema.xschema`.
fn py_import_path(relative_path: &str) -> String {
    let module = relative_path.replace('/', ".");
    if module.starts_with('.') {
        module
    } else {
        format!(".{module}")
    }
}

fn py_build_import(import_path: &str) -> String {
    format!("from {import_path} import schemas")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(by_name("typescript").unwrap().name, "typescript");
        assert_eq!(by_name("python").unwrap().name, "python");
        assert!(by_name("go").is_none());
    }

    #[test]
    fn lookup_by_extension() {
        assert_eq!(by_extension(".tsx").unwrap().name, "typescript");
        assert_eq!(by_extension(".py").unwrap().name, "python");
        assert!(by_extension(".rs").is_none());
    }

    #[test]
    fn lookup_by_schema_url() {
        let ts = by_schema_url("https://xschema.dev/schemas/ts.jsonc").unwrap();
        assert_eq!(ts.name, "typescript");
        assert!(by_schema_url("https://xschema.dev/schemas/rb.jsonc").is_none());
        assert!(by_schema_url("https://json.schemastore.org/eslintrc.json").is_none());
    }

    #[test]
    fn xschema_url_prefix() {
        assert!(is_xschema_url("https://xschema.dev/schemas/ts.jsonc"));
        assert!(is_xschema_url("https://xschema.dev/schemas/unknown.jsonc"));
        assert!(!is_xschema_url("https://example.com/schema.json"));
    }

    #[test]
    fn variable_name_sanitizes() {
        assert_eq!(default_variable_name("users", "User"), "users_User");
        assert_eq!(default_variable_name("my-api", "User"), "my_api_User");
        assert_eq!(default_variable_name("2fa", "Code"), "_2fa_Code");
    }

    #[test]
    fn ts_import_spelling() {
        let path = ts_import_path(".xschema/xschema.gen");
        assert_eq!(path, "./.xschema/xschema.gen");
        assert_eq!(
            ts_build_import(&path),
            "import { schemas } from \"./.xschema/xschema.gen\";"
        );
    }

    #[test]
    fn py_import_spelling() {
        assert_eq!(py_import_path(".xschema/__init__"), ".xschema.__init__");
        assert_eq!(py_import_path("gen/__init__"), ".gen.__init__");
    }

    #[test]
    fn skip_dirs_cover_both_ecosystems() {
        let dirs = all_skip_dirs();
        assert!(dirs.contains(&"node_modules"));
        assert!(dirs.contains(&"__pycache__"));
        assert!(dirs.contains(&".git"));
    }
}
