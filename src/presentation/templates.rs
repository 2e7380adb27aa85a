//! Startup-built cache of compiled page templates.
//!
//! Every page under `<root>/pages/` becomes one artifact combining the shared
//! base layout, all shared partials and that page, keyed by the page's file
//! name (e.g. `home.tmpl.html`). The cache is immutable once built and is
//! shared read-only by all requests.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use minijinja::Environment;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub const BASE_TEMPLATE: &str = "base.tmpl.html";
pub const PARTIALS_DIR: &str = "partials";
pub const PAGES_DIR: &str = "pages";
pub const TEMPLATE_SUFFIX: &str = ".tmpl.html";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no page templates found under `{0}`")]
    NoPages(PathBuf),
    #[error("template `{name}` failed to parse")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("template `{0}` is not in the cache")]
    NotFound(String),
    #[error("template `{name}` failed to render")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

impl TemplateError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One page compiled together with the base layout and every partial.
#[derive(Debug)]
pub struct TemplateArtifact {
    name: String,
    env: Environment<'static>,
}

impl TemplateArtifact {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render fully into memory so a failure never leaves a half-written page.
    pub fn render<S: Serialize>(&self, data: &S) -> Result<String, TemplateError> {
        let render_err = |source| TemplateError::Render {
            name: self.name.clone(),
            source,
        };
        self.env
            .get_template(&self.name)
            .map_err(render_err)?
            .render(data)
            .map_err(render_err)
    }
}

#[derive(Debug)]
pub struct TemplateCache {
    artifacts: HashMap<String, TemplateArtifact>,
}

impl TemplateCache {
    /// Compile every page under `root`. Any unreadable file, parse error or an
    /// empty page set aborts the build; there is no partial cache.
    pub fn build(root: &Path) -> Result<Self, TemplateError> {
        let base_path = root.join(BASE_TEMPLATE);
        let base = read_source(&base_path)?;
        let partials = list_templates(&root.join(PARTIALS_DIR))?
            .into_iter()
            .map(|path| {
                let source = read_source(&path)?;
                Ok((format!("{PARTIALS_DIR}/{}", file_name(&path)), source))
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        let pages_dir = root.join(PAGES_DIR);
        let pages = list_templates(&pages_dir)?;
        if pages.is_empty() {
            return Err(TemplateError::NoPages(pages_dir));
        }

        let mut artifacts = HashMap::with_capacity(pages.len());
        for page in pages {
            let name = file_name(&page);
            let source = read_source(&page)?;

            let mut env = Environment::new();
            add_template(&mut env, BASE_TEMPLATE.to_string(), base.clone())?;
            for (partial_name, partial_source) in &partials {
                add_template(&mut env, partial_name.clone(), partial_source.clone())?;
            }
            add_template(&mut env, name.clone(), source)?;

            debug!(target = "bestdeal::templates", page = %name, "compiled page template");
            artifacts.insert(name.clone(), TemplateArtifact { name, env });
        }

        info!(
            target = "bestdeal::templates",
            root = %root.display(),
            pages = artifacts.len(),
            partials = partials.len(),
            "template cache built"
        );

        Ok(Self { artifacts })
    }

    pub fn get(&self, name: &str) -> Option<&TemplateArtifact> {
        self.artifacts.get(name)
    }

    pub fn render<S: Serialize>(&self, name: &str, data: &S) -> Result<String, TemplateError> {
        let artifact = self
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        let outcome = artifact.render(data);
        let label = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "bestdeal_template_render_total",
            "template" => name.to_string(),
            "outcome" => label
        )
        .increment(1);
        outcome
    }

    /// Page names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.artifacts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn add_template(
    env: &mut Environment<'static>,
    name: String,
    source: String,
) -> Result<(), TemplateError> {
    env.add_template_owned(name.clone(), source)
        .map_err(|source| TemplateError::Parse { name, source })
}

fn read_source(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|err| TemplateError::io(path, err))
}

fn list_templates(dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let entries = fs::read_dir(dir).map_err(|err| TemplateError::io(dir, err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| TemplateError::io(dir, err))?.path();
        if path.is_file() && file_name(&path).ends_with(TEMPLATE_SUFFIX) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(path, body).expect("write template");
    }

    fn scaffold(root: &Path) {
        write(
            root,
            BASE_TEMPLATE,
            "<title>{% block title %}{% endblock %}</title>{% include \"partials/nav.tmpl.html\" %}<main>{% block main %}{% endblock %}</main>",
        );
        write(root, "partials/nav.tmpl.html", "<nav>{{ nav_label }}</nav>");
    }

    #[test]
    fn pages_are_keyed_by_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        scaffold(dir.path());
        write(
            dir.path(),
            "pages/home.tmpl.html",
            "{% extends \"base.tmpl.html\" %}{% block title %}Home{% endblock %}{% block main %}hi {{ name }}{% endblock %}",
        );
        write(dir.path(), "pages/notes.txt", "ignored");

        let cache = TemplateCache::build(dir.path()).expect("cache builds");
        assert_eq!(cache.names(), vec!["home.tmpl.html"]);

        let html = cache
            .render("home.tmpl.html", &json!({ "name": "<b>", "nav_label": "Nav" }))
            .expect("renders");
        assert_eq!(
            html,
            "<title>Home</title><nav>Nav</nav><main>hi &lt;b&gt;</main>"
        );
    }

    #[test]
    fn empty_page_directory_fails_the_build() {
        let dir = tempfile::tempdir().expect("tempdir");
        scaffold(dir.path());
        fs::create_dir_all(dir.path().join(PAGES_DIR)).expect("pages dir");

        let err = TemplateCache::build(dir.path()).expect_err("no pages");
        assert!(matches!(err, TemplateError::NoPages(_)));
    }

    #[test]
    fn missing_directory_fails_the_build() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TemplateCache::build(&dir.path().join("nope")).expect_err("missing");
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn syntax_error_fails_the_build() {
        let dir = tempfile::tempdir().expect("tempdir");
        scaffold(dir.path());
        write(dir.path(), "pages/broken.tmpl.html", "{% block main %}");

        let err = TemplateCache::build(dir.path()).expect_err("parse error");
        assert!(matches!(err, TemplateError::Parse { ref name, .. } if name == "broken.tmpl.html"));
    }

    #[test]
    fn unknown_page_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        scaffold(dir.path());
        write(dir.path(), "pages/about.tmpl.html", "about");

        let cache = TemplateCache::build(dir.path()).expect("cache builds");
        let err = cache
            .render("missing.tmpl.html", &json!({}))
            .expect_err("not cached");
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[test]
    fn pages_do_not_see_each_other() {
        let dir = tempfile::tempdir().expect("tempdir");
        scaffold(dir.path());
        write(dir.path(), "pages/a.tmpl.html", "a");
        write(
            dir.path(),
            "pages/b.tmpl.html",
            "{% include \"a.tmpl.html\" %}",
        );

        let cache = TemplateCache::build(dir.path()).expect("cache builds");
        assert!(cache.render("b.tmpl.html", &json!({})).is_err());
    }
}
