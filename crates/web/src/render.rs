//! The optional HTML renderer seam.
//!
//! The engine owns at most one [`Renderer`]; `Context::render` fails with
//! [`Error::NoRenderer`] when none is configured. `Context::html` and
//! `Context::html_view` do not need a configured renderer; they run their
//! template through the built-in engine directly.

use std::path::PathBuf;

use crate::context::Context;
use crate::error::Error;

/// Renders a named template with the given data.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    fn render(&self, name: &str, data: &serde_json::Value, ctx: &Context) -> Result<String, Error>;
}

/// File-system backed renderer: template names resolve relative to a root
/// directory.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    root: PathBuf,
}

impl TemplateRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, name: &str, data: &serde_json::Value, _ctx: &Context) -> Result<String, Error> {
        let path = self.root.join(name);
        let source = std::fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("template {}: {e}", path.display())))?;
        render_template(&source, data)
    }
}

/// Render an in-memory template source.
pub(crate) fn render_template(source: &str, data: &serde_json::Value) -> Result<String, Error> {
    let mut env = minijinja::Environment::new();
    env.add_template("view", source)
        .map_err(|e| Error::encode(format!("template parse: {e}")))?;
    let template = env
        .get_template("view")
        .map_err(|e| Error::encode(e.to_string()))?;
    template
        .render(data)
        .map_err(|e| Error::encode(format!("template render: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_inline_templates() {
        let html = render_template("<h1>{{ title }}</h1>", &json!({"title": "Hi"})).unwrap();
        assert_eq!(html, "<h1>Hi</h1>");
    }

    #[test]
    fn surfaces_parse_errors() {
        assert!(render_template("{% bogus %}", &json!({})).is_err());
    }

    #[test]
    fn renderer_seam_is_mockable() {
        let mut mock = MockRenderer::new();
        mock.expect_render()
            .returning(|_, _, _| Ok("<mock/>".to_string()));

        let ctx = Context::from_request(
            http::Request::builder()
                .uri("/")
                .body(bytes::Bytes::new())
                .unwrap(),
        );
        let html = mock.render("view", &json!({}), &ctx).unwrap();
        assert_eq!(html, "<mock/>");
    }
}
