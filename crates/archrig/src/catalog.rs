//! Catalog template rendering and loading

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use archrig_provision::{Catalog, TargetUser};
use tera::Tera;

const DEFAULT_CATALOG: &str = include_str!("../templates/catalog.toml.tera");

/// Render a catalog template for `user`
pub fn render(template: &str, user: &TargetUser) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template("catalog", template)?;

    let mut context = tera::Context::new();
    context.insert("user", &user.name);
    context.insert("home", &user.home.display().to_string());
    context.insert("shell", &user.shell.display().to_string());

    tera.render("catalog", &context)
        .context("Failed to render catalog template")
}

/// Load the catalog at `path`, or the built-in one
pub fn load(path: Option<&Path>, user: &TargetUser) -> Result<Catalog> {
    let (source, template) = match path {
        Some(path) => (
            path.display().to_string(),
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog: {}", path.display()))?,
        ),
        None => ("built-in catalog".to_string(), DEFAULT_CATALOG.to_string()),
    };

    let text = render(&template, user).with_context(|| format!("In {source}"))?;
    Catalog::from_toml(&text).with_context(|| format!("Invalid catalog: {source}"))
}
