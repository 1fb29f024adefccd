//! Tron render: template catalogs and the manifest renderer.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod renderer;

pub use catalog::{StaticCatalog, TemplateCatalog};
pub use renderer::{load_secrets_template, RenderVariables, Rendered, Renderer, BUILTIN_SECRETS_TEMPLATE, SECRETS_TEMPLATE_ENV};
