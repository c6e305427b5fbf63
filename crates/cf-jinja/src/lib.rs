//! cf-jinja - Templating layer for cdmflow
//!
//! Renders the bundled warehouse statement templates and the `.sql.jinja`
//! query files of a project. Templates see two filters, `ident` and
//! `literal`, and query files additionally see the `var()` function.

pub mod environment;
pub mod error;
pub(crate) mod functions;
pub mod templates;

pub use environment::QueryRenderer;
pub use error::{JinjaError, JinjaResult};
