//! Jinja environment for warehouse statements and user query templates

use crate::error::{JinjaError, JinjaResult};
use crate::functions::{ident, literal, make_var_fn, yaml_to_json};
use crate::templates::dialect_templates;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::HashMap;

/// Renders the bundled statement templates of one SQL dialect and the
/// `.sql.jinja` query files of a project.
pub struct QueryRenderer {
    env: Environment<'static>,
    dialect: String,
}

impl QueryRenderer {
    /// Create a renderer for `dialect` with variables from config
    pub fn new(dialect: &str, vars: &HashMap<String, serde_yaml::Value>) -> JinjaResult<Self> {
        let templates = dialect_templates(dialect).ok_or_else(|| JinjaError::UnknownTemplate {
            name: "*".to_string(),
            dialect: dialect.to_string(),
        })?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("ident", ident);
        env.add_filter("literal", literal);

        let json_vars: HashMap<String, serde_json::Value> = vars
            .iter()
            .map(|(k, v)| (k.clone(), yaml_to_json(v)))
            .collect();
        env.add_function("var", make_var_fn(json_vars));

        for &(name, source) in templates {
            env.add_template(name, source)?;
        }

        Ok(Self {
            env,
            dialect: dialect.to_string(),
        })
    }

    /// Render a bundled statement template
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> JinjaResult<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| JinjaError::UnknownTemplate {
                name: name.to_string(),
                dialect: self.dialect.clone(),
            })?;
        let sql = template.render(ctx)?;
        log::debug!("Rendered {}: {}", name, sql);
        Ok(sql)
    }

    /// Render a user query template
    pub fn render_query<S: Serialize>(&self, source: &str, ctx: S) -> JinjaResult<String> {
        self.env.render_str(source, ctx).map_err(|err| {
            if err.kind() == minijinja::ErrorKind::UndefinedError {
                if let Some(name) = undefined_variable(&err) {
                    return JinjaError::UnknownVariable { name };
                }
            }
            JinjaError::from(err)
        })
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }
}

fn undefined_variable(err: &minijinja::Error) -> Option<String> {
    let detail = err.detail()?;
    let rest = detail.strip_prefix("Variable '")?;
    rest.split('\'').next().map(str::to_string)
}

#[cfg(test)]
#[path = "environment_test.rs"]
mod tests;
