use std::sync::Arc;

use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

use crate::error::AppError;

/// Server-rendered pages, compiled into the binary.
#[derive(Clone)]
pub struct Templates {
    env: Arc<Environment<'static>>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("welcome.html", include_str!("../templates/welcome.html"))?;
        env.add_template("admin.html", include_str!("../templates/admin.html"))?;
        Ok(Templates { env: Arc::new(env) })
    }

    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<Html<String>, AppError> {
        let template = self.env.get_template(name)?;
        Ok(Html(template.render(context)?))
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.env.templates().map(|(name, _)| name).collect();
        f.debug_struct("Templates").field("templates", &names).finish()
    }
}
