//! Prompt templates: lookup by category and name, and variable binding.

pub mod builtin;
pub mod render;
pub mod store;

pub use render::{Variables, declared_variables, render, render_named};
pub use store::{InMemoryTemplateStore, TemplateStore};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template not found: {id}")]
    NotFound { id: String },

    #[error("template {template} references {{{variable}}} but no value was supplied")]
    MissingVariable { template: String, variable: String },

    #[error("template {template} is malformed: {message}")]
    Malformed { template: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TemplateCategory {
    Transcription,
    Analysis,
    Proposal,
}

impl TemplateCategory {
    pub const ALL: [TemplateCategory; 3] = [
        TemplateCategory::Transcription,
        TemplateCategory::Analysis,
        TemplateCategory::Proposal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateCategory::Transcription => "transcription",
            TemplateCategory::Analysis => "analysis",
            TemplateCategory::Proposal => "proposal",
        }
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateCategory {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcription" => Ok(TemplateCategory::Transcription),
            "analysis" => Ok(TemplateCategory::Analysis),
            "proposal" => Ok(TemplateCategory::Proposal),
            other => Err(TemplateError::NotFound {
                id: format!("{other}/*"),
            }),
        }
    }
}

/// A named prompt body and the variables it references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub category: TemplateCategory,
    pub name: String,
    pub body: String,
    pub variables: Vec<String>,
}

impl Template {
    /// Parses `body` to collect its variables.
    pub fn new(
        category: TemplateCategory,
        name: &str,
        body: &str,
    ) -> Result<Self, TemplateError> {
        let id = format!("{category}/{name}");
        let variables = declared_variables(body).map_err(|e| match e {
            TemplateError::Malformed { message, .. } => TemplateError::Malformed {
                template: id.clone(),
                message,
            },
            other => other,
        })?;
        Ok(Self {
            category,
            name: name.to_string(),
            body: body.to_string(),
            variables,
        })
    }

    /// `category/name`
    pub fn id(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    pub fn render(&self, variables: &Variables) -> Result<String, TemplateError> {
        render_named(&self.id(), &self.body, variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_collects_variables() {
        let t = Template::new(TemplateCategory::Proposal, "p", "{analysis_report} {client_profile}")
            .unwrap();
        assert_eq!(t.variables, vec!["analysis_report", "client_profile"]);
        assert_eq!(t.id(), "proposal/p");
    }

    #[test]
    fn test_malformed_template_names_itself() {
        let err = Template::new(TemplateCategory::Analysis, "broken", "x {open").unwrap_err();
        assert_eq!(
            err.to_string(),
            "template analysis/broken is malformed: unterminated placeholder {open"
        );
    }

    #[test]
    fn test_missing_variable_display() {
        let t = Template::new(TemplateCategory::Proposal, "p", "{capability_docs}").unwrap();
        let err = t.render(&Variables::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "template proposal/p references {capability_docs} but no value was supplied"
        );
    }

    #[test]
    fn test_category_round_trip() {
        for category in TemplateCategory::ALL {
            assert_eq!(category.as_str().parse::<TemplateCategory>().unwrap(), category);
        }
        assert!("billing".parse::<TemplateCategory>().is_err());
    }
}
