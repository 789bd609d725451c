use crate::template::builtin;
use crate::template::{Template, TemplateCategory, TemplateError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source of prompt templates.
pub trait TemplateStore: Send + Sync {
    /// Fails with [`TemplateError::NotFound`] when absent.
    fn get(&self, category: TemplateCategory, name: &str) -> Result<Arc<Template>, TemplateError>;

    /// Template names in `category`, sorted.
    fn list(&self, category: TemplateCategory) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateStore {
    templates: BTreeMap<(TemplateCategory, String), Arc<Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with the shipped templates.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut store = Self::new();
        for (category, name, body) in builtin::TEMPLATES {
            store.insert(Template::new(*category, name, body)?);
        }
        Ok(store)
    }

    /// Adds or replaces a template.
    pub fn insert(&mut self, template: Template) {
        self.templates
            .insert((template.category, template.name.clone()), Arc::new(template));
    }

    pub fn with_template(
        mut self,
        category: TemplateCategory,
        name: &str,
        body: &str,
    ) -> Result<Self, TemplateError> {
        self.insert(Template::new(category, name, body)?);
        Ok(self)
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn get(&self, category: TemplateCategory, name: &str) -> Result<Arc<Template>, TemplateError> {
        self.templates
            .get(&(category, name.to_string()))
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                id: format!("{category}/{name}"),
            })
    }

    fn list(&self, category: TemplateCategory) -> Vec<String> {
        self.templates
            .keys()
            .filter(|(c, _)| *c == category)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_store_lists_all_categories() {
        let store = InMemoryTemplateStore::builtin().unwrap();
        assert_eq!(
            store.list(TemplateCategory::Transcription),
            vec!["multi_speaker", "optimization", "single_speaker"]
        );
        assert_eq!(store.list(TemplateCategory::Analysis).len(), 5);
        assert_eq!(
            store.list(TemplateCategory::Proposal),
            vec!["project_proposal", "quotation_proposal", "solution_brief"]
        );
    }

    #[test]
    fn test_missing_template() {
        let store = InMemoryTemplateStore::builtin().unwrap();
        let err = store.get(TemplateCategory::Analysis, "horoscope").unwrap_err();
        assert_eq!(err.to_string(), "template not found: analysis/horoscope");
    }

    #[test]
    fn test_custom_template_overrides() {
        let store = InMemoryTemplateStore::builtin()
            .unwrap()
            .with_template(TemplateCategory::Analysis, "customer_interview", "Short: {transcript}")
            .unwrap();
        let t = store.get(TemplateCategory::Analysis, "customer_interview").unwrap();
        assert_eq!(t.variables, vec!["transcript"]);
    }

    #[test]
    fn test_store_is_object_safe() {
        let store: Arc<dyn TemplateStore> = Arc::new(InMemoryTemplateStore::builtin().unwrap());
        assert!(store.get(TemplateCategory::Proposal, "solution_brief").is_ok());
    }
}
