//! static model catalog. names are not checked against the api; a listed
//! model can still fail at request time.

use serde::{Deserialize, Serialize};

/// models known to work reliably. the first one is the default.
pub const RECOMMENDED_MODELS: &[&str] = &[
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-2.0-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro-latest",
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-1.5-flash-002",
    "gemini-1.5-pro-002",
    "gemini-2.0-flash-001",
];

/// preview models that might be unstable or gone.
pub const EXPERIMENTAL_MODELS: &[&str] = &[
    "gemini-exp-1206",
    "gemini-2.0-flash-thinking-exp",
    "gemini-2.0-flash-thinking-exp-01-21",
    "gemini-2.0-flash-thinking-exp-1219",
    "gemini-2.0-flash-exp",
    "gemini-2.0-pro-exp",
    "gemini-2.0-pro-exp-02-05",
    "learnlm-2.0-flash-experimental",
    "gemini-2.5-pro-preview-03-25",
    "gemini-2.5-flash-preview-05-20",
    "gemini-2.5-flash-lite-preview-06-17",
    "gemini-2.5-pro-preview-05-06",
    "gemini-2.5-pro-preview-06-05",
    "gemini-2.0-flash-exp-image-generation",
    "gemini-2.0-flash-preview-image-generation",
    "gemini-2.0-flash-lite-preview-02-05",
    "gemini-2.0-flash-lite-preview",
    "gemini-2.5-flash-preview-tts",
    "gemini-2.5-pro-preview-tts",
    "gemini-2.5-flash-image-preview",
];

/// lightweight or task-specific models.
pub const SPECIALIZED_MODELS: &[&str] = &[
    "gemini-1.5-flash-8b",
    "gemini-1.5-flash-8b-001",
    "gemini-1.5-flash-8b-latest",
    "gemini-2.0-flash-lite-001",
    "gemini-2.0-flash-lite",
    "gemini-2.5-flash-lite",
    "gemma-3-1b-it",
    "gemma-3-4b-it",
    "gemma-3-12b-it",
    "gemma-3-27b-it",
    "gemma-3n-e4b-it",
    "gemma-3n-e2b-it",
];

/// suggested after a failed turn.
pub const FALLBACK_SUGGESTIONS: [&str; 3] = ["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelCategory {
    #[default]
    Recommended,
    Experimental,
    Specialized,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 3] =
        [ModelCategory::Recommended, ModelCategory::Experimental, ModelCategory::Specialized];

    pub fn models(self) -> &'static [&'static str] {
        match self {
            ModelCategory::Recommended => RECOMMENDED_MODELS,
            ModelCategory::Experimental => EXPERIMENTAL_MODELS,
            ModelCategory::Specialized => SPECIALIZED_MODELS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelCategory::Recommended => "recommended",
            ModelCategory::Experimental => "experimental",
            ModelCategory::Specialized => "specialized",
        }
    }

    /// cycles recommended -> experimental -> specialized -> recommended.
    pub fn next(self) -> Self {
        match self {
            ModelCategory::Recommended => ModelCategory::Experimental,
            ModelCategory::Experimental => ModelCategory::Specialized,
            ModelCategory::Specialized => ModelCategory::Recommended,
        }
    }

    /// which list a name belongs to, if any.
    pub fn of(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.models().contains(&name))
    }
}

/// stability badge shown next to the active model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    Stable,
    Experimental,
    Specialized,
}

impl ModelStatus {
    /// names outside the catalog are treated as specialized.
    pub fn of(name: &str) -> Self {
        match ModelCategory::of(name) {
            Some(ModelCategory::Recommended) => ModelStatus::Stable,
            Some(ModelCategory::Experimental) => ModelStatus::Experimental,
            Some(ModelCategory::Specialized) | None => ModelStatus::Specialized,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelStatus::Stable => "stable model",
            ModelStatus::Experimental => "experimental model",
            ModelStatus::Specialized => "specialized model",
        }
    }
}

pub fn default_model() -> &'static str {
    RECOMMENDED_MODELS[0]
}

/// the model picked in the ui: a category plus a position in its list, or a
/// free-form name set from config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSelection {
    category: ModelCategory,
    index: usize,
    custom: Option<String>,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self { category: ModelCategory::Recommended, index: 0, custom: None }
    }
}

impl ModelSelection {
    /// select `name`, snapping to its catalog position when it is listed.
    pub fn named(name: &str) -> Self {
        match ModelCategory::of(name) {
            Some(category) => {
                let index = category.models().iter().position(|m| *m == name).unwrap_or(0);
                Self { category, index, custom: None }
            }
            None => Self { custom: Some(name.to_string()), ..Self::default() },
        }
    }

    pub fn name(&self) -> &str {
        match &self.custom {
            Some(name) => name,
            None => self.category.models()[self.index],
        }
    }

    pub fn category(&self) -> ModelCategory {
        self.category
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus::of(self.name())
    }

    /// switch lists; starts at the top of the new list.
    pub fn set_category(&mut self, category: ModelCategory) {
        self.category = category;
        self.index = 0;
        self.custom = None;
    }

    pub fn next(&mut self) {
        let len = self.category.models().len();
        if self.custom.take().is_none() {
            self.index = (self.index + 1) % len;
        }
    }

    pub fn prev(&mut self) {
        let len = self.category.models().len();
        if self.custom.take().is_none() {
            self.index = (self.index + len - 1) % len;
        }
    }
}
