use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trusted recipe sites. The search engine allows a few more, but these are
/// queried explicitly and preferred during ranking.
pub const PREFERRED_RECIPE_SITES: &[&str] = &[
    "seriouseats.com",
    "recipetineats.com",
    "smittenkitchen.com",
    "americastestkitchen.com",
    "rainbowplantlife.com",
    "notanothercookingshow.tv",
    "saltandlavender.com",
    "budgetbytes.com",
];

const MAX_ALLERGENS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticityMode {
    Classic,
    #[default]
    Simplified,
    Healthy,
}

impl AuthenticityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticityMode::Classic => "classic",
            AuthenticityMode::Simplified => "simplified",
            AuthenticityMode::Healthy => "healthy",
        }
    }
}

impl std::str::FromStr for AuthenticityMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(AuthenticityMode::Classic),
            "simplified" => Ok(AuthenticityMode::Simplified),
            "healthy" => Ok(AuthenticityMode::Healthy),
            _ => Err(ValidationError::Authenticity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("dishName is required")]
    MissingDishName,
    #[error("dishName must be between 2 and 100 characters")]
    DishNameLength,
    #[error("authenticity must be one of: classic, simplified, healthy")]
    Authenticity,
    #[error("servings must be a positive number")]
    Servings,
    #[error("maxTimeMinutes must be a positive number")]
    MaxTime,
    #[error("too many dietary restrictions (max 10)")]
    TooManyAllergens,
}

/// Input for one merge job. Immutable once the job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecipeRequest {
    pub dish_name: String,
    /// Missing or null decodes to `simplified`.
    #[serde(default, deserialize_with = "authenticity_or_default")]
    pub authenticity: AuthenticityMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub servings: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_minutes: Option<i32>,
}

fn authenticity_or_default<'de, D>(deserializer: D) -> Result<AuthenticityMode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(AuthenticityMode::default()),
        Some(value) => value.parse().map_err(serde::de::Error::custom),
    }
}

impl MergeRecipeRequest {
    pub fn new(dish_name: impl Into<String>) -> Self {
        Self {
            dish_name: dish_name.into(),
            authenticity: AuthenticityMode::default(),
            allergens: Vec::new(),
            servings: 0,
            max_time_minutes: None,
        }
    }

    /// Normalizes the request in place and rejects malformed input.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        self.dish_name = self.dish_name.trim().to_string();
        if self.dish_name.is_empty() {
            return Err(ValidationError::MissingDishName);
        }
        let len = self.dish_name.chars().count();
        if !(2..=100).contains(&len) {
            return Err(ValidationError::DishNameLength);
        }
        if self.servings < 0 {
            return Err(ValidationError::Servings);
        }
        if matches!(self.max_time_minutes, Some(minutes) if minutes <= 0) {
            return Err(ValidationError::MaxTime);
        }
        if self.allergens.len() > MAX_ALLERGENS {
            return Err(ValidationError::TooManyAllergens);
        }
        Ok(())
    }
}

/// One search hit offered to the ranking oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeCandidate {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub domain: String,
}

/// Recipe pulled out of a single source page, before merging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedRecipe {
    pub title: String,
    pub source_url: String,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub total_time_minutes: i32,
    pub prep_time_minutes: i32,
    pub cook_time_minutes: i32,
    pub wait_time_minutes: i32,
    pub servings: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergedRecipe {
    pub title: String,
    pub description: String,
    pub servings: i32,
    pub total_time_minutes: i32,
    pub prep_time_minutes: i32,
    pub cook_time_minutes: i32,
    pub wait_time_minutes: i32,
    pub ingredients: Vec<StructuredIngredient>,
    pub steps: Vec<StructuredStep>,
    pub cuisine: String,
    pub difficulty_level: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredIngredient {
    pub quantity: String,
    pub unit: String,
    pub ingredient: String,
    pub preparation: String,
    pub substitution_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredStep {
    pub step_number: i32,
    pub instruction: String,
    pub time_minutes: i32,
    pub technique: String,
    pub tips: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AllergenSubstitution {
    pub original: String,
    pub replacement: String,
    pub allergens_addressed: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariationSuggestion {
    pub name: String,
    pub description: String,
    pub change_type: String,
    pub changes: Vec<String>,
}

/// What the merge oracle hands back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOutcome {
    pub merged_recipe: MergedRecipe,
    pub allergen_substitutions: Vec<AllergenSubstitution>,
    pub variation_suggestions: Vec<VariationSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecipeResponse {
    pub merged_recipe: MergedRecipe,
    /// Sources that went into the merge, in rank order.
    pub source_urls: Vec<String>,
    pub allergen_substitutions: Vec<AllergenSubstitution>,
    pub variation_suggestions: Vec<VariationSuggestion>,
}

/// Job lifecycle. Variants are declared in pipeline order; the derived
/// ordering is what the job store uses to keep transitions forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Searching,
    Ranking,
    Fetching,
    Parsing,
    Merging,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    fn next(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::Searching),
            JobStatus::Searching => Some(JobStatus::Ranking),
            JobStatus::Ranking => Some(JobStatus::Fetching),
            JobStatus::Fetching => Some(JobStatus::Parsing),
            JobStatus::Parsing => Some(JobStatus::Merging),
            JobStatus::Merging => Some(JobStatus::Complete),
            JobStatus::Complete | JobStatus::Failed => None,
        }
    }

    /// Staying in the current stage is allowed (several events per stage);
    /// otherwise only the immediate successor or `Failed` is reachable.
    pub fn can_advance_to(&self, target: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == *self || target == JobStatus::Failed || self.next() == Some(target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Searching => "searching",
            JobStatus::Ranking => "ranking",
            JobStatus::Fetching => "fetching",
            JobStatus::Parsing => "parsing",
            JobStatus::Merging => "merging",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }
}

/// Stage-specific data attached to a progress event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProgressPayload {
    Candidates { count: usize },
    Selected { count: usize },
    Fetched { succeeded: usize, failed: usize },
    Parsed { parsed: usize, merging: usize },
    Complete(Box<MergeRecipeResponse>),
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProgressPayload>,
}

impl ProgressEvent {
    pub fn new(stage: JobStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: ProgressPayload) -> Self {
        self.data = Some(data);
        self
    }

    pub fn complete(result: MergeRecipeResponse) -> Self {
        Self::new(JobStatus::Complete, "Recipe merged successfully")
            .with_data(ProgressPayload::Complete(Box::new(result)))
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(JobStatus::Failed, format!("Failed to merge recipes: {}", error))
            .with_data(ProgressPayload::Failure { error })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeJob {
    pub id: String,
    pub status: JobStatus,
    pub progress: Vec<ProgressEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MergeRecipeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request: MergeRecipeRequest,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    /// Monotonic clock reading of the last mutation, used by the reaper.
    #[serde(skip)]
    pub(crate) touched: tokio::time::Instant,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_trims_and_defaults() {
        let mut request: MergeRecipeRequest =
            serde_json::from_str(r#"{"dishName":"  pad thai  "}"#).unwrap();
        assert_eq!(request.validate(), Ok(()));
        assert_eq!(request.dish_name, "pad thai");
        assert_eq!(request.authenticity, AuthenticityMode::Simplified);
    }

    #[test]
    fn validate_rejects_bad_input() {
        let mut request = MergeRecipeRequest::new("   ");
        assert_eq!(request.validate(), Err(ValidationError::MissingDishName));

        let mut request = MergeRecipeRequest::new("x");
        assert_eq!(request.validate(), Err(ValidationError::DishNameLength));

        let mut request = MergeRecipeRequest::new("ramen");
        request.max_time_minutes = Some(0);
        assert_eq!(request.validate(), Err(ValidationError::MaxTime));

        let mut request = MergeRecipeRequest::new("ramen");
        request.allergens = (0..11).map(|i| format!("allergen-{}", i)).collect();
        assert_eq!(request.validate(), Err(ValidationError::TooManyAllergens));
    }

    #[test]
    fn unknown_authenticity_fails_to_decode() {
        let decoded =
            serde_json::from_str::<MergeRecipeRequest>(r#"{"dishName":"ramen","authenticity":"fusion"}"#);
        assert!(decoded.is_err());
    }

    #[test]
    fn transitions_only_move_forward() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Searching));
        assert!(JobStatus::Searching.can_advance_to(JobStatus::Searching));
        assert!(JobStatus::Ranking.can_advance_to(JobStatus::Failed));
        assert!(!JobStatus::Fetching.can_advance_to(JobStatus::Merging));
        assert!(!JobStatus::Merging.can_advance_to(JobStatus::Ranking));
        assert!(!JobStatus::Complete.can_advance_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Failed));
    }

    #[test]
    fn progress_payload_is_tagged() {
        let event = ProgressEvent::new(JobStatus::Searching, "Found 12 recipes")
            .with_data(ProgressPayload::Candidates { count: 12 });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["stage"], "searching");
        assert_eq!(value["data"]["kind"], "candidates");
        assert_eq!(value["data"]["count"], 12);
    }
}
