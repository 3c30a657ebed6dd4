use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::validation::double_option;

#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub subcategory: String,
    pub technology: Option<String>,
    pub dataset_url: Option<String>,
    pub dataset_description: Option<String>,
    pub overview: Option<String>,
    pub task: Option<String>,
    pub outcomes: Option<String>,
    pub image_1: Option<String>,
    pub image_2: Option<String>,
    pub sample_sol: Option<String>,
}

/// Payload for creating a challenge. Required fields are optional here so a
/// missing key reports the same validation error as an empty one.
#[derive(Serialize, Deserialize, Validate, Debug, Clone, Default)]
pub struct NewChallenge {
    #[validate(
        required(message = "Missing required field: title"),
        length(min = 1, message = "Missing required field: title")
    )]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(
        required(message = "Missing required field: difficulty"),
        length(min = 1, message = "Missing required field: difficulty")
    )]
    pub difficulty: Option<String>,
    #[validate(
        required(message = "Missing required field: subcategory"),
        length(min = 1, message = "Missing required field: subcategory")
    )]
    pub subcategory: Option<String>,
    pub technology: Option<String>,
    pub dataset_url: Option<String>,
    pub dataset_description: Option<String>,
    pub overview: Option<String>,
    pub task: Option<String>,
    pub outcomes: Option<String>,
    pub image_1: Option<String>,
    pub image_2: Option<String>,
    pub sample_sol: Option<String>,
}

impl NewChallenge {
    pub fn new(title: &str, difficulty: &str, subcategory: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            difficulty: Some(difficulty.to_string()),
            subcategory: Some(subcategory.to_string()),
            ..Default::default()
        }
    }
}

/// Partial update. Outer `None` leaves a column untouched, `Some(None)` is an
/// explicit JSON null.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChallengePatch {
    #[serde(default, deserialize_with = "double_option")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub difficulty: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub subcategory: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub technology: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub dataset_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub dataset_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub overview: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub task: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub outcomes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_1: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_2: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub sample_sol: Option<Option<String>>,
}

fn patch_required(
    target: &mut String,
    value: &Option<Option<String>>,
    field: &str,
) -> Result<(), AppError> {
    match value {
        None => Ok(()),
        Some(Some(v)) if !v.is_empty() => {
            *target = v.clone();
            Ok(())
        }
        Some(_) => Err(AppError::Validation(format!(
            "Field {} cannot be empty",
            field
        ))),
    }
}

fn patch_optional(target: &mut Option<String>, value: &Option<Option<String>>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

impl ChallengePatch {
    /// Applies the supplied fields onto `challenge`. Fails without touching
    /// anything when a required field would become empty.
    pub fn apply_to(&self, challenge: &mut Challenge) -> Result<(), AppError> {
        let mut updated = challenge.clone();

        patch_required(&mut updated.title, &self.title, "title")?;
        patch_required(&mut updated.difficulty, &self.difficulty, "difficulty")?;
        patch_required(&mut updated.subcategory, &self.subcategory, "subcategory")?;

        patch_optional(&mut updated.description, &self.description);
        patch_optional(&mut updated.technology, &self.technology);
        patch_optional(&mut updated.dataset_url, &self.dataset_url);
        patch_optional(&mut updated.dataset_description, &self.dataset_description);
        patch_optional(&mut updated.overview, &self.overview);
        patch_optional(&mut updated.task, &self.task);
        patch_optional(&mut updated.outcomes, &self.outcomes);
        patch_optional(&mut updated.image_1, &self.image_1);
        patch_optional(&mut updated.image_2, &self.image_2);
        patch_optional(&mut updated.sample_sol, &self.sample_sol);

        *challenge = updated;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pathway {
    pub id: i64,
    pub name: String,
    pub challenge_ids: Vec<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPathway {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub challenge_ids: Option<String>,
}

impl From<DbPathway> for Pathway {
    fn from(pathway: DbPathway) -> Self {
        Self {
            id: pathway.id.unwrap_or_default(),
            name: pathway.name.unwrap_or_default(),
            challenge_ids: decode_challenge_ids(&pathway.challenge_ids.unwrap_or_default()),
        }
    }
}

/// Decodes a comma separated id list, keeping order. Segments that are not
/// positive integers are dropped.
pub fn decode_challenge_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|segment| segment.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect()
}

pub fn encode_challenge_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
