//! Stored analysis records.

use serde::{Deserialize, Serialize};

/// Highest score a category can carry.
pub const MAX_SCORE: f64 = 100.0;

/// An analysis record as persisted under `resume:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    /// Location of the rendered first-page preview
    pub image_path: String,
    /// Location of the uploaded PDF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_path: Option<String>,
    pub feedback: Feedback,
}

/// Scores and tips per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub overall_score: f64,
    #[serde(rename = "ATS")]
    pub ats: Category,
    pub tone_and_style: Category,
    pub content: Category,
    pub structure: Category,
    pub skills: Category,
}

impl Feedback {
    /// Every score, overall first.
    pub fn scores(&self) -> [f64; 6] {
        [
            self.overall_score,
            self.ats.score,
            self.tone_and_style.score,
            self.content.score,
            self.structure.score,
            self.skills.score,
        ]
    }

    /// First score outside `0..=MAX_SCORE`, if any.
    pub fn out_of_range_score(&self) -> Option<f64> {
        self.scores()
            .into_iter()
            .find(|score| !(0.0..=MAX_SCORE).contains(score))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub score: f64,
    #[serde(default)]
    pub tips: Vec<Tip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipKind {
    Good,
    Improve,
}

impl TipKind {
    /// Icon shown next to the tip.
    pub fn icon(&self) -> &'static str {
        match self {
            TipKind::Good => "/icons/check.svg",
            TipKind::Improve => "/icons/warning.svg",
        }
    }
}
