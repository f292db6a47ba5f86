//! Results page: load a stored analysis and shape it for display.

use serde::Serialize;
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

use super::store::{KvStore, StoreError};
use super::types::{Category, Resume, Tip, TipKind};

/// Where error states send the user back to.
pub const HOME_ROUTE: &str = "/";

/// Key prefix of analysis records in the store.
pub const RECORD_PREFIX: &str = "resume:";

/// Why the page could not show an analysis. Every variant is terminal.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("No resume ID provided")]
    MissingId,

    #[error("Resume not found")]
    NotFound,

    #[error("Failed to load resume data")]
    StoreUnavailable(#[source] StoreError),

    #[error("Failed to load resume data")]
    Malformed(String),
}

impl Serialize for PageError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Store key for a route id. The id may arrive percent-encoded.
pub fn record_key(id: &str) -> String {
    let decoded = urlencoding::decode(id)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| id.to_string());
    format!("{}{}", RECORD_PREFIX, decoded)
}

/// Parse and validate a stored record.
pub fn parse_record(raw: &str) -> Result<Resume, PageError> {
    let resume: Resume =
        serde_json::from_str(raw).map_err(|e| PageError::Malformed(e.to_string()))?;
    if let Some(score) = resume.feedback.out_of_range_score() {
        return Err(PageError::Malformed(format!(
            "score {} is outside 0-100",
            score
        )));
    }
    Ok(resume)
}

/// Fetch `resume:<id>` from `store` and build the page.
pub async fn load_resume<S: KvStore>(store: &S, id: Option<&str>) -> ResumePage {
    let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return ResumePage::Failed(PageError::MissingId),
    };

    let key = record_key(id);
    let page = match store.get(&key).await {
        Ok(Some(raw)) => parse_record(&raw).map(|resume| ResumeView::from(&resume)),
        Ok(None) => Err(PageError::NotFound),
        Err(e) => Err(PageError::StoreUnavailable(e)),
    };

    match page {
        Ok(view) => ResumePage::Ready(view),
        Err(e) => {
            match &e {
                PageError::Malformed(details) => {
                    tracing::error!(key = %key, "stored analysis is malformed: {}", details)
                }
                PageError::StoreUnavailable(source) => {
                    tracing::error!(key = %key, "store lookup failed: {}", source)
                }
                _ => tracing::debug!(key = %key, "no analysis stored"),
            }
            ResumePage::Failed(e)
        }
    }
}

/// Page states.
#[derive(Debug, Default, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum ResumePage {
    #[default]
    Loading,
    Failed(PageError),
    Ready(ResumeView),
}

impl ResumePage {
    pub fn view(&self) -> Option<&ResumeView> {
        match self {
            ResumePage::Ready(view) => Some(view),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PageError> {
        match self {
            ResumePage::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ResumePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumePage::Loading => writeln!(f, "Loading resume analysis..."),
            ResumePage::Failed(e) => {
                writeln!(f, "Error: {}", e)?;
                writeln!(f, "Back to Home ({})", HOME_ROUTE)
            }
            ResumePage::Ready(view) => write!(f, "{}", view),
        }
    }
}

/// Badge colour for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTone {
    Green,
    Yellow,
    Red,
}

impl BadgeTone {
    pub fn for_score(score: f64) -> Self {
        if score >= 80.0 {
            BadgeTone::Green
        } else if score >= 60.0 {
            BadgeTone::Yellow
        } else {
            BadgeTone::Red
        }
    }
}

/// Circular progress indicator for the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRing {
    pub score: f64,
    /// Filled share of the ring, 0.0 to 1.0
    pub progress: f64,
}

impl ScoreRing {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            progress: score.clamp(0.0, 100.0) / 100.0,
        }
    }

    pub fn circumference(radius: f64) -> f64 {
        2.0 * PI * radius
    }

    /// Unfilled arc length for an SVG `stroke-dashoffset`.
    pub fn dash_offset(&self, radius: f64) -> f64 {
        Self::circumference(radius) * (1.0 - self.progress)
    }

    /// Text gauge, e.g. `[######----] 60/100`.
    pub fn gauge(&self, width: usize) -> String {
        let filled = (self.progress * width as f64).round() as usize;
        format!(
            "[{}{}] {}/100",
            "#".repeat(filled),
            "-".repeat(width.saturating_sub(filled)),
            self.score
        )
    }
}

/// One category row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub key: &'static str,
    pub label: &'static str,
    pub score: f64,
    pub badge: BadgeTone,
    pub tips: Vec<Tip>,
}

impl CategoryView {
    fn new(key: &'static str, label: &'static str, category: &Category) -> Self {
        Self {
            key,
            label,
            score: category.score,
            badge: BadgeTone::for_score(category.score),
            tips: category.tips.clone(),
        }
    }
}

/// Everything the results page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeView {
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub image_path: String,
    pub overall: ScoreRing,
    pub categories: Vec<CategoryView>,
}

impl From<&Resume> for ResumeView {
    fn from(resume: &Resume) -> Self {
        let feedback = &resume.feedback;
        let categories = vec![
            CategoryView::new("ATS", "ATS Score", &feedback.ats),
            CategoryView::new("content", "Content", &feedback.content),
            CategoryView::new("structure", "Structure", &feedback.structure),
            CategoryView::new("toneAndStyle", "Tone & Style", &feedback.tone_and_style),
            CategoryView::new("skills", "Skills", &feedback.skills),
        ];

        Self {
            company_name: resume.company_name.clone(),
            job_title: resume.job_title.clone(),
            image_path: resume.image_path.clone(),
            overall: ScoreRing::new(feedback.overall_score),
            categories,
        }
    }
}

impl fmt::Display for ResumeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.company_name.as_deref().unwrap_or("Untitled"))?;
        if let Some(title) = &self.job_title {
            writeln!(f, "{}", title)?;
        }
        writeln!(f, "Overall {}", self.overall.gauge(20))?;
        writeln!(f, "Preview: {}", self.image_path)?;

        writeln!(f)?;
        for category in &self.categories {
            writeln!(f, "  {:<14}{:>3}/100", category.label, category.score)?;
        }

        for category in &self.categories {
            writeln!(f)?;
            writeln!(f, "{} ({}/100)", category.label, category.score)?;
            for tip in &category.tips {
                let mark = match tip.kind {
                    TipKind::Good => "✓",
                    TipKind::Improve => "!",
                };
                writeln!(f, "  {} {}", mark, tip.tip)?;
                if let Some(explanation) = &tip.explanation {
                    writeln!(f, "      {}", explanation)?;
                }
            }
        }
        Ok(())
    }
}
