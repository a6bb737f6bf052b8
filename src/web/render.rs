use serde::Serialize;
use uuid::Uuid;

use crate::handlers::{SessionSnapshot, SessionStage};
use crate::models::{AnalysisFailure, ReportOutcome};

pub const TRANSPORT_ERROR_MARKER: &str = "🚨 *API Request Error*";
pub const GENERAL_ERROR_MARKER: &str = "🚨 *General Error*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    TransportError,
    GeneralError,
}

/// A report as the results region shows it: always Markdown, never an error object.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedReport {
    pub status: ReportStatus,
    pub markdown: String,
}

pub fn render_failure(failure: &AnalysisFailure) -> String {
    let (marker, summary) = match failure {
        AnalysisFailure::Transport(_) => (TRANSPORT_ERROR_MARKER, "Failed to connect to the model API."),
        AnalysisFailure::General(_) => {
            (GENERAL_ERROR_MARKER, "An unexpected error occurred during processing.")
        }
    };
    format!("{}: {} Details: {}", marker, summary, failure.detail())
}

pub fn render_outcome(outcome: &ReportOutcome) -> RenderedReport {
    match outcome {
        Ok(result) => RenderedReport {
            status: ReportStatus::Ok,
            markdown: result.report_text.clone(),
        },
        Err(failure @ AnalysisFailure::Transport(_)) => RenderedReport {
            status: ReportStatus::TransportError,
            markdown: render_failure(failure),
        },
        Err(failure @ AnalysisFailure::General(_)) => RenderedReport {
            status: ReportStatus::GeneralError,
            markdown: render_failure(failure),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub stage: SessionStage,
    pub has_image: bool,
    pub image_mime_type: Option<&'static str>,
    pub image_size: Option<usize>,
    pub busy: bool,
    pub primary_report: Option<RenderedReport>,
    pub personalized_report: Option<RenderedReport>,
    pub allergies: String,
    pub location: String,
    pub can_analyze: bool,
    pub can_personalize: bool,
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            stage: snapshot.stage,
            has_image: snapshot.image_format.is_some(),
            image_mime_type: snapshot.image_format.map(|format| format.mime_type()),
            image_size: snapshot.image_size,
            busy: snapshot.busy,
            primary_report: snapshot.primary_report.as_ref().map(render_outcome),
            personalized_report: snapshot.personalized_report.as_ref().map(render_outcome),
            allergies: snapshot.allergies,
            location: snapshot.location,
            can_analyze: snapshot.can_analyze,
            can_personalize: snapshot.can_personalize,
        }
    }
}
