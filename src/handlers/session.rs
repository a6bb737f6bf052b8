use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::models::{ImageError, ImageFormat, PersonalizationRequest, ReportOutcome, UploadedImage};
use crate::services::{GenerativeModel, Orchestrator};

/// User-facing validation errors. Model failures never end up here; they are
/// stored as report outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    EmptyImage,
    UnsupportedImage(Option<String>),
    NoImage,
    NoPrimaryReport,
    NoPersonalizationInput,
    Busy,
    /// The image was replaced or cleared while a call was in flight.
    Superseded,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::EmptyImage => write!(f, "{}", ImageError::Empty),
            SessionError::UnsupportedImage(declared) => {
                write!(f, "{}", ImageError::Unsupported(declared.clone()))
            }
            SessionError::NoImage => write!(f, "Please upload an image first."),
            SessionError::NoPrimaryReport => {
                write!(f, "Generate the ECG analysis before asking for personalized advice.")
            }
            SessionError::NoPersonalizationInput => {
                write!(f, "Enter your allergies or your location to get personalized advice.")
            }
            SessionError::Busy => write!(f, "A request is already running for this session."),
            SessionError::Superseded => {
                write!(f, "The image changed while the request was running; the result was discarded.")
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ImageError> for SessionError {
    fn from(error: ImageError) -> Self {
        match error {
            ImageError::Empty => SessionError::EmptyImage,
            ImageError::Unsupported(declared) => SessionError::UnsupportedImage(declared),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Empty,
    ImageLoaded,
    PrimaryReported,
    PersonalizedReported,
}

#[derive(Debug)]
struct SessionState {
    primary_report: Option<ReportOutcome>,
    personalized_report: Option<ReportOutcome>,
    allergies: String,
    location: String,
    current_image: Option<UploadedImage>,
    // Bumped on every upload and clear so late results can be recognised.
    generation: u64,
    last_activity: DateTime<Utc>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            primary_report: None,
            personalized_report: None,
            allergies: String::new(),
            location: String::new(),
            current_image: None,
            generation: 0,
            last_activity: Utc::now(),
        }
    }

    fn reset_derived(&mut self) {
        self.primary_report = None;
        self.personalized_report = None;
        self.allergies.clear();
        self.location.clear();
        self.generation += 1;
    }

    fn has_primary_report(&self) -> bool {
        matches!(self.primary_report, Some(Ok(_)))
    }

    fn personalization_request(&self) -> PersonalizationRequest {
        PersonalizationRequest {
            allergies: self.allergies.clone(),
            location: self.location.clone(),
        }
    }

    fn stage(&self) -> SessionStage {
        match (&self.current_image, &self.primary_report, &self.personalized_report) {
            (_, Some(_), Some(_)) => SessionStage::PersonalizedReported,
            (_, Some(_), None) => SessionStage::PrimaryReported,
            (Some(_), None, _) => SessionStage::ImageLoaded,
            (None, None, _) => SessionStage::Empty,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Point-in-time copy of a session, handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub stage: SessionStage,
    pub image_format: Option<ImageFormat>,
    pub image_size: Option<usize>,
    pub busy: bool,
    pub primary_report: Option<ReportOutcome>,
    pub personalized_report: Option<ReportOutcome>,
    pub allergies: String,
    pub location: String,
    pub can_analyze: bool,
    pub can_personalize: bool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns one user's form state and runs at most one model call at a time.
pub struct SessionController {
    id: Uuid,
    orchestrator: Orchestrator,
    state: Mutex<SessionState>,
    busy: AtomicBool,
}

impl SessionController {
    pub fn new(id: Uuid, model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            id,
            orchestrator: Orchestrator::new(model),
            state: Mutex::new(SessionState::new()),
            busy: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_call(&self) -> Result<BusyGuard<'_>, SessionError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                log::warn!("⏳ Session {} is busy, rejecting duplicate request", self.id);
                SessionError::Busy
            })?;
        Ok(BusyGuard(&self.busy))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state().last_activity
    }

    pub fn on_image_uploaded(
        &self,
        bytes: Vec<u8>,
        declared_content_type: Option<&str>,
    ) -> Result<(), SessionError> {
        let image = UploadedImage::new(bytes, declared_content_type).map_err(|e| {
            log::warn!("⚠️ Session {} upload rejected: {}", self.id, e);
            SessionError::from(e)
        })?;

        log::info!(
            "📸 Session {} received {} image ({} bytes)",
            self.id,
            image.format,
            image.bytes.len()
        );

        let mut state = self.state();
        state.reset_derived();
        state.current_image = Some(image);
        state.touch();
        Ok(())
    }

    pub async fn on_analyze_requested(&self) -> Result<ReportOutcome, SessionError> {
        let guard = self.begin_call()?;

        let (bytes, format, generation) = {
            let mut state = self.state();
            state.touch();
            let image = state.current_image.as_ref().ok_or(SessionError::NoImage)?;
            let snapshot = (image.bytes.clone(), image.format, state.generation);
            state.personalized_report = None;
            snapshot
        };

        log::info!("🔬 Session {} analysis started", self.id);
        let outcome = self.orchestrator.analyze_image(bytes, format).await;

        let mut state = self.state();
        drop(guard);
        state.touch();

        if state.generation != generation {
            log::warn!("⚠️ Session {} changed during analysis, discarding result", self.id);
            return Err(SessionError::Superseded);
        }

        if let Err(failure) = &outcome {
            log::error!("❌ Session {} analysis failed: {}", self.id, failure);
        }

        state.primary_report = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn update_inputs(&self, allergies: &str, location: &str) -> Result<(), SessionError> {
        let mut state = self.state();
        if !state.has_primary_report() {
            return Err(SessionError::NoPrimaryReport);
        }

        state.allergies = allergies.to_string();
        state.location = location.to_string();
        state.touch();
        Ok(())
    }

    pub async fn on_personalization_requested(&self) -> Result<ReportOutcome, SessionError> {
        let guard = self.begin_call()?;

        let (request, generation) = {
            let mut state = self.state();
            state.touch();
            if !state.has_primary_report() {
                return Err(SessionError::NoPrimaryReport);
            }

            let request = state.personalization_request();
            if !request.has_input() {
                return Err(SessionError::NoPersonalizationInput);
            }
            (request, state.generation)
        };

        log::info!("✨ Session {} personalization started", self.id);
        let outcome = self.orchestrator.generate_personalized_advice(&request).await;

        let mut state = self.state();
        drop(guard);
        state.touch();

        if state.generation != generation {
            log::warn!("⚠️ Session {} changed during personalization, discarding result", self.id);
            return Err(SessionError::Superseded);
        }

        if let Err(failure) = &outcome {
            log::error!("❌ Session {} personalization failed: {}", self.id, failure);
        }

        state.personalized_report = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn on_clear(&self) {
        {
            let mut state = self.state();
            state.reset_derived();
            state.current_image = None;
            state.touch();
        }
        self.orchestrator.clear_cache();
        log::info!("🧹 Session {} cleared", self.id);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        let busy = self.is_busy();
        let has_image = state.current_image.is_some();

        SessionSnapshot {
            session_id: self.id,
            stage: state.stage(),
            image_format: state.current_image.as_ref().map(|image| image.format),
            image_size: state.current_image.as_ref().map(|image| image.bytes.len()),
            busy,
            primary_report: state.primary_report.clone(),
            personalized_report: state.personalized_report.clone(),
            allergies: state.allergies.clone(),
            location: state.location.clone(),
            can_analyze: has_image && !busy,
            can_personalize: !busy
                && state.has_primary_report()
                && state.personalization_request().has_input(),
        }
    }
}
