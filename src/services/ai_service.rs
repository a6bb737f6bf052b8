use crate::models::AnalysisFailure;
use crate::services::gemini::{GenerateContentRequest, GenerateContentResponse};

/// Trait for hosted generative models (Gemini today, anything speaking the same envelope tomorrow)
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AnalysisFailure>;
}
