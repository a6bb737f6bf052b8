use base64::{engine::general_purpose, Engine};
use std::sync::Arc;

use super::cache::{Lookup, ReportCache};
use super::gemini::{GenerateContentRequest, Part};
use super::GenerativeModel;
use crate::models::{
    AnalysisFailure, AnalysisRequest, AnalysisResult, ImageFormat, PersonalizationRequest,
    ReportOutcome,
};

pub const ECG_SYSTEM_PROMPT: &str = "You are a highly skilled, board-certified electrophysiologist (cardiologist specializing in \
ECG analysis). Your task is to analyze the provided Electrocardiogram (ECG) scan image. \
Provide a detailed, structured report that includes:\n\
1. *ECG Metrics*: Estimate Heart Rate (BPM), Rhythm (Regular/Irregular), PR Interval, QRS Duration, and QT Interval.\n\
2. *Morphology Analysis*: Describe the P-waves, QRS complex, and T-waves in all visible leads.\n\
3. *Interpretation/Diagnosis*: Based on the visual evidence, provide a primary and secondary differential diagnosis of any possible diseases, abnormalities, or conditions.\n\
4. *Clear Diagnosis Statement*: State in **one single sentence** whether the ECG is *Normal* or clearly state the *primary disease/condition* (e.g., 'The patient shows evidence of an acute Myocardial Infarction,' or 'The ECG is within normal limits').\n\
5. *Recommendation*: Suggest next steps (e.g., monitor, stress test, specific medication, follow-up).\n\
6. *Lifestyle Recommendations*: Provide general, non-allergic **dietary suggestions** (e.g., Mediterranean diet elements, low sodium) and *light workout recommendations* (e.g., walking, stretching) suitable for general heart health. *IMPORTANT:* Do NOT mention specific food recommendations in this section. Instead, state: 'Lifestyle recommendations will be personalized based on user allergy and location input below.'\n\
Format the response using Markdown for clear readability. Start with the Interpretation/Diagnosis section.";

pub const ANALYSIS_INSTRUCTION: &str =
    "Analyze this ECG scan and provide a professional, structured electrophysiology report as instructed.";

pub const ANALYSIS_FALLBACK: &str = "Analysis failed or no text generated.";
pub const ADVICE_FALLBACK: &str = "Could not generate personalized advice.";

pub fn personalization_prompt(request: &PersonalizationRequest) -> String {
    format!(
        "Based on a general heart health analysis (assume the analysis found a condition that requires heart-healthy changes, unless otherwise noted), \
         provide personalized advice. The patient reports allergies to: '{allergies}' and is asking for local doctor recommendations near: '{location}'.\n\n\
         1. *Personalized Food Recommendations*: Suggest specific heart-healthy foods (e.g., fish, vegetables, grains) while explicitly mentioning which common heart-healthy items they must **AVOID** due to their listed allergies. \
         Be general about diet structure (e.g., Mediterranean) but give examples that are safe.\n\
         2. *Doctor Recommendation*: Based on the approximate location '{location}', recommend the name of one highly-rated cardiologist or electrophysiologist in that general area or state/region. \
         If a specific doctor name cannot be found, recommend a top medical center or hospital specializing in cardiology in that area.",
        allergies = request.allergies,
        location = request.location,
    )
}

/// Turns session inputs into model calls and model responses into reports.
///
/// One orchestrator belongs to one session; its cache is never shared.
pub struct Orchestrator {
    model: Arc<dyn GenerativeModel>,
    cache: ReportCache,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            cache: ReportCache::new(),
        }
    }

    pub async fn analyze_image(&self, image_bytes: Vec<u8>, format: ImageFormat) -> ReportOutcome {
        let request = AnalysisRequest::new(image_bytes, format, ANALYSIS_INSTRUCTION, ECG_SYSTEM_PROMPT)
            .map_err(|e| AnalysisFailure::General(e.to_string()))?;

        self.analyze(&request).await
    }

    async fn analyze(&self, request: &AnalysisRequest) -> ReportOutcome {
        let encoded = general_purpose::STANDARD.encode(request.image_bytes());
        let cache_key = ReportCache::key_for(request.mime_type(), &encoded);

        log::debug!(
            "📊 Image size: {} bytes, base64 size: {} bytes",
            request.image_bytes().len(),
            encoded.len()
        );

        let epoch = match self.cache.lookup(&cache_key) {
            Lookup::Hit(cached) => {
                log::info!("♻️ Cache hit for image {}…, skipping model call", &cache_key[..12]);
                return Ok(cached);
            }
            Lookup::Miss { epoch } => epoch,
        };

        let body = GenerateContentRequest::user_turn(
            vec![
                Part::inline_data(request.mime_type(), encoded),
                Part::text(request.instruction_text()),
            ],
            Some(request.system_prompt()),
        );

        log::info!("🔬 Requesting ECG analysis ({})", request.format());
        let response = self.model.generate_content(&body).await?;

        match response.first_text() {
            Some(text) => {
                let result = AnalysisResult::new(text);
                self.cache.insert(cache_key, result.clone(), epoch);
                log::info!("✅ ECG analysis received ({} chars)", result.report_text.len());
                Ok(result)
            }
            None => {
                log::warn!("⚠️ Model response had no text, using fallback");
                Ok(AnalysisResult::new(ANALYSIS_FALLBACK))
            }
        }
    }

    pub async fn generate_personalized_advice(&self, request: &PersonalizationRequest) -> ReportOutcome {
        let body = GenerateContentRequest::user_turn(vec![Part::text(personalization_prompt(request))], None);

        log::info!("✨ Requesting personalized advice");
        let response = self.model.generate_content(&body).await?;

        let text = response.first_text().unwrap_or_else(|| {
            log::warn!("⚠️ Model response had no advice text, using fallback");
            ADVICE_FALLBACK
        });

        Ok(AnalysisResult::new(text))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
