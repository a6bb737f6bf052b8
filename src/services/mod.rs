pub mod ai_service;
pub mod cache;
pub mod gemini; // Gemini generateContent client
pub mod orchestrator;

pub use ai_service::GenerativeModel;
pub use gemini::GeminiClient;
pub use orchestrator::Orchestrator;
