//! Generative-model integration: the Gemini HTTP client, the candidate-model
//! fallback loop, and the classified failure taxonomy shared by both.

pub mod gemini;
pub mod generator;

pub use gemini::GeminiClient;
pub use generator::AnswerGenerator;

use async_trait::async_trait;
use thiserror::Error;

/// Why a generation request produced no answer.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// No API key was configured; nothing was sent over the network.
    #[error("no Gemini API key configured")]
    CredentialMissing,

    /// The provider signaled quota exhaustion or throttling.
    #[error("Gemini quota exhausted: {0}")]
    RateLimited(String),

    /// The provider refused to generate on content-safety grounds.
    #[error("generation blocked by safety filters: {0}")]
    SafetyBlocked(String),

    /// Any other provider or transport failure, carrying the underlying
    /// error text of the last attempt.
    #[error("Gemini API error: {0}")]
    Provider(String),
}

/// One named model of the generative provider. Implemented by
/// [`GeminiClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, GenerateError>;
}
