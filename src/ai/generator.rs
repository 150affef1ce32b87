//! Prompt assembly and the ordered candidate-model fallback loop.

use tracing::{info, warn};

use super::{GenerateError, TextModel};

/// Default fallback chain, most capable first. Operators can override it in
/// the config file when a deployment has different quota.
pub const DEFAULT_MODEL_CHAIN: &[&str] =
    &["gemini-2.5-flash", "gemini-2.0-flash", "gemini-1.5-flash"];

/// Persona and grounding rules sent as the system instruction.
pub(crate) const SYSTEM_INSTRUCTION: &str = "Você é o Rei Salomão, conhecido por sua imensa \
    sabedoria bíblica. Responda à pergunta de forma sábia, pastoral e equilibrada. \
    Se houver contexto bíblico fornecido, use-o para fundamentar sua resposta e \
    encerre citando as passagens usadas. Se nenhum contexto for fornecido, deixe \
    claro que a resposta se baseia em conhecimento teológico geral, sem citação \
    específica.";

/// Embedded in the prompt when retrieval found nothing, so the model knows
/// not to invent citations.
pub(crate) const NO_CONTEXT_MARKER: &str =
    "Nenhum contexto bíblico específico foi encontrado para esta pergunta.";

pub struct AnswerGenerator {
    model: Option<Box<dyn TextModel>>,
    candidates: Vec<String>,
}

impl AnswerGenerator {
    pub fn new(model: Box<dyn TextModel>, candidates: Vec<String>) -> Self {
        Self {
            model: Some(model),
            candidates,
        }
    }

    /// A generator with no provider client. Every call fails with
    /// [`GenerateError::CredentialMissing`] without touching the network,
    /// so the rest of the service (retrieval, CLI search) still works when
    /// no API key is configured.
    pub fn disabled() -> Self {
        Self {
            model: None,
            candidates: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Generates an answer for `question`, grounded in `context` when it is
    /// non-empty. Each candidate model is tried at most once, in order, with
    /// no delay between attempts; the first success wins. On exhaustion the
    /// last candidate's classified error is returned.
    pub async fn generate(&self, question: &str, context: &str) -> Result<String, GenerateError> {
        let model = self.model.as_ref().ok_or(GenerateError::CredentialMissing)?;

        let prompt = build_prompt(question, context);

        let mut last_error = GenerateError::Provider("no candidate models configured".to_string());
        for candidate in &self.candidates {
            match model.generate(candidate, SYSTEM_INSTRUCTION, &prompt).await {
                Ok(answer) => {
                    info!(model = candidate.as_str(), "answer generated");
                    return Ok(answer);
                }
                Err(e) => {
                    warn!(model = candidate.as_str(), error = %e, "candidate model failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    let context_block = if context.trim().is_empty() {
        NO_CONTEXT_MARKER
    } else {
        context
    };
    format!("Contexto Bíblico Local:\n{context_block}\n\nPergunta do Buscador: {question}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed sequence of outcomes and records every attempt in a
    /// shared log the test keeps a handle to.
    struct ScriptedModel {
        outcomes: Mutex<VecDeque<Result<String, GenerateError>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedModel {
        fn new(
            outcomes: Vec<Result<String, GenerateError>>,
        ) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let model = Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Arc::clone(&calls),
            };
            (model, calls)
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn generate(
            &self,
            model: &str,
            _system_instruction: &str,
            _prompt: &str,
        ) -> Result<String, GenerateError> {
            self.calls.lock().unwrap().push(model.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("more calls than scripted outcomes")
        }
    }

    fn chain(models: &[&str]) -> Vec<String> {
        models.iter().map(|m| m.to_string()).collect()
    }

    #[tokio::test]
    async fn first_success_wins_without_further_attempts() {
        let (scripted, calls) = ScriptedModel::new(vec![Ok("resposta".to_string())]);
        let generator = AnswerGenerator::new(Box::new(scripted), chain(&["pro", "flash"]));

        let answer = generator.generate("pergunta", "").await.unwrap();
        assert_eq!(answer, "resposta");
        assert_eq!(*calls.lock().unwrap(), vec!["pro".to_string()]);
    }

    #[tokio::test]
    async fn falls_back_to_second_candidate() {
        let (scripted, calls) = ScriptedModel::new(vec![
            Err(GenerateError::Provider("transient".to_string())),
            Ok("segunda resposta".to_string()),
        ]);
        let generator = AnswerGenerator::new(Box::new(scripted), chain(&["pro", "flash"]));

        let answer = generator.generate("pergunta", "").await.unwrap();
        assert_eq!(answer, "segunda resposta");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["pro".to_string(), "flash".to_string()]
        );
    }

    #[tokio::test]
    async fn all_rate_limited_classifies_as_rate_limited() {
        let (scripted, _calls) = ScriptedModel::new(vec![
            Err(GenerateError::RateLimited("quota".to_string())),
            Err(GenerateError::RateLimited("quota".to_string())),
        ]);
        let generator = AnswerGenerator::new(Box::new(scripted), chain(&["pro", "flash"]));

        let err = generator.generate("pergunta", "").await.unwrap_err();
        assert!(matches!(err, GenerateError::RateLimited(_)));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_attempt() {
        let generator = AnswerGenerator::disabled();
        let err = generator.generate("pergunta", "").await.unwrap_err();
        assert!(matches!(err, GenerateError::CredentialMissing));
    }

    #[tokio::test]
    async fn empty_candidate_list_is_provider_error() {
        let (scripted, _calls) = ScriptedModel::new(vec![]);
        let generator = AnswerGenerator::new(Box::new(scripted), Vec::new());

        let err = generator.generate("pergunta", "").await.unwrap_err();
        assert!(matches!(err, GenerateError::Provider(_)));
    }

    #[test]
    fn prompt_embeds_context_verbatim() {
        let prompt = build_prompt("O que é o amor?", "[João 3:16]: Porque Deus amou o mundo.");
        assert!(prompt.contains("[João 3:16]: Porque Deus amou o mundo."));
        assert!(prompt.contains("Pergunta do Buscador: O que é o amor?"));
        assert!(!prompt.contains(NO_CONTEXT_MARKER));
    }

    #[test]
    fn prompt_marks_missing_context() {
        for context in ["", "   ", "\n"] {
            let prompt = build_prompt("O que é o amor?", context);
            assert!(prompt.contains(NO_CONTEXT_MARKER));
        }
    }
}
