//! The per-request pipeline: verse retrieval strictly before generation,
//! then response assembly for the caller (an HTTP handler or the CLI).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ai::{AnswerGenerator, GenerateError};
use crate::scripture::{format_context, RetrieveError, VerseStore};

/// Label used for `source` when no verses were retrieved.
const GENERAL_WISDOM_SOURCE: &str = "Sabedoria Teológica Geral.";

/// How the `is_rag_active` response flag is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagFlagPolicy {
    /// Reflect whether retrieval actually supplied context for this answer.
    #[default]
    Actual,
    /// Report `true` unconditionally, for deployments that depend on the
    /// legacy behavior of the flag.
    AlwaysOn,
}

/// Success value of [`ChatService::process`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub source: String,
    pub is_rag_active: bool,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Retrieval(#[from] RetrieveError),
    #[error(transparent)]
    Generation(#[from] GenerateError),
}

impl ChatError {
    /// The end-user-facing message for this failure. The classification
    /// itself stays available through the enum for logging and status
    /// mapping.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::Retrieval(_) => {
                "Sinto muito, houve um erro crítico ao consultar a Sabedoria Antiga."
            }
            ChatError::Generation(GenerateError::CredentialMissing) => {
                "O espírito de sabedoria está em silêncio (IA Offline)."
            }
            ChatError::Generation(GenerateError::RateLimited(_)) => {
                "Muitos buscadores consultam Salomão neste momento. Tente novamente em instantes."
            }
            ChatError::Generation(GenerateError::SafetyBlocked(_)) => {
                "Essa pergunta toca em temas que prefiro não abordar. Reformule-a com outras palavras."
            }
            ChatError::Generation(GenerateError::Provider(_)) => {
                "Houve uma interrupção na conexão celestial. Tente novamente em breve."
            }
        }
    }
}

/// Built once at process start and shared across concurrent requests: the
/// store opens a fresh connection per call and the generator only holds
/// stateless client configuration.
pub struct ChatService {
    store: VerseStore,
    generator: AnswerGenerator,
    rag_flag: RagFlagPolicy,
}

impl ChatService {
    pub fn new(store: VerseStore, generator: AnswerGenerator, rag_flag: RagFlagPolicy) -> Self {
        Self {
            store,
            generator,
            rag_flag,
        }
    }

    pub fn store(&self) -> &VerseStore {
        &self.store
    }

    /// Answers one question. Callers must reject empty or whitespace-only
    /// queries before invoking this.
    pub async fn process(&self, query: &str) -> Result<ChatReply, ChatError> {
        let citations = self.store.search(query)?;
        let context = format_context(&citations);
        debug!(citations = citations.len(), "retrieval complete");

        let answer = self.generator.generate(query, &context).await?;

        let rag_used = !citations.is_empty();
        let source = if rag_used {
            format!("Escrituras Consultadas: {}", context.replace('\n', " | "))
        } else {
            GENERAL_WISDOM_SOURCE.to_string()
        };
        let is_rag_active = match self.rag_flag {
            RagFlagPolicy::Actual => rag_used,
            RagFlagPolicy::AlwaysOn => true,
        };

        Ok(ChatReply {
            answer,
            source,
            is_rag_active,
        })
    }
}
