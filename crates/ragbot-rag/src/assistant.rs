//! The conversational assistant: memory + augmentation + generation.

use std::sync::Arc;

use ragbot_hooks::{HookRegistry, RagEvent};
use ragbot_providers::{ChatOptions, ChatProvider};
use ragbot_types::{ContextStatus, ConversationTurn};

use crate::augmentor::{AugmentedPrompt, RetrievalAugmentor};
use crate::error::RagError;
use crate::memory::ConversationMemory;

/// A generated reply and how its context was obtained.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context: ContextStatus,
    /// Source ids of the segments placed in the prompt.
    pub sources: Vec<String>,
}

/// Answers questions one at a time, remembering the recent conversation.
pub struct Assistant {
    chat: Arc<dyn ChatProvider>,
    options: ChatOptions,
    memory: ConversationMemory,
    augmentor: Option<RetrievalAugmentor>,
    hooks: Arc<HookRegistry>,
}

impl Assistant {
    /// Plain chat assistant; add retrieval with [`with_augmentor`](Self::with_augmentor).
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        options: ChatOptions,
        memory: ConversationMemory,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            chat,
            options,
            memory,
            augmentor: None,
            hooks,
        }
    }

    pub fn with_augmentor(mut self, augmentor: RetrievalAugmentor) -> Self {
        self.augmentor = Some(augmentor);
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer `question`.
    ///
    /// The exchange is recorded in memory only when generation succeeds.
    pub async fn chat(&mut self, question: &str) -> Result<Answer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let history = self.memory.snapshot();
        let prompt = match &self.augmentor {
            Some(augmentor) => augmentor.augment(question, &history).await,
            None => AugmentedPrompt::bare(question, history),
        };

        let text = match self
            .chat
            .complete(&prompt.user_message(), &prompt.history, &self.options)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                self.hooks.emit(RagEvent::GenerationFailed {
                    error: e.to_string(),
                });
                return Err(RagError::Generation(e));
            }
        };

        self.memory.append(ConversationTurn::user(question));
        self.memory.append(ConversationTurn::assistant(text.clone()));
        self.hooks.emit(RagEvent::TurnRecorded {
            memory_len: self.memory.len(),
        });

        Ok(Answer {
            text,
            context: prompt.status,
            sources: prompt.sources(),
        })
    }
}
