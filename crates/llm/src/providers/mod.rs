//! LLM provider implementations.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::{OpenAiClient, OPENAI_BASE_URL, OPENROUTER_BASE_URL};
