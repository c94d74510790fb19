//! Static model catalogs.

use super::ProviderKind;
use crate::core::model::ModelDescriptor;

/// Context size and per-token cost reported by `describe()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderProfile {
    pub max_context: u32,
    pub cost_per_token: f64,
}

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    max_context: u32,
    cost: f64,
}

const DEEPSEEK_MODELS: &[CatalogEntry] = &[
    CatalogEntry { id: "deepseek-chat", name: "DeepSeek Chat", max_context: 32_768, cost: 0.0014 },
    CatalogEntry { id: "deepseek-reasoner", name: "DeepSeek Reasoner", max_context: 32_768, cost: 0.0055 },
];

const OPENROUTER_MODELS: &[CatalogEntry] = &[
    CatalogEntry { id: "deepseek/deepseek-r1-0528:free", name: "DeepSeek R1 0528 (free)", max_context: 32_768, cost: 0.0 },
    CatalogEntry { id: "deepseek/deepseek-chat-v3-0324:free", name: "DeepSeek V3 0324 (free)", max_context: 32_768, cost: 0.0 },
    CatalogEntry { id: "anthropic/claude-sonnet-4", name: "Claude Sonnet 4", max_context: 200_000, cost: 0.003 },
    CatalogEntry { id: "anthropic/claude-3.7-sonnet", name: "Claude 3.7 Sonnet", max_context: 200_000, cost: 0.003 },
    CatalogEntry { id: "google/gemini-2.5-pro-preview", name: "Gemini 2.5 Pro Preview", max_context: 2_097_152, cost: 0.00125 },
    CatalogEntry { id: "openai/chatgpt-4o-latest", name: "ChatGPT-4o Latest", max_context: 128_000, cost: 0.0025 },
    CatalogEntry { id: "x-ai/grok-3", name: "Grok 3", max_context: 131_072, cost: 0.002 },
];

fn entries(kind: ProviderKind) -> &'static [CatalogEntry] {
    match kind {
        ProviderKind::DeepSeek => DEEPSEEK_MODELS,
        ProviderKind::OpenRouter => OPENROUTER_MODELS,
    }
}

/// The models offered by a provider.
pub fn models_for(kind: ProviderKind) -> Vec<ModelDescriptor> {
    entries(kind)
        .iter()
        .map(|entry| ModelDescriptor {
            provider: kind.display_name().to_string(),
            model_id: entry.id.to_string(),
            display_name: entry.name.to_string(),
            max_context: entry.max_context,
            supports_streaming: true,
            cost_per_token: Some(entry.cost),
        })
        .collect()
}

/// Provider-level figures, independent of the selected model.
pub fn profile_for(kind: ProviderKind) -> ProviderProfile {
    match kind {
        ProviderKind::DeepSeek => ProviderProfile { max_context: 32_768, cost_per_token: 0.0014 },
        ProviderKind::OpenRouter => ProviderProfile { max_context: 4_096, cost_per_token: 0.001 },
    }
}

/// Look up a single model in a provider's catalog.
pub fn find_model(kind: ProviderKind, model_id: &str) -> Option<ModelDescriptor> {
    models_for(kind).into_iter().find(|m| m.model_id == model_id)
}
