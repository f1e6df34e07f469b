use serde::Serialize;

/// Metadata for one Poe-hosted bot. The catalog is static; keeping it in
/// sync with Poe's roster is out of scope.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub context_length: u32,
    pub supports_images: bool,
    /// Claude bots may prefix replies with a thinking segment that gets
    /// stripped before relay.
    pub is_claude: bool,
}

pub const CATALOG: &[ModelInfo] = &[
    ModelInfo {
        name: "GPT-3.5-Turbo",
        description: "OpenAI's GPT-3.5 Turbo model",
        context_length: 16_000,
        supports_images: true,
        is_claude: false,
    },
    ModelInfo {
        name: "GPT-4",
        description: "OpenAI's GPT-4 model",
        context_length: 32_000,
        supports_images: true,
        is_claude: false,
    },
    ModelInfo {
        name: "GPT-4o",
        description: "OpenAI's GPT-4o model",
        context_length: 128_000,
        supports_images: true,
        is_claude: false,
    },
    ModelInfo {
        name: "Claude-3-Opus-200k",
        description: "Anthropic's Claude 3 Opus model with 200k context",
        context_length: 200_000,
        supports_images: true,
        is_claude: true,
    },
    ModelInfo {
        name: "Claude-3-Sonnet-7k",
        description: "Anthropic's Claude 3 Sonnet model with 7k context",
        context_length: 7_000,
        supports_images: true,
        is_claude: true,
    },
    ModelInfo {
        name: "Claude-3-Haiku-3k",
        description: "Anthropic's Claude 3 Haiku model with 3k context",
        context_length: 3_000,
        supports_images: true,
        is_claude: true,
    },
    ModelInfo {
        name: "Claude-2-100k",
        description: "Anthropic's Claude 2 model with 100k context",
        context_length: 100_000,
        supports_images: false,
        is_claude: true,
    },
    ModelInfo {
        name: "Gemini-Pro",
        description: "Google's Gemini Pro model",
        context_length: 32_000,
        supports_images: true,
        is_claude: false,
    },
    ModelInfo {
        name: "Llama-3-70b",
        description: "Meta's Llama 3 70B model",
        context_length: 8_000,
        supports_images: false,
        is_claude: false,
    },
    ModelInfo {
        name: "Llama-3-8b",
        description: "Meta's Llama 3 8B model",
        context_length: 8_000,
        supports_images: false,
        is_claude: false,
    },
    ModelInfo {
        name: "Mistral-7B",
        description: "Mistral AI's 7B model",
        context_length: 8_000,
        supports_images: false,
        is_claude: false,
    },
    ModelInfo {
        name: "Mistral-Large",
        description: "Mistral AI's Large model",
        context_length: 32_000,
        supports_images: true,
        is_claude: false,
    },
    ModelInfo {
        name: "Perplexity-Online",
        description: "Perplexity's online search-augmented model",
        context_length: 8_000,
        supports_images: false,
        is_claude: false,
    },
];

/// Look up a bot by name, case-insensitively.
pub fn find(name: &str) -> Option<&'static ModelInfo> {
    CATALOG
        .iter()
        .find(|model| model.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(find("gpt-4o").is_some());
        assert!(find("GPT-4o").is_some());
        assert!(find("NoSuchBot").is_none());
    }

    #[test]
    fn claude_bots_are_flagged() {
        assert!(find("Claude-3-Opus-200k").unwrap().is_claude);
        assert!(!find("GPT-4o").unwrap().is_claude);
    }

    #[test]
    fn catalog_order_is_stable() {
        assert_eq!(CATALOG[0].name, "GPT-3.5-Turbo");
        assert_eq!(CATALOG.last().unwrap().name, "Perplexity-Online");
    }

    #[test]
    fn context_lengths_are_positive() {
        assert!(CATALOG.iter().all(|model| model.context_length > 0));
    }
}
