#![forbid(unsafe_code)]

/// Registry of secrets the device vault may hold. Secrets never travel
/// through configs or env vars in plain text; engines resolve them from
/// the encrypted vault at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderSecretId {
    /// API key for the AI document-generation provider.
    AiApiKey,
    /// API key for the identity provider, when the deployment requires one.
    AuthApiKey,
}

impl ProviderSecretId {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "ai_api_key" => Some(Self::AiApiKey),
            "auth_api_key" => Some(Self::AuthApiKey),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AiApiKey => "ai_api_key",
            Self::AuthApiKey => "auth_api_key",
        }
    }

    pub fn allowed_key_names() -> &'static [&'static str] {
        &["ai_api_key", "auth_api_key"]
    }
}
