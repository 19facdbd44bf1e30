use thiserror::Error;

#[derive(Debug, Error)]
pub enum MobiClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown {kind} component '{name}'. Registered: {registered}")]
    UnknownComponent {
        kind: String,
        name: String,
        registered: String,
    },

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Action decode error: {0}")]
    Decode(String),

    #[error("Knowledge error: {0}")]
    Knowledge(String),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type MobiClawResult<T> = Result<T, MobiClawError>;
