use clap::{ ArgAction, Parser };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8000")]
    pub server_addr: String,

    /// Maximum chat requests accepted per second across all clients. 0 (the default) disables the limit.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "0")]
    pub rate_limit_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379). Ignored for memory.
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "history:")]
    pub history_redis_prefix: String,

    // --- Agent Args ---
    /// Model used when a request does not name one, as provider/model (e.g., openai/gpt-4o-mini, ollama/llama3.1)
    #[arg(long, env = "DEFAULT_MODEL", default_value = "openai/gpt-4o-mini")]
    pub default_model: String,

    /// Models advertised by /api/models, comma separated.
    #[arg(
        long,
        env = "AVAILABLE_MODELS",
        value_delimiter = ',',
        default_value = "openai/gpt-4o-mini,openai/gpt-4o,ollama/llama3.1"
    )]
    pub available_models: Vec<String>,

    /// Number of search results used when a request does not set max_search_results.
    #[arg(long, env = "DEFAULT_MAX_SEARCH_RESULTS", default_value = "10")]
    pub default_max_search_results: usize,

    /// System prompt for the agent. `{system_time}` is replaced with the current UTC time.
    #[arg(
        long,
        env = "SYSTEM_PROMPT",
        default_value = "You are a helpful AI assistant.\n\nSystem time: {system_time}"
    )]
    pub system_prompt: String,

    /// Maximum model calls per request before the agent gives up with a fallback reply.
    #[arg(long, env = "AGENT_MAX_STEPS", default_value = "12")]
    pub max_steps: usize,

    // --- Chat LLM Provider Args ---
    /// API Key for OpenAI.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    pub openai_api_key: String,

    /// Base URL for the OpenAI API (e.g., https://api.openai.com)
    #[arg(long, env = "OPENAI_BASE_URL")] // No default, let adapters handle defaults if None
    pub openai_base_url: Option<String>,

    /// API Key for DeepSeek.
    #[arg(long, env = "DEEPSEEK_API_KEY", default_value = "")]
    pub deepseek_api_key: String,

    #[arg(long, env = "DEEPSEEK_BASE_URL")]
    pub deepseek_base_url: Option<String>,

    /// API Key for Groq.
    #[arg(long, env = "GROQ_API_KEY", default_value = "")]
    pub groq_api_key: String,

    #[arg(long, env = "GROQ_BASE_URL")]
    pub groq_base_url: Option<String>,

    /// API Key for xAI.
    #[arg(long, env = "XAI_API_KEY", default_value = "")]
    pub xai_api_key: String,

    #[arg(long, env = "XAI_BASE_URL")]
    pub xai_base_url: Option<String>,

    /// Base URL for Ollama (e.g., http://localhost:11434)
    #[arg(long, env = "OLLAMA_BASE_URL")]
    pub ollama_base_url: Option<String>,

    // --- Search Tool Args ---
    /// API Key for the Tavily search tool.
    #[arg(long, env = "TAVILY_API_KEY", default_value = "")]
    pub tavily_api_key: String,

    #[arg(long, env = "TAVILY_BASE_URL", default_value = "https://api.tavily.com")]
    pub tavily_base_url: String,

    // --- Streaming Args ---
    /// Delay between characters when replaying a reply on /api/chat/stream. 0 sends them back to back.
    #[arg(long, env = "STREAM_CHAR_DELAY_MS", default_value = "10")]
    pub stream_char_delay_ms: u64,

    /// Run `search` calls as soon as the model requests them on /api/chat/stream and
    /// send their results ahead of the agent's own tool step. Pass `false` to turn off.
    #[arg(long, env = "STREAM_INLINE_TOOLS", default_value_t = true, action = ArgAction::Set)]
    pub stream_inline_tools: bool,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
