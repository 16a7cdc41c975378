use common::mint::{FEE_RECIPIENT, MINT_CONTRACT};
use common::raster::{CANVAS_HEIGHT, CANVAS_WIDTH};
use std::str::FromStr;

/// Where uploaded images and metadata are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentBackend {
    Valkey,
    Memory,
}

impl FromStr for ContentBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valkey" | "redis" => Ok(ContentBackend::Valkey),
            "memory" => Ok(ContentBackend::Memory),
            other => Err(format!("unknown content backend: {other}")),
        }
    }
}

pub struct Config {
    pub valkey_url: String,
    pub listen_addr: String,
    pub content_backend: ContentBackend,
    /// Public base URL content ids are appended to (`<gateway>/ipfs/<cid>`).
    pub gateway_url: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub max_canvases: usize,
    pub mint_contract: String,
    pub fee_recipient: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            valkey_url: env_or("VALKEY_URL", "redis://127.0.0.1:6379"),
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:3000"),
            content_backend: env_parse("CONTENT_BACKEND", ContentBackend::Valkey),
            gateway_url: env_or("GATEWAY_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            canvas_width: env_parse("CANVAS_WIDTH", CANVAS_WIDTH),
            canvas_height: env_parse("CANVAS_HEIGHT", CANVAS_HEIGHT),
            max_canvases: env_parse("MAX_CANVASES", 256usize).max(1),
            mint_contract: env_or("MINT_CONTRACT", MINT_CONTRACT),
            fee_recipient: env_or("FEE_RECIPIENT", FEE_RECIPIENT),
        }
    }
}
