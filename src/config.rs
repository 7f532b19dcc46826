// ====================================================================================
// src/config.rs - 配置管理
// ====================================================================================
use crate::error::ConfigError;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    // 浏览器客户端目录，未设置时不提供静态文件
    pub public_dir: Option<String>,
    // 未设置时管理接口一律 401
    pub admin_api_key: Option<String>,
    pub max_connections: u32,
    pub outbound_buffer: usize,
    pub command_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            public_dir: None,
            admin_api_key: None,
            max_connections: 10_000,
            outbound_buffer: 256,
            command_buffer: 128,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // 尝试加载 .env 文件，如果失败则忽略（可能文件不存在）
        if let Err(e) = dotenvy::dotenv() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_address = match (lookup("BIND_ADDRESS"), lookup("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => {
                let port: u16 = parse_value("PORT", &port)?;
                format!("0.0.0.0:{}", port)
            }
            (None, None) => defaults.bind_address,
        };

        Ok(Self {
            bind_address,
            public_dir: lookup("PUBLIC_DIR").filter(|dir| !dir.is_empty()),
            admin_api_key: lookup("ADMIN_API_KEY").filter(|key| !key.is_empty()),
            max_connections: number(&lookup, "MAX_CONNECTIONS", defaults.max_connections)?,
            outbound_buffer: positive(&lookup, "OUTBOUND_BUFFER", defaults.outbound_buffer)?,
            command_buffer: positive(&lookup, "COMMAND_BUFFER", defaults.command_buffer)?,
        })
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { key, value: raw.to_string() })
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

// tokio 的 mpsc 容量不能为 0
fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match number(lookup, key, default)? {
        0 => Err(ConfigError::Zero { key }),
        n => Ok(n),
    }
}
