use clap::Args;
use std::collections::HashMap;

/// User property naming the store connection configuration file
pub const CONFIG_OPTION: &str = "CONFIG";
pub const CACHE_OPTION: &str = "CACHE";
pub const SCHEMA_OPTION: &str = "SCHEMA";
pub const LAZY_OPTION: &str = "LAZY";
pub const REPLICATED_ONLY_OPTION: &str = "REPLICATED_ONLY";

pub const DEFAULT_CACHE_NAME: &str = "DEFAULT";

/// Per-accessor options, parsed once from the host's user properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorOptions {
    pub config_path: Option<String>,
    pub cache_name: String,
    pub schema: Option<String>,
    pub lazy: bool,
    pub replicated_only: bool,
}

impl Default for AccessorOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            schema: None,
            lazy: false,
            replicated_only: false,
        }
    }
}

impl AccessorOptions {
    /// Parse options from user properties. Keys are matched case-insensitively;
    /// `LAZY` and `REPLICATED_ONLY` are switched on by their mere presence.
    pub fn from_user_properties(properties: &HashMap<String, String>) -> Self {
        let lookup = |key: &str| {
            properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        };
        let non_empty = |value: Option<&str>| value.filter(|v| !v.trim().is_empty()).map(str::to_string);

        Self {
            config_path: non_empty(lookup(CONFIG_OPTION)),
            cache_name: non_empty(lookup(CACHE_OPTION)).unwrap_or_else(|| DEFAULT_CACHE_NAME.to_string()),
            schema: non_empty(lookup(SCHEMA_OPTION)),
            lazy: lookup(LAZY_OPTION).is_some(),
            replicated_only: lookup(REPLICATED_ONLY_OPTION).is_some(),
        }
    }
}

/// Connector options as command-line arguments, with environment fallbacks
#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(long, env = "STOREBRIDGE_CONFIG", help = "Path to the store connection configuration file")]
    pub config: Option<String>,

    #[arg(long, default_value = DEFAULT_CACHE_NAME, env = "STOREBRIDGE_CACHE", help = "Target collection name")]
    pub cache: String,

    #[arg(long, env = "STOREBRIDGE_SCHEMA", help = "SQL schema applied to built queries")]
    pub schema: Option<String>,

    #[arg(long, env = "STOREBRIDGE_LAZY", help = "Enable lazy query execution")]
    pub lazy: bool,

    #[arg(long, env = "STOREBRIDGE_REPLICATED_ONLY", help = "Restrict reads to replicated partitions")]
    pub replicated_only: bool,

    #[arg(long, default_value = "info", env = "STOREBRIDGE_LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Render as the user properties the host would pass along with a request
    pub fn to_user_properties(&self) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        if let Some(config) = &self.config {
            properties.insert(CONFIG_OPTION.to_string(), config.clone());
        }
        properties.insert(CACHE_OPTION.to_string(), self.cache.clone());
        if let Some(schema) = &self.schema {
            properties.insert(SCHEMA_OPTION.to_string(), schema.clone());
        }
        if self.lazy {
            properties.insert(LAZY_OPTION.to_string(), String::new());
        }
        if self.replicated_only {
            properties.insert(REPLICATED_ONLY_OPTION.to_string(), String::new());
        }
        properties
    }
}
