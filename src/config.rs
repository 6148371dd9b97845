// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use crate::domain::service::retry::{RetryPolicy, DEFAULT_NOT_YET_TRADABLE_PATTERNS};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Execution core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Exchange API credentials
    pub exchange: ExchangeConfig,

    /// Sniper shot defaults
    pub sniper: SniperConfig,

    /// Order executor retry limits
    pub executor: ExecutorConfig,

    /// Listing detector sources
    pub detector: DetectorConfig,

    /// Event queue sizing
    pub queue: QueueConfig,

    /// Auto-buy of newly tradable coins
    pub auto_buy: AutoBuyConfig,

    /// Graceful shutdown
    pub shutdown: ShutdownConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Exchange API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange name (e.g., "binance")
    pub name: String,

    /// API key
    pub api_key: String,

    /// API secret
    pub api_secret: String,

    /// Use testnet
    pub testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperConfig {
    /// Price polling cadence while waiting on a trigger, in milliseconds
    pub default_check_interval_ms: u64,

    /// Overall time limit of a shot, in seconds
    pub default_timeout_secs: u64,

    /// Slippage fraction applied to limit prices when a condition has none
    pub default_buffer: Decimal,
}

impl SniperConfig {
    pub fn default_check_interval(&self) -> Duration {
        Duration::from_millis(self.default_check_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub not_yet_tradable: NotYetTradableConfig,
    pub transient: TransientConfig,
}

impl ExecutorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.not_yet_tradable.patterns.clone(),
            Duration::from_millis(self.transient.base_delay_ms),
            Duration::from_millis(self.transient.max_delay_ms),
            self.transient.max_retries,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotYetTradableConfig {
    /// Total submission attempts while the venue says "not yet tradable"
    pub max_retries: u32,

    /// Spacing between those attempts, in seconds
    pub retry_interval_secs: u64,

    /// Case-insensitive fragments that mark a venue error as "not yet tradable"
    pub patterns: Vec<String>,
}

impl NotYetTradableConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Listings endpoint poll interval in seconds; `None` disables polling
    pub poll_interval_secs: Option<u64>,

    /// Subscribe to the gateway's listing channel
    pub websocket_enabled: bool,

    /// Delay before resubscribing after the listing channel drops, in seconds
    pub reconnect_delay_secs: u64,
}

impl DetectorConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub capacity: usize,

    /// Event processor drain cadence, in milliseconds
    pub drain_interval_ms: u64,
}

impl QueueConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBuyConfig {
    pub enabled: bool,

    /// Quote amount (e.g. USDT) spent when the event carries none
    pub default_amount: Decimal,

    /// Cap on the quote amount per buy
    pub max_amount: Decimal,

    /// Pause between the tradable transition and the order, in milliseconds
    pub trade_delay_ms: u64,

    /// Symbols never bought (exact match)
    pub blacklist: Vec<String>,

    pub max_buys_per_symbol: u32,

    pub max_attempts: u32,
    pub retry_interval_secs: u64,
    pub timeout_secs: u64,
}

impl AutoBuyConfig {
    pub fn trade_delay(&self) -> Duration {
        Duration::from_millis(self.trade_delay_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        self.blacklist.iter().any(|s| s == symbol)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    pub grace_secs: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let exchange_config = ExchangeConfig {
            name: env::var("EXCHANGE_NAME").unwrap_or_else(|_| "binance".to_string()),
            api_key: env::var("API_KEY").map_err(|_| {
                AppError::Config("Missing API_KEY environment variable".to_string())
            })?,
            api_secret: env::var("API_SECRET").map_err(|_| {
                AppError::Config("Missing API_SECRET environment variable".to_string())
            })?,
            testnet: env_parse("USE_TESTNET", false),
        };

        let sniper_config = SniperConfig {
            default_check_interval_ms: env_parse(
                "SNIPER_CHECK_INTERVAL_MS",
                defaults.sniper.default_check_interval_ms,
            ),
            default_timeout_secs: env_parse("SNIPER_TIMEOUT_SECS", defaults.sniper.default_timeout_secs),
            default_buffer: env_parse("SNIPER_BUFFER", defaults.sniper.default_buffer),
        };

        let executor_config = ExecutorConfig {
            not_yet_tradable: NotYetTradableConfig {
                max_retries: env_parse(
                    "EXECUTOR_NYT_MAX_RETRIES",
                    defaults.executor.not_yet_tradable.max_retries,
                ),
                retry_interval_secs: env_parse(
                    "EXECUTOR_NYT_RETRY_INTERVAL_SECS",
                    defaults.executor.not_yet_tradable.retry_interval_secs,
                ),
                patterns: env_list("EXECUTOR_NYT_PATTERNS")
                    .unwrap_or(defaults.executor.not_yet_tradable.patterns),
            },
            transient: TransientConfig {
                max_retries: env_parse(
                    "EXECUTOR_TRANSIENT_MAX_RETRIES",
                    defaults.executor.transient.max_retries,
                ),
                base_delay_ms: env_parse(
                    "EXECUTOR_TRANSIENT_BASE_DELAY_MS",
                    defaults.executor.transient.base_delay_ms,
                ),
                max_delay_ms: env_parse(
                    "EXECUTOR_TRANSIENT_MAX_DELAY_MS",
                    defaults.executor.transient.max_delay_ms,
                ),
            },
        };

        let detector_config = DetectorConfig {
            poll_interval_secs: env::var("DETECTOR_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|raw| raw.trim().parse().ok()),
            websocket_enabled: env_parse("DETECTOR_WEBSOCKET_ENABLED", true),
            reconnect_delay_secs: env_parse(
                "DETECTOR_RECONNECT_DELAY_SECS",
                defaults.detector.reconnect_delay_secs,
            ),
        };

        let queue_config = QueueConfig {
            capacity: env_parse("QUEUE_CAPACITY", defaults.queue.capacity),
            drain_interval_ms: env_parse("QUEUE_DRAIN_INTERVAL_MS", defaults.queue.drain_interval_ms),
        };

        let auto_buy_config = AutoBuyConfig {
            enabled: env_parse("AUTOBUY_ENABLED", defaults.auto_buy.enabled),
            default_amount: env_parse("AUTOBUY_DEFAULT_AMOUNT", defaults.auto_buy.default_amount),
            max_amount: env_parse("AUTOBUY_MAX_AMOUNT", defaults.auto_buy.max_amount),
            trade_delay_ms: env_parse("AUTOBUY_TRADE_DELAY_MS", defaults.auto_buy.trade_delay_ms),
            blacklist: env_list("AUTOBUY_BLACKLIST").unwrap_or_default(),
            max_buys_per_symbol: env_parse(
                "AUTOBUY_MAX_BUYS_PER_SYMBOL",
                defaults.auto_buy.max_buys_per_symbol,
            ),
            max_attempts: env_parse("AUTOBUY_MAX_ATTEMPTS", defaults.auto_buy.max_attempts),
            retry_interval_secs: env_parse(
                "AUTOBUY_RETRY_INTERVAL_SECS",
                defaults.auto_buy.retry_interval_secs,
            ),
            timeout_secs: env_parse("AUTOBUY_TIMEOUT_SECS", defaults.auto_buy.timeout_secs),
        };

        let logging_config = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_parse("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            exchange: exchange_config,
            sniper: sniper_config,
            executor: executor_config,
            detector: detector_config,
            queue: queue_config,
            auto_buy: auto_buy_config,
            shutdown: ShutdownConfig {
                grace_secs: env_parse("SHUTDOWN_GRACE_SECS", defaults.shutdown.grace_secs),
            },
            logging: logging_config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.sniper.default_buffer < Decimal::ZERO || self.sniper.default_buffer > Decimal::ONE {
            return Err(AppError::Config(format!(
                "sniper.default_buffer must be within [0, 1], got {}",
                self.sniper.default_buffer
            )));
        }
        if self.queue.capacity == 0 {
            return Err(AppError::Config("queue.capacity must be at least 1".to_string()));
        }
        if self.executor.not_yet_tradable.max_retries == 0 || self.auto_buy.max_attempts == 0 {
            return Err(AppError::Config(
                "retry attempt limits must be at least 1".to_string(),
            ));
        }
        if self.auto_buy.default_amount <= Decimal::ZERO {
            return Err(AppError::Config(
                "auto_buy.default_amount must be positive".to_string(),
            ));
        }
        if self.auto_buy.max_amount < self.auto_buy.default_amount {
            return Err(AppError::Config(format!(
                "auto_buy.max_amount ({}) is below default_amount ({})",
                self.auto_buy.max_amount, self.auto_buy.default_amount
            )));
        }
        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.try_init().map_err(|e| {
            AppError::Config(format!("Failed to initialize logger: {}", e))
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                name: "binance".to_string(),
                api_key: "".to_string(),
                api_secret: "".to_string(),
                testnet: true,
            },
            sniper: SniperConfig {
                default_check_interval_ms: 500,
                default_timeout_secs: 30,
                default_buffer: Decimal::ZERO,
            },
            executor: ExecutorConfig {
                not_yet_tradable: NotYetTradableConfig {
                    max_retries: 12,
                    retry_interval_secs: 5,
                    patterns: DEFAULT_NOT_YET_TRADABLE_PATTERNS
                        .iter()
                        .map(|p| p.to_string())
                        .collect(),
                },
                transient: TransientConfig {
                    max_retries: 5,
                    base_delay_ms: 250,
                    max_delay_ms: 5_000,
                },
            },
            detector: DetectorConfig {
                poll_interval_secs: None,
                websocket_enabled: true,
                reconnect_delay_secs: 5,
            },
            queue: QueueConfig {
                capacity: 1024,
                drain_interval_ms: 100,
            },
            auto_buy: AutoBuyConfig {
                enabled: true,
                default_amount: Decimal::new(10, 0),
                max_amount: Decimal::new(100, 0),
                trade_delay_ms: 500,
                blacklist: Vec::new(),
                max_buys_per_symbol: 1,
                max_attempts: 12,
                retry_interval_secs: 5,
                timeout_secs: 60,
            },
            shutdown: ShutdownConfig { grace_secs: 5 },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
