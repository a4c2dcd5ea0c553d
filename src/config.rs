use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
    pub openai: OpenAiConfig,
    pub search: SearchConfig,
    pub ledger: LedgerConfig,
    pub scheduler: SchedulerConfig,
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GmailConfig {
    pub credentials_path: String,
    pub token_cache_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Gmail search query used to find candidate confirmation emails
    pub query: String,
    /// Optional upper date bound, Gmail format "YYYY/MM/DD"
    pub before_date: Option<String>,
    pub max_results: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub output_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub schedule_times: Vec<String>, // Format: "HH:MM" (e.g., ["02:00", "14:00"])
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub channel_id: String,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Vérifier que les variables essentielles sont définies
        Self::check_required_env_vars()?;

        // Configuration chargée depuis les variables d'environnement
        Ok(Config {
            gmail: GmailConfig {
                credentials_path: std::env::var("GMAIL_CREDENTIALS_PATH")
                    .expect("GMAIL_CREDENTIALS_PATH doit être défini"),
                token_cache_path: std::env::var("GMAIL_TOKEN_CACHE_PATH")
                    .unwrap_or_else(|_| "./gmail-token-cache.json".to_string()),
            },
            openai: OpenAiConfig {
                api_key: std::env::var("OPENAI_API_KEY")
                    .expect("OPENAI_API_KEY doit être défini"),
                base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("OPENAI_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                temperature: std::env::var("OPENAI_TEMPERATURE")
                    .unwrap_or_else(|_| "0.2".to_string())
                    .parse()
                    .unwrap_or(0.2),
            },
            search: SearchConfig {
                query: std::env::var("GOLF_SEARCH_QUERY")
                    .unwrap_or_else(|_| "golf confirmation".to_string()),
                before_date: std::env::var("GOLF_SEARCH_BEFORE").ok(),
                max_results: std::env::var("GOLF_MAX_RESULTS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
            ledger: LedgerConfig {
                output_path: std::env::var("LEDGER_PATH")
                    .unwrap_or_else(|_| "./emails.csv".to_string()),
            },
            scheduler: SchedulerConfig {
                enabled: std::env::var("SCHEDULER_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
                schedule_times: std::env::var("SCHEDULER_TIMES")
                    .unwrap_or_else(|_| "02:00".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            slack: match (std::env::var("SLACK_BOT_TOKEN"), std::env::var("SLACK_CHANNEL_ID")) {
                (Ok(bot_token), Ok(channel_id)) => Some(SlackConfig {
                    bot_token,
                    channel_id,
                }),
                _ => {
                    log::warn!("SLACK_BOT_TOKEN ou SLACK_CHANNEL_ID non défini - notifications Slack désactivées");
                    None
                }
            },
        })
    }

    fn check_required_env_vars() -> Result<()> {
        let required_vars = [
            "GMAIL_CREDENTIALS_PATH",
            "OPENAI_API_KEY",
        ];

        let mut missing_vars = Vec::new();

        for var in &required_vars {
            if std::env::var(var).is_err() {
                missing_vars.push(*var);
            }
        }

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Variables d'environnement manquantes: {}\n\
                 \n\
                 💡 Solutions :\n\
                 1. Créer un fichier .env avec vos credentials :\n\
                    cp .env.example .env\n\
                    # Puis éditer .env avec vos valeurs\n\
                 \n\
                 2. Ou définir les variables manuellement :\n\
                    export GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    export OPENAI_API_KEY=sk-...\n\
                    cargo run -- --dry-run",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}
