use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Per-IP request budget enforced at the connection layer.
    pub ip_rate_limit_per_second: u64,
    pub ip_rate_limit_burst: u32,
    /// Per-device budget for session creation, enforced in the handler.
    pub create_limit_max: u32,
    pub create_limit_window_secs: u64,
    /// Broadcast channel capacity for the session change feed.
    pub feed_capacity: usize,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/tableside".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let ip_rate_limit_per_second = env::var("IP_RATE_LIMIT_PER_SECOND")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let ip_rate_limit_burst = env::var("IP_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let create_limit_max = env::var("SESSION_CREATE_LIMIT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let create_limit_window_secs = env::var("SESSION_CREATE_WINDOW_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        let feed_capacity = env::var("FEED_CAPACITY")
            .unwrap_or_else(|_| "4096".to_string())
            .parse()
            .unwrap_or(4096);

        Ok(Config {
            database_url,
            port,
            ip_rate_limit_per_second,
            ip_rate_limit_burst,
            create_limit_max,
            create_limit_window_secs,
            feed_capacity,
        })
    }
}
