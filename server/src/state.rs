use crate::{config::Config, db::DbPool, feed::FeedHub};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub feed: FeedHub,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Self {
        let feed = FeedHub::new(config.feed_capacity);
        Self { pool, config, feed }
    }
}
