//! subscrape: export a subreddit's posts and full comment trees to CSV.

pub mod cli;
pub mod collector;
pub mod config;
pub mod export;
pub mod forum;
pub mod model;

// Re-exports for CLI and consumers.
pub use collector::{collect, collect_with_progress, CollectError};
pub use config::{load_config, load_credentials, ConfigError, Credentials};
pub use export::{write_tables, ExportError};
pub use forum::{
    create_client, ApiError, ForumApi, ListingMode, RedditClient, RedditClientBuilder, Timeframe,
};
pub use model::{Comment, Item, Tables, DELETED_AUTHOR};
