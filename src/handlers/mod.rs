mod health;
mod metrics;
mod uptime;

pub use health::{health_handler, health_head_handler, storage_health_handler, transcoder_health_handler};
pub use metrics::metrics_handler;
pub use uptime::{history_handler, parse_limit, record_handler, summary_handler, summarize};
