pub mod alerts_cmd;
pub mod burn_rate_cmd;
pub mod config_cmd;
pub mod output;
pub mod predict_cmd;
pub mod renderer;
pub mod snapshots;
pub mod watch_cmd;
