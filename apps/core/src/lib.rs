pub mod action_executor;
pub mod config;
pub mod discovery;
pub mod foreground;
pub mod hotkey;
pub mod input_hook;
pub mod logging;
pub mod model;
pub mod overlay_state;
pub mod query_pipeline;
pub mod runtime;
pub mod search;
pub mod windows_overlay;
