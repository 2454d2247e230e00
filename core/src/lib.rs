pub mod anomaly_detector;
pub mod anomaly_rules;
pub mod chain_detector;
pub mod classification;
pub mod clock;
pub mod config;
pub mod device_association;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod graph_builder;
pub mod graph_overlay;
pub mod link_analysis;
pub mod location_resolver;
pub mod record;
pub mod rng;
pub mod synthetic;
pub mod temporal_index;
pub mod timeline;
pub mod tower_activity;
pub mod types;
