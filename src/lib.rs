pub mod config;
pub mod db;
pub mod feed;
pub mod jobs;
pub mod model;
pub mod platform;
pub mod settings;
pub mod sync;
