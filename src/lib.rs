pub mod cleaner;
pub mod config;
pub mod errors;
pub mod freezer;
pub mod ir;
pub mod models;
pub mod pipeline;
pub mod plans;
pub mod quality;
pub mod sentinels;
pub mod store;
pub mod terminology;
pub mod textutil;
