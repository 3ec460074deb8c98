pub mod analyzer;
pub mod config;
pub mod matcher;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod scraper;
pub mod storage;
pub mod utils;
