// Library root: scoring, ranking and lineup optimization over the Cartola
// datastore.

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod model;
pub mod optimizer;
pub mod ranking;
pub mod repository;
pub mod scoring;
pub mod weights;
