pub mod app;
pub mod chem;
pub mod chemspider;
pub mod config;
pub mod convert;
pub mod domain;
pub mod error;
pub mod extract;
pub mod mopac;
pub mod output;
pub mod pipeline;
pub mod table;
pub mod workflow;
