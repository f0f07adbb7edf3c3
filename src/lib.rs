pub mod age;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod genomic;
pub mod metabolic;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod tools;
