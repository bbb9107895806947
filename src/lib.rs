#![forbid(unsafe_code)]

pub mod book;
pub mod build;
pub mod cli;
pub mod config;
pub mod dom;
pub mod emit;
pub mod epub;
pub mod error;
pub mod formats;
pub mod grouping;
pub mod logging;
pub mod manifest;
pub mod registry;
pub mod section;
pub mod translation;
pub mod xref;
