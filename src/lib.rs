pub mod analysis;
pub mod config;
pub mod parsing;
pub mod report;
pub mod scan;
