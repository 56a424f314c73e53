// ABSA: aspect-based sentiment analysis for bank reviews
//
// This is the library root. Each module corresponds to one layer of the
// review -> topics/sentiments pipeline.

pub mod config;
pub mod labels;
pub mod model;
pub mod output;
pub mod pipeline;

#[cfg(feature = "web")]
pub mod web;
