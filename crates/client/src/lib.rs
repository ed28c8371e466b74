pub mod client;
pub mod prediction;

pub use client::GameClient;
pub use prediction::PredictionEngine;
