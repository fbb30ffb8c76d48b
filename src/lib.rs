// =============================================================================
// Pullback Scalper - library root
// =============================================================================
//
// Market data streaming, streaming indicators and the pullback strategy.
// The binary in main.rs wires one live pipeline out of these pieces.
// =============================================================================

pub mod indicators;
pub mod market_data;
pub mod pipeline;
pub mod runtime_config;
pub mod strategy;
pub mod stream;

pub mod error;
pub mod types;
