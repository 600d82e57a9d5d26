//! Network half of the segwit send pipeline.
//!
//! [`client::EsploraClient`] implements [`ChainDataGateway`] against an esplora-compatible
//! indexer, [`broadcaster::broadcast`] submits a finalized transaction, and [`SendPipeline`]
//! strings key loading, coin selection, building, signing and broadcasting together for a
//! single [`SendConfig`].

pub mod broadcaster;
pub mod client;
pub mod helper;
pub mod pipeline;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use broadcaster::{broadcast, BroadcastResult};
pub use client::{ChainDataGateway, EsploraClient, EsploraError};
pub use helper::{with_secret_key_file, ConfigError, SendConfig};
pub use pipeline::{PipelineError, PipelineFailure, PipelineStage, SendPipeline, SendReport};
