//! `HeaderSource` over a live Stratum client.

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{decode_chunk, BlockHeader, CodecError};
use stratum_protocol::{ResponseFuture, StratumClient, SubscriptionStream};
use tracing::debug;

use crate::domain::ChainError;
use crate::ports::HeaderSource;

/// Header source backed by a [`StratumClient`].
#[derive(Clone)]
pub struct StratumHeaderSource {
    client: StratumClient,
}

impl StratumHeaderSource {
    /// Wrap a client. The client may be started before or after.
    pub fn new(client: StratumClient) -> Self {
        Self { client }
    }

    /// The wrapped client.
    pub fn client(&self) -> &StratumClient {
        &self.client
    }
}

#[async_trait]
impl HeaderSource for StratumHeaderSource {
    fn headers_stream(&self) -> SubscriptionStream {
        self.client.headers_stream()
    }

    async fn subscribe_headers(&self) -> ResponseFuture {
        self.client.subscribe_to_headers().await.ack
    }

    async fn get_header(&self, height: u64) -> Result<Option<BlockHeader>, ChainError> {
        let result = self.client.get_header(height).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(BlockHeader::from_stratum_json(&result)?))
    }

    async fn get_chunk(&self, index: u64) -> Result<Vec<BlockHeader>, ChainError> {
        let result = self.client.get_chunk(index).await?;
        let data = match &result {
            Value::String(data) => data,
            _ => return Err(CodecError::InvalidHex("chunk is not a string".to_string()).into()),
        };
        let headers = decode_chunk(data)?;
        debug!(index, size = headers.len(), "Decoded chunk");
        Ok(headers)
    }
}
