//! Shared test fixtures.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::{encode_chunk, BlockHeader, Network};
use stratum_protocol::testing::MockStratumServer;
use stratum_protocol::ClientConfig;

/// Append `count` headers to `headers`. `seed` separates competing branches.
pub fn extend(headers: &mut Vec<BlockHeader>, count: usize, seed: u32) {
    for _ in 0..count {
        let parent = headers[headers.len() - 1];
        headers.push(BlockHeader {
            prev_hash: parent.hash(),
            time: parent.time + 600,
            nonce: seed.wrapping_mul(1_000_003).wrapping_add(headers.len() as u32),
            ..parent
        });
    }
}

/// Mainnet genesis followed by `tip` headers (heights `0..=tip`).
pub fn chain(tip: u64) -> Vec<BlockHeader> {
    let mut headers = vec![Network::Mainnet.genesis()];
    extend(&mut headers, tip as usize, 0);
    headers
}

/// `base[..=fork_height]` extended on a different branch up to `tip`.
pub fn fork(base: &[BlockHeader], fork_height: u64, tip: u64, seed: u32) -> Vec<BlockHeader> {
    let mut headers = base[..=fork_height as usize].to_vec();
    extend(&mut headers, (tip - fork_height) as usize, seed);
    headers
}

/// Mock server answering header queries from a swappable chain.
pub struct ChainServer {
    server: MockStratumServer,
    chain: Arc<Mutex<Vec<BlockHeader>>>,
}

impl ChainServer {
    /// Serve `headers`, chunked by `interval`.
    pub async fn start(headers: Vec<BlockHeader>, interval: u64) -> Self {
        let chain = Arc::new(Mutex::new(headers));
        let served = Arc::clone(&chain);
        let server = MockStratumServer::with_responder(Arc::new(
            move |method: &str, params: &[Value]| {
                let headers = served.lock();
                let arg = params.first().and_then(Value::as_u64).unwrap_or(0);
                match method {
                    "server.version" => Some(Ok(json!("ChainServer 1.0"))),
                    "blockchain.headers.subscribe" => {
                        let tip = headers.len() as u64 - 1;
                        Some(Ok(headers[tip as usize].to_stratum_json(tip)))
                    }
                    "blockchain.block.get_header" => Some(Ok(headers
                        .get(arg as usize)
                        .map(|h| h.to_stratum_json(arg))
                        .unwrap_or(Value::Null))),
                    "blockchain.block.get_chunk" => {
                        let start = ((arg * interval) as usize).min(headers.len());
                        let end = (start + interval as usize).min(headers.len());
                        Some(Ok(json!(encode_chunk(&headers[start..end]))))
                    }
                    _ => None,
                }
            },
        ))
        .await
        .expect("bind mock server");
        Self { server, chain }
    }

    /// The underlying scripted server.
    pub fn server(&self) -> &MockStratumServer {
        &self.server
    }

    /// Client config pointing at this server.
    pub fn client_config(&self) -> ClientConfig {
        self.server.client_config()
    }

    /// Replace the served chain.
    pub fn set_chain(&self, headers: Vec<BlockHeader>) {
        *self.chain.lock() = headers;
    }

    /// Height of the served tip.
    pub fn tip_height(&self) -> u64 {
        self.chain.lock().len() as u64 - 1
    }

    /// Push a header notification for the served tip.
    pub fn announce_tip(&self) -> bool {
        let tip = {
            let headers = self.chain.lock();
            let height = headers.len() as u64 - 1;
            headers[height as usize].to_stratum_json(height)
        };
        self.server.notify("blockchain.headers.subscribe", vec![tip])
    }
}
