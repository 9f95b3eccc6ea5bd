//! # Synchronization Flows
//!
//! `StratumChain` driving a real `StratumClient` against a server that
//! serves headers and chunks from an in-memory chain.
//!
//! ## Flows Tested:
//!
//! 1. Catch-up from a checkpointed store through chunks and single headers
//! 2. Fork repair after the server switches branches
//! 3. Persistence through the flat-file store
//! 4. Loop exit when the server drops the connection

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use header_store::{FileHeaderStore, HeaderStore, MemoryHeaderStore};
    use parking_lot::Mutex;
    use shared_types::BlockHeader;
    use stratum_chain::{ChainConfig, ChainListener, StratumChain, StratumHeaderSource};
    use stratum_protocol::StratumClient;
    use tokio::time::timeout;

    use crate::fixtures::{chain, fork, ChainServer};

    const WAIT: Duration = Duration::from_secs(10);

    type Heights = Arc<Mutex<Vec<(u64, bool)>>>;

    fn recorder() -> (Heights, Arc<dyn ChainListener>) {
        let heights: Heights = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heights);
        let listener = move |height: u64, _top: &BlockHeader, synced: bool| {
            sink.lock().push((height, synced));
        };
        (heights, Arc::new(listener))
    }

    async fn wait_for_synced(heights: &Heights, height: u64) {
        timeout(WAIT, async {
            while !heights.lock().contains(&(height, true)) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("synchronizer did not reach the expected height");
    }

    async fn client_for(server: &ChainServer) -> StratumClient {
        let client = StratumClient::new(server.client_config());
        client.start().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_catch_up_from_checkpoint() {
        let headers = chain(160);
        let config = ChainConfig::for_testing();
        let server = ChainServer::start(headers.clone(), config.interval).await;
        let client = client_for(&server).await;

        let store = MemoryHeaderStore::from_headers(0, &headers[..=100]).unwrap();
        let source = Arc::new(StratumHeaderSource::new(client.clone()));
        let mut sync = StratumChain::new(store, source, config);
        let (heights, listener) = recorder();
        sync.add_listener(listener);

        let handle = sync.start();
        wait_for_synced(&heights, 160).await;
        assert_eq!(handle.peer_height(), 160);

        let store = handle.close().await.unwrap();
        assert_eq!(store.height(), 160);
        assert_eq!(store.top(), headers[160]);
        assert!(store.is_closed());

        let recorded = heights.lock().clone();
        assert!(recorded.windows(2).all(|pair| pair[0].0 <= pair[1].0));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_fork_repair_follows_server_branch() {
        let main = chain(40);
        let config = ChainConfig::for_testing();
        let server = ChainServer::start(main.clone(), config.interval).await;
        let client = client_for(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockchain_headers");
        let store = FileHeaderStore::open(&path, main[0]).unwrap();
        let source = Arc::new(StratumHeaderSource::new(client.clone()));
        let mut sync = StratumChain::new(store, source, config);
        let (heights, listener) = recorder();
        sync.add_listener(listener);
        let handle = sync.start();
        wait_for_synced(&heights, 40).await;

        let branch = fork(&main, 32, 45, 7);
        server.set_chain(branch.clone());
        assert!(server.announce_tip());
        wait_for_synced(&heights, 45).await;

        let store = handle.close().await.unwrap();
        assert_eq!(store.height(), 45);
        assert_eq!(store.top(), branch[45]);
        drop(store);
        client.shutdown().await;

        // Reads need an open store.
        let reopened = FileHeaderStore::open(&path, main[0]).unwrap();
        assert_eq!(reopened.get(32).unwrap(), main[32]);
        assert_eq!(reopened.get(33).unwrap(), branch[33]);
        assert!(reopened.verify_last().is_ok());
    }

    #[tokio::test]
    async fn test_file_store_persists_synced_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockchain_headers");
        let headers = chain(75);
        let config = ChainConfig::for_testing();
        let server = ChainServer::start(headers.clone(), config.interval).await;
        let client = client_for(&server).await;

        let store = FileHeaderStore::open(&path, headers[0]).unwrap();
        let source = Arc::new(StratumHeaderSource::new(client.clone()));
        let mut sync = StratumChain::new(store, source, config);
        let (heights, listener) = recorder();
        sync.add_listener(listener);
        let handle = sync.start();
        wait_for_synced(&heights, 75).await;

        drop(handle.close().await.unwrap());
        client.shutdown().await;

        let reopened = FileHeaderStore::open(&path, headers[0]).unwrap();
        assert_eq!(reopened.height(), 75);
        assert_eq!(reopened.top(), headers[75]);
        assert!(reopened.verify_last().is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_ends_synchronizer() {
        let headers = chain(3);
        let config = ChainConfig::for_testing();
        let server = ChainServer::start(headers.clone(), config.interval).await;
        let client = client_for(&server).await;

        let store = MemoryHeaderStore::new(headers[0]);
        let source = Arc::new(StratumHeaderSource::new(client.clone()));
        let mut sync = StratumChain::new(store, source, config);
        let (heights, listener) = recorder();
        sync.add_listener(listener);
        let handle = sync.start();
        wait_for_synced(&heights, 3).await;

        assert!(server.server().close_connection());
        let store = timeout(WAIT, handle.join()).await.unwrap().unwrap();
        assert_eq!(store.height(), 3);
        assert!(store.is_closed());
        assert_eq!(server.tip_height(), 3);
    }
}
