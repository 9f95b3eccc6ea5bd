//! # Protocol Client Flows
//!
//! A `StratumClient` against a scripted server over loopback TCP:
//!
//! 1. **Correlation**: concurrent calls answered out of order
//! 2. **Error replies**: surface as `ClientError::Protocol`
//! 3. **Unknown ids**: counted and ignored
//! 4. **Shutdown**: every pending call fails, every queue ends
//! 5. **Subscriptions**: acks and notifications reach only their topic

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use stratum_protocol::testing::MockStratumServer;
    use stratum_protocol::{ClientError, ConnectionState, StratumClient, StratumMessage};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);
    const ADDRESS: &str = "mrLC19Je2BuWQDkWSTriGYPyQJXKkkBmCx";

    async fn connected(server: &MockStratumServer) -> StratumClient {
        let client = StratumClient::new(server.client_config());
        client.start().await.unwrap();
        let version = server.next_request().await.unwrap();
        assert_eq!(version["method"], "server.version");
        client
    }

    #[tokio::test]
    async fn test_concurrent_calls_resolve_by_id() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;

        let header = client.request("blockchain.block.get_header", vec![json!(7)]).await;
        let history = client.request("blockchain.address.get_history", vec![json!(ADDRESS)]).await;
        let first = server.next_request().await.unwrap();
        let second = server.next_request().await.unwrap();
        assert_eq!(first["method"], "blockchain.block.get_header");
        assert_eq!(second["method"], "blockchain.address.get_history");

        server.reply(&second["id"], json!([]));
        server.reply(&first["id"], json!({"block_height": 7}));

        let history = timeout(WAIT, history).await.unwrap().unwrap();
        let header = timeout(WAIT, header).await.unwrap().unwrap();
        assert_eq!(history.into_result().unwrap(), json!([]));
        assert_eq!(header.into_result().unwrap()["block_height"], 7);
    }

    #[tokio::test]
    async fn test_error_reply_resolves_call() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;

        let call = client.request("blockchain.transaction.get", vec![json!("00")]).await;
        let request = server.next_request().await.unwrap();
        server.reply_error(&request["id"], json!({"code": 2, "message": "unknown txid"}));

        match timeout(WAIT, call).await.unwrap() {
            Err(ClientError::Protocol(error)) => assert_eq!(error["code"], 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(client.is_running());
    }

    #[tokio::test]
    async fn test_reply_with_unknown_id_is_ignored() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;

        server.reply(&json!(424242), json!("stray"));
        let version = client.request("server.version", vec![]).await;
        let request = server.next_request().await.unwrap();
        server.reply(&request["id"], json!("ElectrumX 1.16"));

        let version = timeout(WAIT, version).await.unwrap().unwrap();
        assert_eq!(version.into_result().unwrap(), json!("ElectrumX 1.16"));
        assert!(client
            .stats()
            .total_unknown
            .load(std::sync::atomic::Ordering::SeqCst)
            >= 1);
        assert!(client.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_fails_calls_and_ends_queues() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;

        let headers = client.subscribe_to_headers().await;
        let addresses = client.address_stream();
        let call = client.request("blockchain.block.get_chunk", vec![json!(0)]).await;
        server.next_request_for("blockchain.block.get_chunk").await.unwrap();

        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Terminated);

        let err = timeout(WAIT, call).await.unwrap().unwrap_err();
        assert!(err.is_disconnect());
        let ack = timeout(WAIT, headers.ack).await.unwrap();
        assert!(ack.is_err());
        assert!(timeout(WAIT, headers.stream.recv()).await.unwrap().is_sentinel());
        assert!(timeout(WAIT, addresses.recv()).await.unwrap().is_sentinel());
        assert_eq!(client.pending_calls(), 0);

        let late = client.request("server.version", vec![]).await;
        assert!(matches!(late.await, Err(ClientError::NotRunning)));
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;

        let mut calls = Vec::new();
        for height in 0..5 {
            calls.push(client.request("blockchain.block.get_header", vec![json!(height)]).await);
        }
        let mut ids = Vec::new();
        for _ in 0..5 {
            let request = server.next_request().await.unwrap();
            ids.push(request["id"].as_u64().unwrap());
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(
            calls.iter().map(|call| call.id()).collect::<Vec<_>>(),
            ids.iter().copied().map(Some).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_address_ack_reaches_only_its_caller() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;
        let headers = client.headers_stream();

        let subscription = client.subscribe_to_address(ADDRESS).await;
        let request = server
            .next_request_for("blockchain.address.subscribe")
            .await
            .unwrap();
        assert_eq!(request["params"], json!([ADDRESS]));

        let history = json!([{"tx_hash": "a1b2", "height": 340242}]);
        server.reply(&request["id"], history.clone());

        let ack = timeout(WAIT, subscription.ack).await.unwrap().unwrap();
        assert_eq!(ack.into_result().unwrap(), history);
        assert!(subscription.stream.try_recv().is_none());
        assert!(headers.try_recv().is_none());
        assert_eq!(client.subscribed_addresses(), vec![ADDRESS.to_string()]);
    }

    #[tokio::test]
    async fn test_notifications_route_by_topic() {
        let server = MockStratumServer::start().await.unwrap();
        let client = connected(&server).await;
        let headers = client.headers_stream();
        let addresses = client.address_stream();

        server.notify("blockchain.address.subscribe", vec![json!(ADDRESS), json!("f00d")]);
        server.notify(
            "blockchain.headers.subscribe",
            vec![json!({"block_height": 340243})],
        );

        match timeout(WAIT, addresses.recv()).await.unwrap() {
            StratumMessage::Notification { method, params } => {
                assert_eq!(method, "blockchain.address.subscribe");
                assert_eq!(params, vec![json!(ADDRESS), json!("f00d")]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        let header = timeout(WAIT, headers.recv()).await.unwrap();
        assert_eq!(header.payload().unwrap()["block_height"], 340243);
        assert!(addresses.try_recv().is_none());
    }
}
