use std::sync::Arc;
use std::time::Duration;

use mcpbroker_gateway::{DependenciesBuilder, GatewayConfig, GatewayServer};
use mcpbroker_storage::EncryptionConfig;
use tests::fixtures::{catalog, test_db};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

#[tokio::test]
async fn test_server_stops_on_cancel() {
    let deps = DependenciesBuilder::new()
        .with_database(test_db(), EncryptionConfig::new())
        .with_catalog(Arc::new(catalog("https://auth.example.com")))
        .with_token_secret(Zeroizing::new(vec![7; 32]))
        .build()
        .unwrap();
    let config = GatewayConfig {
        port: 0,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let handle = GatewayServer::new(config, deps).spawn(cancel.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Server did not stop")
        .expect("Server task panicked");
    assert!(result.is_ok());
}
