//! Backend doubles for tests: a real HTTP server on a loopback port.

use crate::plugins::remote::client::{BackendClient, BackendConfig};
use axum::Router;
use url::Url;

pub async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// A loopback address nothing listens on.
pub fn unreachable_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

pub fn client_for(base_url: Url) -> BackendClient {
    BackendClient::new(&BackendConfig { base_url, ..Default::default() }).unwrap()
}
