use crate::error::TrackError;
use crate::tracking::types::{OrderRef, OrderSnapshot, OrderSnapshotWire, TrackingConfig};
use reqwest::Client;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn track_endpoint(base_url: &str, order_ref: &OrderRef) -> String {
    match order_ref {
        OrderRef::Id(order_id) => format!("{base_url}/orders/{order_id}/track"),
        OrderRef::Ticket(ticket) => format!("{base_url}/orders/track?ticket={ticket}"),
    }
}

/// One network round trip; no retries, no caching. The scheduler owns all
/// retry and cadence decisions.
pub async fn fetch_order_snapshot(
    client: &Client,
    config: &TrackingConfig,
) -> Result<OrderSnapshot, TrackError> {
    let endpoint = track_endpoint(&config.base_url, &config.order_ref);
    let mut request = client.get(endpoint);
    if let Some(token) = &config.auth_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?.error_for_status()?;
    let wire = response.json::<OrderSnapshotWire>().await?;
    Ok(wire.into())
}

pub async fn connect_push_channel(push_url: &str) -> Result<PushStream, TrackError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(1 << 20),
        max_frame_size: Some(256 << 10),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(push_url, Some(ws_config), true).await?;
    Ok(stream)
}
