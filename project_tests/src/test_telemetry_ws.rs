//! # Telemetry WebSocket Ingestion Test
//!
//! Connects two clients to a running telemetry server, pushes readings over
//! the socket, and verifies that stored and updated records are fanned out
//! to every connected client while bad frames are silently dropped.
//!
//! Run the server first, then: `cargo run --bin test_telemetry_ws`

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[clap(about = "WebSocket ingestion test against a running telemetry server")]
struct Args {
    #[clap(long, default_value = "ws://127.0.0.1:3000/ws")]
    ws_url: String,

    #[clap(long, default_value = "http://127.0.0.1:3000")]
    base_url: String,
}

/// Read frames until the next text frame, parsed as a server envelope.
async fn next_event(ws: &mut WsClient) -> Result<Value> {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .context("Timed out waiting for a frame")?
            .context("Connection closed unexpectedly")??;
        if msg.is_text() {
            return Ok(serde_json::from_str(msg.to_text()?)?);
        }
    }
}

/// Assert that no text frame arrives for a short while.
async fn expect_silence(ws: &mut WsClient, label: &str) -> Result<()> {
    match tokio::time::timeout(SILENCE_TIMEOUT, ws.next()).await {
        Err(_) => Ok(()),
        Ok(Some(Ok(msg))) if !msg.is_text() => Ok(()),
        Ok(frame) => bail!("{}: expected silence, got {:?}", label, frame),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("[*] Connecting listener and producer to {}...", args.ws_url);
    let (mut listener, _) = connect_async(args.ws_url.as_str())
        .await
        .context("Listener connection failed; is the server running?")?;
    let (mut producer, _) = connect_async(args.ws_url.as_str()).await?;
    println!("[OK] Both clients connected");

    // A reading pushed by one client reaches every client, the sender included.
    println!("[*] Sending a newReading frame...");
    let reading = json!({
        "event": "newReading",
        "data": {"kind": "humidity", "name": "greenhouse", "value": 54.2, "unit": "%"}
    });
    producer.send(Message::text(reading.to_string())).await?;

    let seen_by_listener = next_event(&mut listener).await?;
    if seen_by_listener["event"] != json!("recordStored") {
        bail!("Listener expected recordStored, got {}", seen_by_listener);
    }
    let record_id = seen_by_listener["data"]["id"]
        .as_str()
        .context("Broadcast record has no id")?
        .to_string();
    if seen_by_listener["data"]["name"] != json!("greenhouse") {
        bail!("Broadcast record does not match the reading: {}", seen_by_listener);
    }

    let seen_by_producer = next_event(&mut producer).await?;
    if seen_by_producer["data"]["id"] != json!(record_id.as_str()) {
        bail!("Producer saw a different record: {}", seen_by_producer);
    }
    println!("[OK] recordStored reached both clients (id {})", record_id);

    // A frame that is not valid JSON is dropped without an answer and
    // without killing the connection.
    println!("[*] Sending a garbage frame...");
    producer.send(Message::text("{not json".to_string())).await?;
    expect_silence(&mut producer, "After garbage frame").await?;

    producer
        .send(Message::text(
            json!({"event": "newReading", "data": {"kind": "humidity", "value": 55.0}}).to_string(),
        ))
        .await?;
    let after_garbage = next_event(&mut listener).await?;
    if after_garbage["event"] != json!("recordStored") {
        bail!("Connection did not survive the garbage frame: {}", after_garbage);
    }
    let _ = next_event(&mut producer).await?;
    println!("[OK] Garbage frame dropped, connection still live");

    // An update through the HTTP surface is broadcast as recordUpdated.
    println!("[*] Updating record {} over HTTP...", record_id);
    let client = reqwest::Client::new();
    client
        .put(format!(
            "{}/records/{}",
            args.base_url.trim_end_matches('/'),
            record_id
        ))
        .json(&json!({"unit": "percent"}))
        .send()
        .await?
        .error_for_status()?;

    let update_event = next_event(&mut listener).await?;
    if update_event["event"] != json!("recordUpdated")
        || update_event["data"]["unit"] != json!("percent")
    {
        bail!("Listener expected recordUpdated, got {}", update_event);
    }
    let _ = next_event(&mut producer).await?;
    println!("[OK] recordUpdated reached the listeners");

    // A client that connects late sees nothing from before its connection.
    println!("[*] Connecting a late subscriber...");
    let (mut late, _) = connect_async(args.ws_url.as_str()).await?;
    expect_silence(&mut late, "Late subscriber").await?;
    println!("[OK] Late subscriber received no replay");

    println!("[SUCCESS] WebSocket ingestion and broadcast behave as expected");
    Ok(())
}
