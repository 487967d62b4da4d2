//! # Telemetry REST Round-Trip Test
//!
//! Exercises the HTTP surface of a running telemetry server: create, fetch,
//! list, search and update a record, plus the documented failure paths.
//!
//! Run the server first, then: `cargo run --bin test_telemetry_api`

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[clap(about = "REST round-trip test against a running telemetry server")]
struct Args {
    #[clap(long, default_value = "http://127.0.0.1:3000")]
    base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();
    let base = args.base_url.trim_end_matches('/');

    println!("[*] Checking {}/health...", base);
    let health = client.get(format!("{}/health", base)).send().await?;
    if !health.status().is_success() {
        bail!("Health check failed with status {}", health.status());
    }
    println!("[OK] Server is up");

    // Create
    println!("[*] POST /records...");
    let created = client
        .post(format!("{}/records", base))
        .json(&json!({
            "kind": "temperature",
            "name": "boiler-room",
            "value": 21.5,
            "unit": "C"
        }))
        .send()
        .await?;
    if created.status().as_u16() != 201 {
        bail!("Expected 201 Created, got {}", created.status());
    }
    let record: Value = created.json().await?;
    let id = record["id"]
        .as_str()
        .context("Created record has no id")?
        .to_string();
    if record["timestamp"].as_str().is_none() {
        bail!("Created record has no server-assigned timestamp");
    }
    println!("[OK] Created record {}", id);

    // Fetch by id
    println!("[*] GET /records/{}...", id);
    let fetched: Value = client
        .get(format!("{}/records/{}", base, id))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if fetched["name"] != json!("boiler-room") || fetched["value"] != json!(21.5) {
        bail!("Fetched record does not match what was stored: {}", fetched);
    }
    println!("[OK] Fetched record matches");

    // List
    println!("[*] GET /records...");
    let all: Vec<Value> = client
        .get(format!("{}/records", base))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if !all.iter().any(|r| r["id"] == json!(id.as_str())) {
        bail!("Record {} missing from the full listing", id);
    }
    println!("[OK] Listing contains the record ({} total)", all.len());

    // Search
    println!("[*] GET /records/search...");
    let hits: Vec<Value> = client
        .get(format!(
            "{}/records/search?kind=temperature&name=boiler-room",
            base
        ))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if !hits.iter().any(|r| r["id"] == json!(id.as_str())) {
        bail!("Search by kind and name did not return record {}", id);
    }
    let misses: Vec<Value> = client
        .get(format!("{}/records/search?kind=no-such-kind", base))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if !misses.is_empty() {
        bail!("Search for an unused kind returned {} records", misses.len());
    }
    println!("[OK] Search matches exactly");

    // Update
    println!("[*] PUT /records/{}...", id);
    let updated: Value = client
        .put(format!("{}/records/{}", base, id))
        .json(&json!({"value": 23.0}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if updated["value"] != json!(23.0) {
        bail!("Update did not change the value: {}", updated);
    }
    if updated["kind"] != json!("temperature") {
        bail!("Update clobbered a field that was not in the patch: {}", updated);
    }
    println!("[OK] Partial update kept untouched fields");

    // Failure paths
    println!("[*] Checking failure responses...");
    let missing = client
        .get(format!("{}/records/no-such-id", base))
        .send()
        .await?;
    if missing.status().as_u16() != 404 {
        bail!("GET of an unknown id returned {}", missing.status());
    }
    let missing_put = client
        .put(format!("{}/records/no-such-id", base))
        .json(&json!({"value": 1}))
        .send()
        .await?;
    if missing_put.status().as_u16() != 404 {
        bail!("PUT of an unknown id returned {}", missing_put.status());
    }
    let malformed = client
        .post(format!("{}/records", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    if malformed.status().as_u16() != 400 {
        bail!("Malformed create returned {}", malformed.status());
    }
    println!("[OK] 404 and 400 paths behave");

    println!("[SUCCESS] REST round-trip complete");
    Ok(())
}
