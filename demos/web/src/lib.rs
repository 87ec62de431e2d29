//! LogShipper Browser Demo
//!
//! Wires a LogShipper to localStorage and the browser's online signal, logs a
//! few records and shows each batch as the sink receives it. Open the page in
//! two tabs, close one mid-way, and the other will pick up what it left.

use logshipper::{
    BrowserNetwork, LocalStorage, LogBatch, LogShipper, Payload, ShipperConfig, ShipperOptions,
    SinkSource,
};
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

/// Log a message to the browser console and the page
fn log(msg: &str) {
    web_sys::console::log_1(&msg.into());

    // Also append to the output div if it exists
    if let Some(window) = web_sys::window() {
        if let Some(document) = window.document() {
            if let Some(output) = document.get_element_by_id("output") {
                let current = output.inner_html();
                output.set_inner_html(&format!("{}<div class=\"log-entry\">{}</div>", current, msg));
            }
        }
    }
}

/// Log an error
fn log_error(msg: &str) {
    web_sys::console::error_1(&msg.into());

    if let Some(window) = web_sys::window() {
        if let Some(document) = window.document() {
            if let Some(output) = document.get_element_by_id("output") {
                let current = output.inner_html();
                output.set_inner_html(&format!(
                    "{}<div class=\"log-entry error\">{}</div>",
                    current, msg
                ));
            }
        }
    }
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// Stand-in for the remote endpoint: prints each batch on the page.
async fn show_batch(batch: LogBatch) -> logshipper::Result<Value> {
    log(&format!("📤 Batch at {} with {} record(s)", batch.now, batch.records.len()));
    for rec in &batch.records {
        log(&format!("     - {} {} {}", rec.severity, rec.code, Value::Object(rec.payload.clone())));
    }
    Ok(json!({"received": batch.records.len()}))
}

/// Main entry point - runs the demo
#[wasm_bindgen(start)]
pub async fn main() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    log("🦀 LogShipper Browser Demo");
    log("==========================");
    log("");

    if let Err(e) = run_demo().await {
        log_error(&format!("Demo failed: {}", e));
    }
}

async fn run_demo() -> logshipper::Result<()> {
    // =========================================================================
    // Step 1: Create the shipper
    // =========================================================================
    log("📦 Creating LogShipper backed by localStorage...");

    let shipper = LogShipper::with_options(
        ShipperConfig::new("demo").with_interval_ms(2_000),
        LocalStorage::new()?,
        SinkSource::ready(show_batch),
        ShipperOptions::default().with_network(BrowserNetwork::new()?),
    )?;
    log(&format!("   storage prefix: {}", shipper.storage_prefix()));
    log("");

    // =========================================================================
    // Step 2: Log a burst of records - they go out as one batch
    // =========================================================================
    log("📝 Logging a burst of records...");
    shipper.log_info("load_app", payload(json!({"page": "/home"})));
    shipper.log_debug("button_click", payload(json!({"button": "sign_up"})));
    shipper.log_info("form_submit", payload(json!({"form": "registration"})));
    log(&format!("   send scheduled: {}", shipper.is_send_scheduled()));

    gloo_timers::future::TimeoutFuture::new(100).await;
    log("");

    // =========================================================================
    // Step 3: Log again right away - rate limited to one send per interval
    // =========================================================================
    log("⏱️ Logging again within the interval...");
    shipper.log_error("slow_request", payload(json!({"ms": 1234})));
    log("   (the next batch waits for the 2s interval)");

    gloo_timers::future::TimeoutFuture::new(2_500).await;
    log("");

    log("🎉 Demo complete!");
    log("");
    log("Records logged while offline wait in localStorage and are sent");
    log("as soon as the browser comes back online.");

    // Keep the shipper alive for the lifetime of the page.
    std::mem::forget(shipper);
    Ok(())
}
