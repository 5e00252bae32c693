use std::time::Duration;

use callx::prelude::{Client, RequestDescriptor};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callx=debug")),
        )
        .init();

    let client = Client::builder("https://httpbin.org")
        .client_name("basic-json-demo")
        .default_header("accept", "application/json")
        .default_timeout(Duration::from_secs(10))
        .try_build()?;

    let search = RequestDescriptor::get("/anything/:section")
        .path_param("section", "release notes")
        .query("q", "hi there")
        .optional_query("page", None)
        .build();
    let echoed: Value = client.fetch(&search).await?;
    println!("GET echoed url={}", echoed["url"]);

    let create = RequestDescriptor::post("/post")
        .json(&json!({ "name": "demo", "tags": ["a", "b"] }))?
        .build();
    let response = client
        .send_with_progress(&create, |progress| {
            if let Some(fraction) = progress.fraction() {
                println!("download {:.0}%", fraction * 100.0);
            }
        })
        .await?;
    println!(
        "POST status={} bytes={}",
        response.status(),
        response.data().len()
    );
    Ok(())
}
