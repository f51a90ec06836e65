//! Example: Send one alarm event over a main path with a back-up fall-back.

use std::time::Duration;

use dc09_spt::{Dialer, DialerConfig, EventParams, Network, PathOptions, Slot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = DialerConfig::builder()
        .account("1234")
        .receiver(1)
        .path_timeout(Duration::from_secs(5))
        .build();
    let dialer = Dialer::new(config);

    dialer
        .set_path(Network::Main, Slot::Primary, PathOptions::new("192.168.0.50", 12128))
        .await?;
    dialer
        .set_path(Network::Backup, Slot::Primary, PathOptions::new("10.64.0.1", 12128))
        .await?;

    // Burglary alarm, zone 3, partition 1
    let event = EventParams::new()
        .with("code", "BA")
        .with("zone", "03")
        .with("area", 1)
        .with("text", "hallway");
    let seq = dialer.send_message("SIA", &event).await?;
    println!("Queued burglary alarm as seq {seq}");

    // Same event in Contact ID
    let seq = dialer
        .send_message("CID", &EventParams::new().with("code", "130").with("zone", 3).with("area", 1))
        .await?;
    println!("Queued Contact ID alarm as seq {seq}");

    if dialer.wait_idle(Duration::from_secs(30)).await {
        println!("Delivered");
    } else {
        println!("Still queued after 30s");
    }

    let state = dialer.state().await;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
