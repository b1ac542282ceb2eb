//! Watch - print focus changes and mode switches as they happen.
//!
//! This demo shows:
//! - Connecting through the resolved socket path
//! - A typed hook and a filtered hook
//! - Issuing a query from inside a hook
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=i3wire_client=debug cargo run --example watch
//! ```

use i3wire_client::{Connection, EventType, Hook};
use serde::Deserialize;
use serde_json::Value;

/// The part of a mode event this demo cares about.
#[derive(Deserialize, Debug)]
struct ModeEvent {
    change: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let conn = Connection::connect().await?;
    println!("connected to i3 {}", conn.get_version().await?["human_readable"]);

    conn.on(EventType::Mode, |event: ModeEvent| async move {
        println!("mode: {}", event.change);
        Ok(())
    });

    let query_conn = conn.clone();
    conn.register(
        Hook::new(EventType::Workspace, move |event: Value| {
            let conn = query_conn.clone();
            async move {
                let workspaces = conn.get_workspaces().await?;
                let count = workspaces.as_array().map_or(0, Vec::len);
                println!(
                    "workspace {} focused ({} open)",
                    event["current"]["name"], count
                );
                Ok(())
            }
        })
        .on_change("focus"),
    );

    conn.register(
        Hook::new(EventType::Window, |event: Value| async move {
            println!("window: {}", event["container"]["name"]);
            Ok(())
        })
        .on_change("focus"),
    );

    let subscribed = conn
        .subscribe(&[EventType::Mode, EventType::Workspace, EventType::Window])
        .await?;
    println!("subscribed to {:?}", subscribed);

    let stopper = conn.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    conn.wait_for_shutdown().await?;
    Ok(())
}
