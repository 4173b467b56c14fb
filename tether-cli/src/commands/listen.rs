//! Print pushed events until interrupted

use anyhow::{Result, bail};
use clap::Args;
use serde_json::Value;
use tether_core::{InboundEvent, SocketClient};
use tracing::info;

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Listener names, e.g. `onMessage onAck`
    pub events: Vec<String>,

    /// Print every event the host pushes
    #[arg(long)]
    pub all: bool,
}

pub async fn run(client: &SocketClient, args: ListenArgs) -> Result<()> {
    if args.events.is_empty() && !args.all {
        bail!("Nothing to listen for: name at least one event or pass --all");
    }

    for event in &args.events {
        let name = event.clone();
        client
            .on(event, move |payload: Value| {
                let name = name.clone();
                async move { print_event(&name, &payload) }
            })
            .await?;
        info!(event = %event, "Listening");
    }

    let _all = args.all.then(|| {
        client.bus().on("**", |event: InboundEvent| async move {
            print_event(&event.name, &event.payload)
        })
    });

    std::future::pending::<()>().await;
    Ok(())
}

fn print_event(name: &str, payload: &Value) {
    println!("{}: {}", name, format_payload(payload));
}

fn format_payload(payload: &Value) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| payload.to_string())
}
