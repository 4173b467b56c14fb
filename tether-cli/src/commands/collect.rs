//! Windowed message collection

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tether_core::{
    CollectedMessage, CollectorFilter, CollectorOptions, EndReason, SocketClient, accept_all,
};
use tracing::info;

use super::{CliError, parse_value};

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Chat to collect from: a chat id, or a chat/message object as JSON
    pub chat: String,

    /// Event carrying messages
    #[arg(long, default_value = "onMessage")]
    pub event: String,

    /// Stop after this many messages were collected
    #[arg(long)]
    pub max: Option<usize>,

    /// Stop after this many candidate messages were seen
    #[arg(long)]
    pub max_processed: Option<usize>,

    /// Total time budget in seconds
    #[arg(long)]
    pub time: Option<u64>,

    /// Stop when nothing was collected for this many seconds
    #[arg(long)]
    pub idle: Option<u64>,

    /// Seconds between expiry checks
    #[arg(long)]
    pub sweep: Option<u64>,

    /// Only keep messages whose body contains this text
    #[arg(long)]
    pub contains: Option<String>,

    /// End reasons that count as failure, comma separated (e.g. `time,idle`)
    #[arg(long, value_delimiter = ',')]
    pub errors: Vec<EndReason>,
}

impl CollectArgs {
    fn options(&self) -> CollectorOptions {
        let mut options = CollectorOptions::new().event(&self.event);
        if let Some(max) = self.max {
            options = options.max(max);
        }
        if let Some(max_processed) = self.max_processed {
            options = options.max_processed(max_processed);
        }
        if let Some(secs) = self.time {
            options = options.time(Duration::from_secs(secs));
        }
        if let Some(secs) = self.idle {
            options = options.idle(Duration::from_secs(secs));
        }
        if let Some(secs) = self.sweep {
            options = options.sweep_interval(Duration::from_secs(secs));
        }
        options
    }

    fn filter(&self) -> CollectorFilter {
        match &self.contains {
            Some(needle) => {
                let needle = needle.clone();
                Arc::new(move |message: &CollectedMessage| {
                    message.body().is_some_and(|body| body.contains(&needle))
                })
            }
            None => accept_all(),
        }
    }
}

pub async fn run(client: &SocketClient, args: CollectArgs) -> Result<()> {
    let target = parse_value(&args.chat);
    let mut collector = client
        .create_message_collector(&target, args.filter(), args.options())
        .await?;
    info!(chat = %collector.scope().chat_id.as_str(), "Collecting");

    while let Some(message) = collector.next().await {
        println!("{}", serde_json::to_string(&message)?);
    }

    let end = collector.ended().await?;
    info!(reason = %end.reason, count = end.collection.len(), "Collector ended");

    if args.errors.contains(&end.reason) {
        return Err(CliError::CollectorEnded {
            reason: end.reason,
            count: end.collection.len(),
        }
        .into());
    }
    Ok(())
}
