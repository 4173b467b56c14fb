//! One-shot remote method calls

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tether_core::SocketClient;

use super::parse_value;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Remote method name, e.g. `getHostNumber`
    pub method: String,

    /// Arguments; each is parsed as JSON, otherwise sent as a string
    pub args: Vec<String>,
}

pub async fn run(client: &SocketClient, args: AskArgs) -> Result<()> {
    let call_args = call_args(&args.args);
    let result = client.invoke(&args.method, call_args).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn call_args(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|arg| parse_value(arg)).collect()
}
