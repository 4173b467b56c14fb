use anyhow::Result;
use tether_core::SocketClient;

/// Ask the host to end its current session
pub async fn run(client: &SocketClient) -> Result<()> {
    client.kill_session().await?;
    println!("Session killed");
    Ok(())
}
