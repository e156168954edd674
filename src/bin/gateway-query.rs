//! Command-line client for the gateway.
//!
//! Usage:
//!   gateway-query [--addr 10.42.239.181:10000]            # ask for current values
//!   gateway-query [--addr host:port] --mode TLH           # change device priority
//!
//! Mode commands get no reply, so the client only waits when querying.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use serial_gateway::domain::{ModeToken, QUERY_ACTION};

const DEFAULT_ADDR: &str = "127.0.0.1:10000";
const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let addr: SocketAddr = arg_value(&args, "--addr")
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
        .parse()
        .context("invalid --addr")?;
    let mode = arg_value(&args, "--mode")
        .map(|m| m.parse::<ModeToken>())
        .transpose()?;

    let payload = match mode {
        Some(mode) => json!({ "command": mode.as_str() }),
        None => json!({ "action": QUERY_ACTION }),
    };
    let data = payload.to_string();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(data.as_bytes(), addr).await?;
    println!("Sent:     {}", data);

    if mode.is_some() {
        return Ok(());
    }

    let mut buf = [0u8; 1024];
    let len = match timeout(REPLY_TIMEOUT, socket.recv(&mut buf)).await {
        Ok(received) => received?,
        Err(_) => bail!("no reply from {} within {:?}", addr, REPLY_TIMEOUT),
    };
    println!("Received: {}", String::from_utf8_lossy(&buf[..len]));
    Ok(())
}
