//! Background reachability probe for the API host.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use crate::event::Event;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Periodically open a TCP connection to the API host and report changes in
/// reachability as [`Event::Connectivity`]. The session starts out online.
pub fn spawn_connectivity_probe(
  base_url: &Url,
  interval: Duration,
  tx: mpsc::UnboundedSender<Event>,
) {
  let (Some(host), Some(port)) = (
    base_url.host_str().map(String::from),
    base_url.port_or_known_default(),
  ) else {
    warn!(url = %base_url, "cannot probe connectivity without a host");
    return;
  };

  tokio::spawn(async move {
    let mut online = true;
    loop {
      tokio::time::sleep(interval).await;

      let reachable = probe(&host, port).await;
      if reachable != online {
        online = reachable;
        info!(host = %host, online, "connectivity changed");
        if tx.send(Event::Connectivity(online)).is_err() {
          break;
        }
      }
    }
  });
}

async fn probe(host: &str, port: u16) -> bool {
  matches!(
    tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await,
    Ok(Ok(_))
  )
}
