//! Notification channel: an optional pub-sub fanout used to short-circuit
//! `wait_any`'s one-second poll, never to guarantee delivery
//!
//! A publisher writes the flattened queue path that just received an item;
//! every connected subscriber receives that same line. Nothing here is
//! durable and no line is ever retried — a dropped notification just means
//! a reader falls back to its next poll tick, which is why correctness can
//! never depend on this channel arriving.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::Error;

const CHANNEL_CAPACITY: usize = 1024;

/// Run the fanout proxy: publishers connect to `pub_addr` and send one
/// queue path per line; every subscriber connected to `sub_addr` receives
/// every line published for as long as it stays connected.
pub async fn run_proxy(pub_addr: &str, sub_addr: &str) -> Result<(), Error> {
    let (tx, _rx) = broadcast::channel::<String>(CHANNEL_CAPACITY);

    let sub_listener = TcpListener::bind(sub_addr).await.map_err(infra)?;
    let pub_listener = TcpListener::bind(pub_addr).await.map_err(infra)?;
    info!(pub_addr, sub_addr, "notification proxy listening");

    let sub_tx = tx.clone();
    let subscribers = tokio::spawn(async move {
        loop {
            match sub_listener.accept().await {
                Ok((socket, peer)) => {
                    debug!(%peer, "subscriber connected");
                    let rx = sub_tx.subscribe();
                    tokio::spawn(serve_subscriber(socket, rx));
                }
                Err(e) => warn!(error = %e, "failed to accept subscriber connection"),
            }
        }
    });

    let publishers = tokio::spawn(async move {
        loop {
            match pub_listener.accept().await {
                Ok((socket, peer)) => {
                    debug!(%peer, "publisher connected");
                    tokio::spawn(serve_publisher(socket, tx.clone()));
                }
                Err(e) => warn!(error = %e, "failed to accept publisher connection"),
            }
        }
    });

    let _ = tokio::join!(subscribers, publishers);
    Ok(())
}

async fn serve_publisher(socket: TcpStream, tx: broadcast::Sender<String>) {
    let mut lines = BufReader::new(socket).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let _ = tx.send(line);
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "publisher connection error");
                return;
            }
        }
    }
}

async fn serve_subscriber(mut socket: TcpStream, mut rx: broadcast::Receiver<String>) {
    loop {
        match rx.recv().await {
            Ok(line) => {
                if socket.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged behind notification fanout");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// A thin client a publisher (e.g. a queue's `push`) could use to hint a
/// path just received an item. Not wired into `Queue` itself: the poll loop
/// stays the source of truth, and this is purely an optional latency win.
pub struct NotifyPublisher {
    stream: TcpStream,
}

impl NotifyPublisher {
    pub async fn connect(pub_addr: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(pub_addr).await.map_err(infra)?;
        Ok(NotifyPublisher { stream })
    }

    pub async fn publish(&mut self, queue_path: &str) -> Result<(), Error> {
        self.stream.write_all(format!("{queue_path}\n").as_bytes()).await.map_err(infra)
    }
}

fn infra(e: std::io::Error) -> Error {
    Error::Infra(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn a_publish_is_fanned_out_to_every_connected_subscriber() {
        let pub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let pub_addr = pub_listener.local_addr().unwrap().to_string();
        let sub_addr = sub_listener.local_addr().unwrap().to_string();
        drop(pub_listener);
        drop(sub_listener);

        let proxy = tokio::spawn({
            let pub_addr = pub_addr.clone();
            let sub_addr = sub_addr.clone();
            async move {
                let _ = run_proxy(&pub_addr, &sub_addr).await;
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let sub_socket = TcpStream::connect(&sub_addr).await.unwrap();
        let mut sub_lines = BufReader::new(sub_socket).lines();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut publisher = NotifyPublisher::connect(&pub_addr).await.unwrap();
        publisher.publish("orders-pending").await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), sub_lines.next_line())
            .await
            .expect("subscriber received a line in time")
            .unwrap()
            .unwrap();
        assert_eq!(received, "orders-pending");

        proxy.abort();
    }
}
