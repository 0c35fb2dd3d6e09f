use fleet_core::wire::{Framing, StreamFrameDecoder, DEFAULT_MAX_FRAME_BYTES};
use std::{io, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::TcpStream,
    sync::mpsc,
};
use tracing::{info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of the delta stream, as seen by the session driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened,
    Message(String),
    /// `recovering` is false once the loop has given up reconnecting.
    Error { recovering: bool },
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub addr: String,
    pub framing: Framing,
    /// Consecutive failed connects tolerated before giving up.
    pub retries: u32,
}

/// Connect, forward every message line, and reconnect with backoff after a
/// drop. Returns after reporting a final unrecoverable error, or once the
/// receiver is gone.
pub async fn stream_loop(config: StreamConfig, tx: mpsc::Sender<StreamEvent>) {
    let mut backoff = INITIAL_BACKOFF;
    let mut failures = 0u32;

    loop {
        let stream = match TcpStream::connect(&config.addr).await {
            Ok(stream) => stream,
            Err(err) => {
                failures += 1;
                warn!(event = "stream_connect_error", addr = %config.addr, failures, error = %err);
                let recovering = failures <= config.retries;
                if tx.send(StreamEvent::Error { recovering }).await.is_err() || !recovering {
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        failures = 0;
        backoff = INITIAL_BACKOFF;
        info!(event = "stream_connected", addr = %config.addr);
        if tx.send(StreamEvent::Opened).await.is_err() {
            return;
        }

        match forward_lines(stream, config.framing, &tx).await {
            Ok(true) => warn!(event = "stream_closed", addr = %config.addr),
            Ok(false) => return,
            Err(err) => warn!(event = "stream_read_error", addr = %config.addr, error = %err),
        }
        if tx.send(StreamEvent::Error { recovering: true }).await.is_err() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

/// Read until EOF, sending each decoded line. `Ok(false)` means the
/// receiver went away.
async fn forward_lines<R>(
    mut reader: R,
    framing: Framing,
    tx: &mpsc::Sender<StreamEvent>,
) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = StreamFrameDecoder::new(framing, DEFAULT_MAX_FRAME_BYTES);
    let mut read_buf = [0u8; 8192];
    loop {
        let read = reader.read(&mut read_buf).await?;
        let report = if read == 0 {
            decoder.finish()
        } else {
            decoder.push_chunk(&read_buf[..read])
        };
        for err in report.errors {
            warn!(event = "stream_decode_error", error = %err);
        }
        for line in report.lines {
            if tx.send(StreamEvent::Message(line)).await.is_err() {
                return Ok(false);
            }
        }
        if read == 0 {
            return Ok(true);
        }
    }
}

pub fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    #[test]
    fn backoff_doubles_up_to_ten_seconds() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(4)), Duration::from_secs(8));
        assert_eq!(next_backoff(Duration::from_secs(8)), Duration::from_secs(10));
        assert_eq!(next_backoff(Duration::from_secs(10)), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn forwards_lines_split_across_chunks() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(16);
        let pump = tokio::spawn(async move { forward_lines(reader, Framing::Lines, &tx).await });

        writer.write_all(b"CREATE WORKER n1 {\"thr").await.expect("write");
        writer.write_all(b"eads\": 4}\r\nDATE _ 17").await.expect("write");
        writer.write_all(b"00000000").await.expect("write");
        drop(writer);

        assert!(pump.await.expect("join").expect("read"));
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Message("CREATE WORKER n1 {\"threads\": 4}".to_string()))
        );
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Message("DATE _ 1700000000".to_string()))
        );
    }

    #[tokio::test]
    async fn event_stream_framing_strips_data_fields() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::channel(16);
        let pump =
            tokio::spawn(async move { forward_lines(reader, Framing::EventStream, &tx).await });

        writer
            .write_all(b": keepalive\nretry: 3000\ndata: DELETE WORKUNIT w1 FINISHED\n\n")
            .await
            .expect("write");
        drop(writer);

        assert!(pump.await.expect("join").expect("read"));
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Message("DELETE WORKUNIT w1 FINISHED".to_string()))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_loop_reports_open_messages_and_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket
                .write_all(b"CREATE WORKER n1 {\"threads\": 2}\n")
                .await
                .expect("write");
        });

        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(stream_loop(
            StreamConfig {
                addr,
                framing: Framing::Lines,
                retries: 0,
            },
            tx,
        ));

        assert_eq!(rx.recv().await, Some(StreamEvent::Opened));
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Message("CREATE WORKER n1 {\"threads\": 2}".to_string()))
        );
        assert_eq!(rx.recv().await, Some(StreamEvent::Error { recovering: true }));
        server.await.expect("server");
        task.abort();
    }

    #[tokio::test]
    async fn gives_up_after_retries_are_exhausted() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr").to_string()
        };
        let (tx, mut rx) = mpsc::channel(4);
        stream_loop(
            StreamConfig {
                addr,
                framing: Framing::Lines,
                retries: 0,
            },
            tx,
        )
        .await;
        assert_eq!(rx.recv().await, Some(StreamEvent::Error { recovering: false }));
        assert_eq!(rx.recv().await, None);
    }
}
