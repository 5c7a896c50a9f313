use lineport::domain::config::TransferConfig;
use lineport::{ChannelObserver, LinePort, LinePortError, MemoryDevice, NullObserver, PortEventKind};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

/// End-to-end tests of the port controller against a simulated device
#[cfg(test)]
mod integration_tests {
    use super::*;

    fn port_on(device: &MemoryDevice) -> LinePort {
        LinePort::builder()
            .opener(Arc::new(device.clone()))
            .observer(Arc::new(NullObserver))
            .build()
    }

    async fn open_port(device: &MemoryDevice) -> LinePort {
        let port = port_on(device);
        port.open("sim", 115200, None).await.expect("Failed to open port");
        port
    }

    /// Poll `condition` until it holds, failing the test after two seconds
    async fn eventually(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Condition not reached in time");
    }

    #[tokio::test]
    async fn test_read_line_strips_line_endings() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        device.send("AT\r\nOK\n");
        assert_eq!(port.read_line().await.unwrap(), "AT");
        assert_eq!(port.read_line().await.unwrap(), "OK");
        assert_eq!(port.available(), 0);

        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        assert_ok!(port.close().await);
        assert_ok!(port.close().await);
        assert!(!port.is_open());
        assert_err!(port.write(b"AT").await);
        assert_eq!(device.reads_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_open_twice_keeps_first_session() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        let err = port.open("other", 9600, None).await.unwrap_err();
        assert!(matches!(err, LinePortError::AlreadyOpen { .. }));
        assert_eq!(port.name().as_deref(), Some("sim"));
        assert_eq!(port.baud(), Some(115200));
        assert_eq!(device.open_count(), 1);

        device.send("still here\n");
        assert_eq!(port.read_line().await.unwrap(), "still here");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_failure_leaves_port_closed() {
        let device = MemoryDevice::new();
        device.refuse_open(true);
        let port = port_on(&device);

        let err = port.open("/dev/missing", 9600, None).await.unwrap_err();
        assert!(matches!(err, LinePortError::TransportOpenFailed { ref name, .. } if name == "/dev/missing"));
        assert!(!port.is_open());

        device.refuse_open(false);
        port.open("/dev/missing", 9600, None).await.unwrap();
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pattern_timeout_leaves_no_residual_reader() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        let err = port
            .wait_for_regex_timeout("OK", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LinePortError::Timeout { .. }));
        assert!(err.is_recoverable());

        // A leftover search task would swallow this line
        device.send("OK\n");
        assert_eq!(port.read_line().await.unwrap(), "OK");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pattern_skips_non_matching_lines() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        device.send("READY\nOK DONE\n");
        let matched = port
            .wait_for_regex_timeout("OK.*", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(matched, "OK DONE");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pattern_returns_leftmost_match_only() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        device.send("+CSQ: 17,99 then +CSQ: 3,0\n");
        let matched = port
            .wait_for_regex_timeout(r"\+CSQ: \d+,\d+", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(matched, "+CSQ: 17,99");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails_before_waiting() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        let err = port
            .wait_for_regex_timeout("(unclosed", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LinePortError::InvalidPattern(_)));
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_on_empty_buffer() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        assert!(matches!(port.read().await, Err(LinePortError::BufferEmpty)));

        device.send("Z");
        eventually(|| port.available() == 1).await;
        assert_eq!(port.read().await.unwrap(), b'Z');
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_line_timeout_returns_partial_without_consuming() {
        let device = MemoryDevice::new();
        let port = port_on(&device);
        port.open("sim", 9600, Some(Duration::from_millis(50))).await.unwrap();

        device.send("PART");
        eventually(|| port.available() == 4).await;

        assert_eq!(port.read_line().await.unwrap(), "PART");
        assert_eq!(port.available(), 4);

        device.send("IAL\n");
        assert_eq!(port.read_line().await.unwrap(), "PARTIAL");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_read_timeout_reads_lines() {
        let device = MemoryDevice::new();
        let port = port_on(&device);
        port.open("sim", 9600, Some(Duration::MAX)).await.unwrap();

        device.send("OK\n");
        let reader = {
            let port = port.clone();
            tokio::spawn(async move { port.read_line().await })
        };
        let line = timeout(Duration::from_secs(1), reader)
            .await
            .expect("read_line did not return")
            .expect("read_line task failed")
            .unwrap();
        assert_eq!(line, "OK");

        device.send("+CSQ: 9,99\n");
        let matched = port
            .wait_for_regex_timeout(r"\d+,\d+", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(matched, "9,99");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_read_timeout_blocks_without_spinning() {
        let device = MemoryDevice::new();
        let port = port_on(&device);
        port.open("sim", 9600, Some(Duration::ZERO)).await.unwrap();

        let before = device.read_calls();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let idle_reads = device.read_calls() - before;
        assert!(idle_reads <= 10, "{} reads while idle", idle_reads);

        // A zero timeout waits for a complete line instead of returning partials
        device.send("PART");
        let waiting = {
            let port = port.clone();
            tokio::spawn(async move { port.read_line().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        device.send("IAL\n");
        let line = timeout(Duration::from_secs(1), waiting)
            .await
            .expect("read_line did not return")
            .unwrap()
            .unwrap();
        assert_eq!(line, "PARTIAL");

        let err = port
            .wait_for_regex_timeout("NEVER", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LinePortError::Timeout { .. }));
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_eol_change_reframes_unconsumed_bytes() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        port.set_eol(b';');
        device.send("a;b\nc;");
        eventually(|| port.available() == 6).await;

        assert_eq!(port.read_line().await.unwrap(), "a");
        port.set_eol(b'\n');
        assert_eq!(port.read_line().await.unwrap(), "b");
        port.set_eol(b';');
        assert_eq!(port.read_line().await.unwrap(), "c");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_tear_lines() {
        let device = MemoryDevice::echoing();
        let port = open_port(&device).await;

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let port = port.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        port.println(&format!("w{}-{}", w, i)).await.unwrap();
                    }
                })
            })
            .collect();

        let mut lines = Vec::new();
        while lines.len() < 80 {
            let line = port.read_line().await.unwrap();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        for writer in writers {
            writer.await.unwrap();
        }

        let pattern = regex::Regex::new(r"^w\d-\d$").unwrap();
        assert!(lines.iter().all(|line| pattern.is_match(line)), "torn line in {:?}", lines);

        // Each consumed line also carried the CR+LF that read_line strips
        let consumed: usize = lines.iter().map(|line| line.len() + 2).sum();
        eventually(|| device.pending() == 0).await;
        eventually(|| consumed + port.available() == device.produced()).await;
        assert_eq!(device.produced(), device.written().len());
        assert_eq!(port.available(), 0);
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_byte_lost_or_duplicated() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        let producer = {
            let device = device.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    device.send([0x55u8; 20]);
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };

        let mut consumed = 0;
        for _ in 0..200 {
            if port.read().await.is_ok() {
                consumed += 1;
            } else {
                tokio::task::yield_now().await;
            }
        }
        producer.join().unwrap();

        eventually(|| device.pending() == 0).await;
        eventually(|| consumed + port.available() == device.produced()).await;
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_fault_closes_session() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        device.fail_reads(io::ErrorKind::BrokenPipe);
        eventually(|| !port.is_open()).await;

        let err = port.read_line().await.unwrap_err();
        assert!(matches!(err, LinePortError::TransportIo { operation: "read", .. }));
        assert!(matches!(port.read_line().await, Err(LinePortError::NotOpen)));
        assert!(port.name().is_none());

        device.clear_fault();
        port.open("sim", 115200, None).await.unwrap();
        assert_eq!(device.open_count(), 2);
        device.send("back\n");
        assert_eq!(port.read_line().await.unwrap(), "back");
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_reaps_faulted_session() {
        let device = MemoryDevice::new();
        let port = open_port(&device).await;

        device.fail_reads(io::ErrorKind::BrokenPipe);
        eventually(|| !port.is_open()).await;
        device.clear_fault();

        port.open("sim", 115200, None).await.unwrap();
        assert!(port.is_open());
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_reader() {
        let device = MemoryDevice::new();
        let port = port_on(&device);
        port.open("sim", 9600, Some(Duration::from_secs(30))).await.unwrap();

        let waiting = {
            let port = port.clone();
            tokio::spawn(async move { port.read_line().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        port.close().await.unwrap();
        let result = timeout(Duration::from_secs(1), waiting)
            .await
            .expect("read_line did not return after close")
            .unwrap();
        assert!(matches!(result, Err(LinePortError::NotOpen)));
    }

    #[tokio::test]
    async fn test_send_file_in_chunks() {
        let device = MemoryDevice::new();
        let port = LinePort::builder()
            .opener(Arc::new(device.clone()))
            .observer(Arc::new(NullObserver))
            .transfer(TransferConfig {
                chunk_size: 4,
                chunk_delay_ms: 1,
            })
            .build();
        port.open("sim", 9600, None).await.unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"0123456789").unwrap();

        assert_eq!(port.send_file(file.path()).await.unwrap(), 10);
        assert_eq!(device.written(), b"0123456789");

        let missing = file.path().with_extension("missing");
        assert!(matches!(port.send_file(&missing).await, Err(LinePortError::InvalidInput(_))));
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_observer_sees_session_events() {
        let device = MemoryDevice::echoing();
        let (observer, mut events) = ChannelObserver::new();
        let port = LinePort::builder()
            .opener(Arc::new(device.clone()))
            .observer(Arc::new(observer))
            .build();

        port.open("sim", 9600, None).await.unwrap();
        port.println("AT").await.unwrap();
        assert_eq!(port.read_line().await.unwrap(), "AT");

        let mut kinds = Vec::new();
        timeout(Duration::from_secs(1), async {
            while let Some(event) = events.recv().await {
                assert_eq!(event.port, "sim");
                let framed = matches!(event.kind, PortEventKind::LineReceived(_));
                kinds.push(event.kind);
                if framed {
                    break;
                }
            }
        })
        .await
        .expect("Line was never reported");

        port.close().await.unwrap();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind);
        }

        // The echo can be framed before the write is reported
        assert_eq!(kinds.first(), Some(&PortEventKind::Opened { baud: 9600 }));
        assert_eq!(kinds.last(), Some(&PortEventKind::Closed));
        assert!(kinds.contains(&PortEventKind::Transmitted(b"AT\r\n".to_vec())));
        assert!(kinds.contains(&PortEventKind::LineReceived(b"AT\r\n".to_vec())));
        assert_eq!(kinds.len(), 4);
    }
}
