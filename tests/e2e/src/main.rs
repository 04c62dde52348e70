fn main() {
    println!("Run `cargo test -p splitfetch-e2e` to execute the loopback round-trip tests.");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::sync::CancellationToken;

    use splitfetch_client::{
        DownloadConfig, DownloadError, Downloader, MergeError, PartStore, WorkerConfig,
        reassemble,
    };
    use splitfetch_protocol::RetryPolicy;
    use splitfetch_server::{Dispatcher, ServerConfig};

    struct Server {
        addr: SocketAddr,
        cancel: CancellationToken,
    }

    impl Drop for Server {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    async fn start_server(config: ServerConfig) -> Server {
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(config, cancel.clone());
        let listener = dispatcher.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { dispatcher.serve(listener).await });
        Server { addr, cancel }
    }

    fn client_config(output: &Path, workers: u32) -> DownloadConfig {
        DownloadConfig {
            workers,
            max_concurrent: 0,
            stagger: Duration::ZERO,
            output_dir: output.to_path_buf(),
            worker: WorkerConfig {
                connect_retry: RetryPolicy::immediate(2),
                ..WorkerConfig::default()
            },
        }
    }

    /// Deterministic, non-repeating-per-block content.
    fn content(size: usize) -> Vec<u8> {
        (0..size)
            .map(|i| ((i as u64).wrapping_mul(2_654_435_761) >> 7) as u8)
            .collect()
    }

    fn write_source(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    async fn download(
        server: &Server,
        output: &Path,
        workers: u32,
        source: &Path,
    ) -> Result<splitfetch_client::DownloadReport, DownloadError> {
        Downloader::new(client_config(output, workers))
            .download(
                &server.addr.to_string(),
                &source.to_string_lossy(),
                CancellationToken::new(),
            )
            .await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn round_trip_matrix() {
        let src_dir = tempfile::tempdir().unwrap();
        let server = start_server(ServerConfig::loopback()).await;

        for size in [0usize, 1, 8191, 8192, 1_000_003] {
            let data = content(size);
            let source = write_source(src_dir.path(), &format!("blob-{size}.bin"), &data);

            for workers in [1u32, 3, 8] {
                let out_dir = tempfile::tempdir().unwrap();
                let report = download(&server, out_dir.path(), workers, &source)
                    .await
                    .unwrap_or_else(|e| panic!("size {size}, workers {workers}: {e}"));

                assert_eq!(report.bytes, size as u64, "size {size}, workers {workers}");
                assert_eq!(report.workers.len(), workers as usize);
                let received = std::fs::read(&report.path).unwrap();
                assert!(received == data, "content differs: size {size}, workers {workers}");

                let leftovers: Vec<_> = std::fs::read_dir(out_dir.path())
                    .unwrap()
                    .map(|e| e.unwrap().file_name())
                    .filter(|n| n.to_string_lossy().contains(".part"))
                    .collect();
                assert!(leftovers.is_empty(), "parts left behind: {leftovers:?}");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_request_then_download() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let data = content(20_000);
        let source = write_source(src_dir.path(), "file.dat", &data);
        let server = start_server(ServerConfig::loopback()).await;

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream.write_all(b"abc,def,file").await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());

        let report = download(&server, out_dir.path(), 4, &source).await.unwrap();
        assert_eq!(std::fs::read(report.path).unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bounded_pools_on_both_sides() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let data = content(123_457);
        let source = write_source(src_dir.path(), "file.dat", &data);
        let server = start_server(ServerConfig {
            max_connections: 2,
            ..ServerConfig::loopback()
        })
        .await;

        let config = DownloadConfig {
            max_concurrent: 3,
            ..client_config(out_dir.path(), 10)
        };
        let report = Downloader::new(config)
            .download(
                &server.addr.to_string(),
                &source.to_string_lossy(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(report.path).unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn more_workers_than_server_slots() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let big = write_source(src_dir.path(), "big.bin", &vec![1u8; 32 << 20]);
        let data = content(50_000);
        let source = write_source(src_dir.path(), "file.dat", &data);
        let server = start_server(ServerConfig {
            max_connections: 1,
            send_timeout: Duration::from_millis(50),
            stall_limit: Duration::from_millis(500),
            ..ServerConfig::loopback()
        })
        .await;

        // A reader that never reads holds the only slot until the server
        // gives up on it.
        let mut hog = TcpStream::connect(server.addr).await.unwrap();
        hog.write_all(format!("0,1,{}", big.display()).as_bytes())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Short per-read budget: queueing for the slot must not consume it.
        let mut config = client_config(out_dir.path(), 6);
        config.worker.read_timeout = Duration::from_millis(100);
        config.worker.read_retry = RetryPolicy::immediate(3);

        let report = Downloader::new(config)
            .download(
                &server.addr.to_string(),
                &source.to_string_lossy(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(report.path).unwrap(), data);
        drop(hog);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_remote_file_fails_download() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let server = start_server(ServerConfig::loopback()).await;

        let err = download(&server, out_dir.path(), 3, &src_dir.path().join("absent.bin"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Merge {
                source: MergeError::MissingPart { .. },
                ..
            }
        ));
        assert_eq!(err.failures().len(), 3);
        assert!(!out_dir.path().join("absent.bin").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_file_server_refuses_other_files() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let served = write_source(src_dir.path(), "served.bin", &content(100));
        let other = write_source(src_dir.path(), "other.bin", &content(100));
        let server = start_server(ServerConfig {
            file: Some(served.clone()),
            ..ServerConfig::loopback()
        })
        .await;

        assert!(download(&server, out_dir.path(), 2, &other).await.is_err());
        assert!(download(&server, out_dir.path(), 2, &served).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reassembly_rerun_keeps_downloaded_file() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let data = content(9_000);
        let source = write_source(src_dir.path(), "file.dat", &data);
        let server = start_server(ServerConfig::loopback()).await;

        let report = download(&server, out_dir.path(), 3, &source).await.unwrap();

        let store = PartStore::new(out_dir.path());
        let rerun = reassemble(&store, "file.dat", 3, Some(data.len() as u64)).await;
        assert!(matches!(rerun, Err(MergeError::MissingPart { index: 0, .. })));
        assert_eq!(std::fs::read(report.path).unwrap(), data);
    }
}
