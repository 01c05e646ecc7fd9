fn main() {
    println!("Run `cargo test -p upload-flow` to execute the upload flow scenarios.");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use airlift_connectivity::{ConnState, ConnectivityMonitor};
    use airlift_core::{File, FileSource, MediaType, UploadError, UploadResult, UploadRoute};
    use airlift_queue::UploadManager;
    use airlift_uploader::Uploader;
    use bytes::Bytes;
    use tokio::sync::{broadcast, mpsc};
    use uuid::Uuid;

    const ENDPOINT: &str = "https://store.example.com";
    const BUCKET: &str = "attachments";

    /// Scripted object-storage stand-in.
    ///
    /// Files with a script replay their progress fractions and succeed,
    /// recording `endpoint/bucket/key` as the uploaded URL beforehand.
    /// Files without a script stay in flight until cancelled.
    struct StubStore {
        results: broadcast::Sender<UploadResult>,
        scripts: Mutex<HashMap<Uuid, Vec<f64>>>,
        cancels: Mutex<Vec<Uuid>>,
        next_task: AtomicU64,
    }

    impl StubStore {
        fn new() -> Arc<Self> {
            let (results, _) = broadcast::channel(256);
            Arc::new(Self {
                results,
                scripts: Mutex::new(HashMap::new()),
                cancels: Mutex::new(Vec::new()),
                next_task: AtomicU64::new(0),
            })
        }

        fn script(&self, file: &File, fractions: &[f64]) {
            self.scripts
                .lock()
                .unwrap()
                .insert(file.id(), fractions.to_vec());
        }

        fn cancelled_files(&self) -> Vec<Uuid> {
            self.cancels.lock().unwrap().clone()
        }

        fn start(&self, file: &File) {
            file.set_task_id(self.next_task.fetch_add(1, Ordering::Relaxed) + 1);
            let Some(fractions) = self.scripts.lock().unwrap().remove(&file.id()) else {
                return;
            };
            for fraction in fractions {
                let _ = self
                    .results
                    .send(UploadResult::Progress(file.clone(), fraction));
            }
            file.set_uploaded_url(format!("{ENDPOINT}/{BUCKET}/{}", file.key()));
            let _ = self.results.send(UploadResult::Success(file.clone()));
        }
    }

    impl Uploader for StubStore {
        fn subscribe(&self) -> broadcast::Receiver<UploadResult> {
            self.results.subscribe()
        }

        fn upload<'a>(
            &'a self,
            file: &'a File,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async move { self.start(file) })
        }

        fn upload_routed<'a>(
            &'a self,
            file: &'a File,
            _route: &'a UploadRoute,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async move { self.start(file) })
        }

        fn cancel<'a>(
            &'a self,
            file: &'a File,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                self.cancels.lock().unwrap().push(file.id());
            })
        }
    }

    fn data_file(stem: &str) -> File {
        File::new(
            stem,
            MediaType::Jpeg,
            FileSource::Data(Bytes::from_static(b"payload")),
        )
    }

    async fn recv_timeout(rx: &mut mpsc::Receiver<UploadResult>) -> UploadResult {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    /// Asserts that no further event arrives within a grace period.
    async fn assert_quiet(rx: &mut mpsc::Receiver<UploadResult>) {
        let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(extra.is_err(), "unexpected extra event: {extra:?}");
    }

    #[tokio::test]
    async fn data_upload_reports_progress_then_success_with_url() {
        let store = StubStore::new();
        let monitor = ConnectivityMonitor::default();
        let manager = UploadManager::new(store.clone(), monitor.watch());
        let mut events = manager.take_events().await.unwrap();

        let file = data_file("f1");
        store.script(&file, &[0.3]);
        manager.upload_file(file.clone());

        assert!(matches!(
            recv_timeout(&mut events).await,
            UploadResult::Progress(p, fraction) if p == file && fraction == 0.3
        ));
        match recv_timeout(&mut events).await {
            UploadResult::Success(done) => {
                assert_eq!(done, file);
                assert_eq!(
                    done.uploaded_url().as_deref(),
                    Some(format!("{ENDPOINT}/{BUCKET}/{}", file.key()).as_str())
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn offline_submission_yields_exactly_one_failure() {
        let store = StubStore::new();
        let monitor = ConnectivityMonitor::new(ConnState::NotConnected);
        let manager = UploadManager::new(store.clone(), monitor.watch());
        let mut events = manager.take_events().await.unwrap();

        let file = data_file("f2");
        store.script(&file, &[0.5]);
        manager.upload_file(file.clone());

        assert!(matches!(
            recv_timeout(&mut events).await,
            UploadResult::Failure(failed, UploadError::NoConnectivity) if failed == file
        ));
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn disconnect_mid_upload_cancels_and_discards_late_events() {
        let store = StubStore::new();
        let monitor = ConnectivityMonitor::default();
        let manager = UploadManager::new(store.clone(), monitor.watch());
        let mut events = manager.take_events().await.unwrap();

        // No script: the transfer stays in flight.
        let file = data_file("f3");
        manager.upload_file(file.clone());
        tokio::task::yield_now().await;

        monitor.set_connected(false);

        assert!(matches!(
            recv_timeout(&mut events).await,
            UploadResult::Failure(failed, UploadError::NoConnectivity) if failed == file
        ));
        assert!(store.cancelled_files().contains(&file.id()));

        // A late terminal event from the backend must be discarded.
        let _ = store.results.send(UploadResult::Success(file.clone()));
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn terminate_cancels_everything_without_further_pending() {
        let store = StubStore::new();
        let monitor = ConnectivityMonitor::default();
        let manager = UploadManager::new(store.clone(), monitor.watch());
        let mut events = manager.take_events().await.unwrap();

        let a = data_file("a");
        let b = data_file("b");
        manager.upload_file(a.clone());
        manager.upload_file(b.clone());
        tokio::task::yield_now().await;

        manager.terminate();

        let mut cancelled = Vec::new();
        for _ in 0..2 {
            match recv_timeout(&mut events).await {
                UploadResult::Cancelled(file) => cancelled.push(file.id()),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        cancelled.sort();
        let mut expected = vec![a.id(), b.id()];
        expected.sort();
        assert_eq!(cancelled, expected);
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn every_file_gets_exactly_one_terminal_event() {
        let store = StubStore::new();
        let monitor = ConnectivityMonitor::default();
        let manager = UploadManager::new(store.clone(), monitor.watch());
        let mut events = manager.take_events().await.unwrap();

        let files: Vec<File> = (0..5).map(|i| data_file(&format!("file{i}"))).collect();
        for file in &files {
            store.script(file, &[0.25, 0.75]);
            manager.upload_file(file.clone());
        }

        let mut terminals: HashMap<Uuid, usize> = HashMap::new();
        let mut seen = 0;
        while seen < files.len() {
            let event = recv_timeout(&mut events).await;
            if event.is_terminal() {
                *terminals.entry(event.file().id()).or_default() += 1;
                seen += 1;
            }
        }
        assert_quiet(&mut events).await;

        assert_eq!(terminals.len(), files.len());
        for file in &files {
            assert_eq!(terminals.get(&file.id()), Some(&1), "file {}", file.id());
        }
    }

    #[tokio::test]
    async fn progress_fractions_are_monotonic_within_bounds() {
        let store = StubStore::new();
        let monitor = ConnectivityMonitor::default();
        let manager = UploadManager::new(store.clone(), monitor.watch());
        let mut events = manager.take_events().await.unwrap();

        let file = data_file("steady");
        store.script(&file, &[0.0, 0.2, 0.2, 0.6, 1.0]);
        manager.upload_file(file.clone());

        let mut last = f64::MIN;
        loop {
            match recv_timeout(&mut events).await {
                UploadResult::Progress(_, fraction) => {
                    assert!((0.0..=1.0).contains(&fraction));
                    assert!(fraction >= last, "progress went backwards");
                    last = fraction;
                }
                UploadResult::Success(_) => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
