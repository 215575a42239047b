//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 多源对齐与节拍场景
//! - 故障源 (卡住、断开、重连) 场景
//! - 输出通道背压场景
//! - 配置文件到采集的端到端测试

#[cfg(test)]
mod support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use capture::MockBackend;
    use contracts::{
        CaptureEvent, ContractError, EventSink, ImageData, StreamBackend, StreamConnection,
    };
    use observability::CollectingSink;

    /// Mock backend whose connections for `broken` panic when decoding.
    pub struct PanicOnMaterialize {
        pub inner: MockBackend,
        pub broken: &'static str,
    }

    impl StreamBackend for PanicOnMaterialize {
        fn name(&self) -> &str {
            "panic-on-materialize"
        }

        fn open(&self, address: &str) -> Result<Box<dyn StreamConnection>, ContractError> {
            let connection = self.inner.open(address)?;
            if address == self.broken {
                Ok(Box::new(Exploding(connection)))
            } else {
                Ok(connection)
            }
        }
    }

    struct Exploding(Box<dyn StreamConnection>);

    impl StreamConnection for Exploding {
        fn advance(&mut self) -> bool {
            self.0.advance()
        }

        fn materialize(&mut self) -> Option<ImageData> {
            panic!("decoder crashed");
        }

        fn close(&mut self) {
            self.0.close();
        }
    }

    /// Collects events; the first `OutputChannelFull` stalls the reporting
    /// thread for `stall`.
    pub struct StallOnFirstFull {
        pub events: CollectingSink,
        pub stall: Duration,
        stalled: AtomicBool,
    }

    impl StallOnFirstFull {
        pub fn new(stall: Duration) -> Self {
            Self {
                events: CollectingSink::new(),
                stall,
                stalled: AtomicBool::new(false),
            }
        }
    }

    impl EventSink for StallOnFirstFull {
        fn report(&self, event: CaptureEvent) {
            let first_full = matches!(event, CaptureEvent::OutputChannelFull { .. })
                && !self.stalled.swap(true, Ordering::SeqCst);
            self.events.report(event);
            if first_full {
                thread::sleep(self.stall);
            }
        }
    }
}

#[cfg(test)]
mod alignment_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use capture::MockBackend;
    use contracts::{CaptureConfig, NullSink};
    use sync_engine::Coordinator;

    /// 每个 Batch 的第 i 项恒来自第 i 个源，序号连续递增
    #[test]
    fn test_positional_alignment_over_many_cycles() {
        let backend = Arc::new(MockBackend::new());
        // Sources run at different speeds; order must not depend on it.
        backend.control("d").set_advance_delay(Duration::from_millis(7));
        backend.control("b").set_advance_delay(Duration::from_micros(200));

        let config = CaptureConfig::new(["d", "b", "a", "c"], 50);
        let mut coordinator = Coordinator::new(&config, backend, Arc::new(NullSink)).unwrap();
        coordinator.start().unwrap();

        let mut last_sequence = 0;
        for _ in 0..20 {
            let batch = coordinator
                .next_batch_timeout(Duration::from_secs(2))
                .expect("batch within two seconds");
            let ids: Vec<&str> = batch.iter().map(|r| r.source_id().as_str()).collect();
            assert_eq!(ids, ["d", "b", "a", "c"]);
            assert_eq!(batch.sequence, last_sequence + 1);
            last_sequence = batch.sequence;
        }

        coordinator.stop();
        assert_eq!(coordinator.stats().snapshot().batches_dropped, 0);
    }

    #[test]
    fn test_healthy_sources_deliver_distinct_frames() {
        let backend = Arc::new(MockBackend::new());
        let config = CaptureConfig::new(["a", "b"], 20);
        let mut coordinator = Coordinator::new(&config, backend, Arc::new(NullSink)).unwrap();
        coordinator.start().unwrap();

        // Skip the first batch: actors may not have advanced yet.
        coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        let first = coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        let second = coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        coordinator.stop();

        assert_eq!(first.success_count(), 2);
        assert_eq!(second.success_count(), 2);
        // Streams kept advancing between the two cycles.
        let frame_tag = |batch: &contracts::Batch| batch.frames[0].payload().unwrap().data[0];
        assert_ne!(frame_tag(&first), frame_tag(&second));
    }

    /// 独立消费线程通过 batches() 取数，协调器停止后接收端结束
    #[test]
    fn test_consumer_thread_receives_until_stop() {
        let config = CaptureConfig::new(["a", "b"], 50);
        let mut coordinator =
            Coordinator::new(&config, Arc::new(MockBackend::new()), Arc::new(NullSink)).unwrap();
        let batches = coordinator.batches();
        coordinator.start().unwrap();

        let consumer = thread::spawn(move || {
            let mut sequences = Vec::new();
            while let Ok(batch) = batches.recv() {
                assert_eq!(batch.len(), 2);
                sequences.push(batch.sequence);
            }
            sequences
        });

        thread::sleep(Duration::from_millis(300));
        coordinator.stop();

        let sequences = consumer.join().unwrap();
        assert!(sequences.len() >= 5, "only {} batches", sequences.len());
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }
}

#[cfg(test)]
mod fault_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use capture::{MockBackend, SyntheticBackend};
    use contracts::{CaptureConfig, CaptureEvent, FailureKind, LifecycleState};
    use observability::CollectingSink;
    use sync_engine::Coordinator;

    use crate::support::PanicOnMaterialize;

    /// 采集线程崩溃是致命错误：协调器停止并释放所有源
    #[test]
    fn test_actor_crash_stops_everything() {
        let backend = Arc::new(PanicOnMaterialize {
            inner: MockBackend::new(),
            broken: "bad",
        });
        let good = backend.inner.control("good");
        let sink = Arc::new(CollectingSink::new());

        let config = CaptureConfig::new(["good", "bad"], 20);
        let mut coordinator = Coordinator::new(&config, backend.clone(), sink.clone()).unwrap();
        coordinator.start().unwrap();

        let start = Instant::now();
        while coordinator.state() != LifecycleState::Stopped {
            assert!(
                start.elapsed() < Duration::from_secs(3),
                "coordinator kept running after an actor crashed"
            );
            thread::sleep(Duration::from_millis(5));
        }

        // Drain whatever was published before the crash, then nothing more.
        while coordinator.next_batch_timeout(Duration::from_millis(50)).is_some() {}
        assert!(coordinator
            .next_batch_timeout(Duration::from_millis(100))
            .is_none());

        // Joins the driving thread, which has already dropped its actors.
        coordinator.stop();
        assert_eq!(sink.count("fatal"), 1);
        assert_eq!(good.live_connections(), 0);
        assert_eq!(coordinator.state(), LifecycleState::Stopped);
    }

    /// 地址无法打开只影响该源，不会拖垮协调器
    #[test]
    fn test_unopenable_synthetic_address_is_isolated() {
        let sink = Arc::new(CollectingSink::new());
        let config = CaptureConfig::new(
            [
                "synthetic://ok?width=4&height=4&fps=50",
                "synthetic://slow?fps=1e-19",
            ],
            10,
        );
        let mut coordinator =
            Coordinator::new(&config, Arc::new(SyntheticBackend::new()), sink.clone()).unwrap();
        coordinator.start().unwrap();

        let batch = coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        thread::sleep(Duration::from_millis(300));

        assert_eq!(coordinator.state(), LifecycleState::Running);
        assert_eq!(batch.frames[1].failure(), Some(FailureKind::Disconnected));
        assert_eq!(sink.count("fatal"), 0);
        assert!(sink.count("reconnection_failed") >= 1);
        coordinator.stop();
    }

    /// 卡住的源只影响自己那一项，其他源照常
    #[test]
    fn test_stuck_source_is_reported_missing() {
        let backend = Arc::new(MockBackend::new());
        backend
            .control("b")
            .set_materialize_delay(Duration::from_millis(500));
        let sink = Arc::new(CollectingSink::new());

        let config = CaptureConfig::new(["a", "b", "c"], 10);
        let mut coordinator = Coordinator::new(&config, backend, sink.clone()).unwrap();
        coordinator.start().unwrap();

        let batches: Vec<_> = (0..6)
            .map(|_| coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        coordinator.stop();

        for batch in &batches {
            assert_eq!(batch.len(), 3);
            assert!(!batch.frames[1].success(), "stuck source delivered a frame");
        }
        for batch in &batches[1..] {
            assert!(batch.frames[0].success());
            assert!(batch.frames[2].success());
            assert_eq!(batch.frames[1].failure(), Some(FailureKind::TimedOut));
        }

        let timeouts = sink.count("source_timeout");
        assert!(timeouts >= 5, "only {timeouts} timeouts reported");
        assert!(sink
            .events()
            .iter()
            .filter(|e| e.kind() == "source_timeout")
            .all(|e| e.source_id().map(|id| id.as_str()) == Some("b")));
    }

    /// 每周期收集耗时不超过 源数 x 单源超时
    #[test]
    fn test_cycle_is_bounded_by_collection_timeouts() {
        let backend = Arc::new(MockBackend::new());
        for id in ["a", "b", "c"] {
            backend
                .control(id)
                .set_materialize_delay(Duration::from_secs(1));
        }
        let sink = Arc::new(CollectingSink::new());

        let config = CaptureConfig::new(["a", "b", "c"], 5);
        let timeout = config.collect_timeout();
        let mut coordinator = Coordinator::new(&config, backend, sink.clone()).unwrap();
        coordinator.start().unwrap();

        let first = coordinator.next_batch_timeout(Duration::from_secs(3)).unwrap();
        coordinator.next_batch_timeout(Duration::from_secs(3)).unwrap();
        coordinator.stop();

        assert_eq!(first.success_count(), 0);
        let overruns: Vec<Duration> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                CaptureEvent::RateNotSustained { elapsed, .. } => Some(elapsed),
                _ => None,
            })
            .collect();
        // The first cycle may catch some actors before their first advance.
        let longest = overruns.iter().max().copied().unwrap_or_default();
        assert!(longest >= timeout * 3, "longest cycle {longest:?}");
        for elapsed in overruns {
            assert!(
                elapsed < timeout * 3 + Duration::from_millis(250),
                "cycle {elapsed:?} not bounded by the collection timeouts"
            );
        }
    }

    /// 初次打开失败的源在冷却期后重连成功
    #[test]
    fn test_reconnect_after_failed_initial_open() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control("b");
        control.set_open_ok(false);
        let sink = Arc::new(CollectingSink::new());

        let mut config = CaptureConfig::new(["a", "b"], 20);
        config.reconnect_cooldown_ms = 50;
        let mut coordinator = Coordinator::new(&config, backend.clone(), sink.clone()).unwrap();
        coordinator.start().unwrap();

        // Disconnected while the address refuses to open.
        let batch = coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(batch.frames[1].failure(), Some(FailureKind::Disconnected));

        thread::sleep(Duration::from_millis(200));
        control.set_open_ok(true);

        let start = Instant::now();
        let mut recovered = false;
        while start.elapsed() < Duration::from_secs(3) {
            if let Some(batch) = coordinator.next_batch_timeout(Duration::from_secs(1)) {
                if batch.frames[1].success() {
                    recovered = true;
                    break;
                }
            }
        }
        coordinator.stop();

        assert!(recovered, "source b never recovered");
        assert!(sink.count("reconnection_failed") >= 2);
        assert_eq!(sink.count("reconnected"), 1);
        assert!(control.opens() >= 3);
        assert_eq!(control.live_connections(), 0);
    }

    /// 持续读失败的源在达到阈值后重连，之后恢复出帧 (时间按比例缩短)
    #[test]
    fn test_failing_source_reconnects_after_threshold() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control("cam");
        control.set_advance_ok(false);
        let sink = Arc::new(CollectingSink::new());

        // threshold = 1 x 20 = 20 failures, one per period: about one second,
        // half the cooldown.
        let mut config = CaptureConfig::new(["cam"], 20);
        config.failure_threshold_multiplier = 1;
        config.reconnect_cooldown_ms = 2_000;
        let threshold = u64::from(config.failure_threshold());
        let mut coordinator = Coordinator::new(&config, backend.clone(), sink.clone()).unwrap();
        coordinator.start().unwrap();

        let start = Instant::now();
        while control.opens() < 2 {
            assert!(
                start.elapsed() < Duration::from_millis(1_900),
                "reconnection held back by the cooldown"
            );
            thread::sleep(Duration::from_millis(2));
        }
        // The reopened stream is healthy.
        control.set_advance_ok(true);
        assert!(control.failed_advances() >= threshold);
        assert!(start.elapsed() >= Duration::from_millis(800));

        let mut recovered = false;
        while start.elapsed() < Duration::from_secs(8) {
            if let Some(batch) = coordinator.next_batch_timeout(Duration::from_millis(200)) {
                if batch.frames[0].success() {
                    recovered = true;
                    break;
                }
            }
        }
        coordinator.stop();

        assert!(recovered, "no successful frame after reconnection");
        assert_eq!(sink.count("connection_lost"), 1);
        assert!(sink.count("reconnected") >= 1);
    }
}

#[cfg(test)]
mod reconnect_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use capture::{ActorSettings, MockBackend, ReconnectPolicy, SourceActor};
    use contracts::SourceId;
    use observability::CollectingSink;

    fn settings(threshold: u32) -> ActorSettings {
        ActorSettings {
            failure_threshold: threshold,
            reconnect_cooldown: Duration::ZERO,
            failure_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_policy_threshold_boundary() {
        let start = Instant::now();
        let mut policy = ReconnectPolicy::new(3, Duration::from_secs(30));
        let now = start + Duration::from_secs(1);

        assert!(!policy.record_failure());
        assert!(!policy.record_failure());
        assert!(!policy.should_reconnect(now));
        assert!(policy.record_failure());
        assert!(policy.should_reconnect(now));

        policy.record_attempt(now);
        // Still inside the cooldown.
        assert!(!policy.should_reconnect(now + Duration::from_secs(30)));
        assert!(policy.should_reconnect(now + Duration::from_secs(31)));
    }

    #[test]
    fn test_failures_below_threshold_keep_connection() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control("cam");
        control.set_advance_ok(false);
        let sink = Arc::new(CollectingSink::new());

        let actor = SourceActor::spawn(
            SourceId::new("cam"),
            "cam",
            backend,
            settings(100_000),
            sink.clone(),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        drop(actor);

        assert!(control.failed_advances() > 5);
        assert_eq!(control.opens(), 1);
        assert_eq!(sink.count("connection_lost"), 0);
    }

    #[test]
    fn test_threshold_reached_reconnects() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control("cam");
        control.set_advance_ok(false);
        let sink = Arc::new(CollectingSink::new());

        let actor =
            SourceActor::spawn(SourceId::new("cam"), "cam", backend, settings(5), sink.clone())
                .unwrap();
        thread::sleep(Duration::from_millis(200));
        drop(actor);

        assert!(control.opens() >= 2, "no reconnection after threshold");
        assert!(sink.count("connection_lost") >= 1);
        assert!(sink.count("reconnected") >= 1);
        assert_eq!(control.live_connections(), 0);
    }
}

#[cfg(test)]
mod backpressure_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use capture::MockBackend;
    use contracts::{CaptureConfig, CaptureEvent, DroppedBatch, OverflowPolicy};
    use observability::CollectingSink;
    use sync_engine::Coordinator;

    use crate::support::StallOnFirstFull;

    /// 消费者不读时协调器不阻塞，停止也不死锁
    #[test]
    fn test_unread_output_never_blocks() {
        for policy in [OverflowPolicy::DropNewest, OverflowPolicy::DropOldest] {
            let sink = Arc::new(CollectingSink::new());
            let mut config = CaptureConfig::new(["a", "b", "c"], 50);
            config.overflow_policy = policy;
            let mut coordinator =
                Coordinator::new(&config, Arc::new(MockBackend::new()), sink.clone()).unwrap();
            coordinator.start().unwrap();

            thread::sleep(Duration::from_millis(500));
            let cycles_before = coordinator.stats().snapshot().cycles;
            assert!(cycles_before > 15, "{policy:?}: only {cycles_before} cycles");

            let stop_started = Instant::now();
            coordinator.stop();
            assert!(stop_started.elapsed() < Duration::from_secs(1));

            let stats = coordinator.stats().snapshot();
            assert!(stats.batches_dropped > 0);
            let expected = match policy {
                OverflowPolicy::DropNewest => DroppedBatch::Newest,
                OverflowPolicy::DropOldest => DroppedBatch::Oldest,
            };
            assert!(sink.events().iter().any(|e| matches!(
                e,
                CaptureEvent::OutputChannelFull { capacity: 10, dropped, .. } if *dropped == expected
            )));
        }
    }

    /// 一次超时周期只报告一次 RateNotSustained，之后节拍恢复
    #[test]
    fn test_single_slow_cycle_reports_once() {
        let sink = Arc::new(StallOnFirstFull::new(Duration::from_millis(500)));
        let mut config = CaptureConfig::new(["a"], 10);
        config.output_capacity = 1;
        let mut coordinator =
            Coordinator::new(&config, Arc::new(MockBackend::new()), sink.clone()).unwrap();
        coordinator.start().unwrap();

        thread::sleep(Duration::from_millis(1200));
        coordinator.stop();

        let overruns: Vec<CaptureEvent> = sink
            .events
            .events()
            .into_iter()
            .filter(|e| e.kind() == "rate_not_sustained")
            .collect();
        assert_eq!(overruns.len(), 1, "got {overruns:?}");
        match &overruns[0] {
            CaptureEvent::RateNotSustained {
                sequence,
                period,
                elapsed,
            } => {
                assert_eq!(*sequence, 2);
                assert_eq!(*period, Duration::from_millis(100));
                assert!(*elapsed >= sink.stall);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(coordinator.stats().snapshot().cycles >= 5);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use capture::SyntheticBackend;
    use config_loader::ConfigLoader;
    use contracts::FailureKind;
    use observability::CollectingSink;
    use sync_engine::Coordinator;

    const CONFIG: &str = r#"
frame_rate = 10
reconnect_cooldown_ms = 60000

[[sources]]
id = "left"
address = "synthetic://left?width=32&height=24&fps=50"

[[sources]]
id = "right"
address = "synthetic://right?width=16&height=16&fps=50"

[[sources]]
id = "dead"
address = "synthetic://dead?offline=true"
"#;

    /// 配置文件 -> Coordinator -> Batch
    #[test]
    fn test_config_file_to_batches() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = ConfigLoader::load_from_path(file.path()).unwrap();

        let sink = Arc::new(CollectingSink::new());
        let mut coordinator =
            Coordinator::new(&config, Arc::new(SyntheticBackend::new()), sink.clone()).unwrap();
        coordinator.start().unwrap();

        coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        let batch = coordinator.next_batch_timeout(Duration::from_secs(2)).unwrap();
        coordinator.stop();

        let ids: Vec<&str> = batch.iter().map(|r| r.source_id().as_str()).collect();
        assert_eq!(ids, ["left", "right", "dead"]);

        let left = batch.frames[0].payload().unwrap();
        assert_eq!((left.width, left.height), (32, 24));
        assert_eq!(left.data.len(), left.expected_len());
        assert!(batch.frames[1].success());
        assert_eq!(batch.frames[2].failure(), Some(FailureKind::Disconnected));
        assert_eq!(batch.missing_sources(), ["dead"]);
        assert_eq!(sink.count("reconnection_failed"), 1);
    }
}
