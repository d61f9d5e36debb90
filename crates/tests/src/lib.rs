//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Contract serialization snapshots
//! - Config file -> manager -> dispatch worker -> statistics
//! - The process-wide registry

#[cfg(test)]
mod contract_tests {
    use contracts::{BackpressureConfig, LoadState, Priority};

    #[test]
    fn test_contracts_compile() {
        assert_eq!(Priority::Critical.ordinal(), 1);
        assert_eq!(Priority::Background.ordinal(), 5);
        assert!(LoadState::Emergency > LoadState::Normal);
    }

    #[test]
    fn test_default_config_round_trips_through_both_formats() {
        let config = BackpressureConfig::default();

        let toml = config_loader::ConfigLoader::to_toml(&config).unwrap();
        let from_toml =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(from_toml.lanes, config.lanes);
        assert_eq!(from_toml.thresholds, config.thresholds);

        let json = config_loader::ConfigLoader::to_json(&config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["shedding"]["drop_high_on_emergency"], false);
        assert_eq!(value["lanes"]["critical"], 1000);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use backpressure::{BackpressureManager, Rejection};
    use bytes::Bytes;
    use contracts::{LoadState, Operation, Priority};

    const CONFIG: &str = r#"
max_ops_per_cycle = 5
cycle_timeout_ms = 1000

[thresholds]
warning = 0.7
critical = 0.85
emergency = 0.95

[shedding]
drop_low_on_warning = true
drop_medium_on_critical = true

[lanes]
critical = 10
high = 10
medium = 10
low = 10
background = 10

[timing]
idle_sleep_ms = 1
error_backoff_ms = 5
stop_timeout_ms = 500
"#;

    fn manager_from_file() -> BackpressureManager {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = config_loader::ConfigLoader::load_from_path(file.path()).unwrap();
        BackpressureManager::new(config).unwrap()
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// End-to-end: config file -> manager -> worker -> work units -> stats
    #[tokio::test]
    async fn test_e2e_dispatch_with_retries() {
        let manager = manager_from_file();
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(AtomicUsize::new(0));

        for i in 0..6u8 {
            let seen = Arc::clone(&payloads);
            let operation = Operation::new(format!("ok-{i}"), Priority::High, "echo", vec![i])
                .with_work(move |payload: Bytes| {
                    seen.lock().unwrap().push(payload[0]);
                    Ok(())
                });
            assert!(manager.submit(operation));
        }

        let counter = Arc::clone(&attempts);
        let flaky = Operation::new("flaky", Priority::Critical, "flaky", Bytes::new())
            .with_max_retries(2)
            .with_work(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("downstream unavailable")
            });
        assert!(manager.submit(flaky));

        manager.start().unwrap();
        wait_for(|| {
            manager.lane_depths().values().sum::<usize>() == 0
                && attempts.load(Ordering::SeqCst) == 3
        })
        .await;
        manager.stop().await;

        assert_eq!(*payloads.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let stats = manager.get_stats();
        assert_eq!(stats.processed_total, 6);
        assert_eq!(stats.retried_total, 2);
        assert_eq!(stats.retries_exhausted_total, 1);
        assert_eq!(stats.dropped_by_priority[&Priority::Critical], 1);
        assert!(stats.cycles_total >= 2);
        assert!(stats.max_cycle_ms >= stats.avg_cycle_ms);
        assert!(stats.p99_cycle_ms >= stats.p50_cycle_ms);
    }

    /// Load shedding end to end: WARNING sheds LOW, CRITICAL traffic always enters
    #[tokio::test]
    async fn test_e2e_shedding_and_recovery() {
        let manager = manager_from_file();
        let states = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&states);
        manager.add_state_callback(move |state| seen.lock().unwrap().push(state));

        // 36 of 50 slots: 72% utilization
        for priority in [Priority::High, Priority::Medium, Priority::Background] {
            for i in 0..10 {
                assert!(manager.submit(Operation::new(format!("{priority}-{i}"), priority, "fill", "")));
            }
        }
        for i in 0..6 {
            assert!(manager.submit(Operation::new(format!("low-{i}"), Priority::Low, "fill", "")));
        }
        assert_eq!(manager.refresh_load_state(), LoadState::Warning);

        assert!(matches!(
            manager.try_submit(Operation::new("low-shed", Priority::Low, "fill", "")),
            Err(Rejection::Shed { .. })
        ));
        assert!(manager.submit(Operation::new("crit", Priority::Critical, "fill", "")));

        let health = manager.get_health();
        assert!(health.healthy);
        assert!(health.drop_rate > 0.0);

        manager.start().unwrap();
        wait_for(|| manager.load_state() == LoadState::Normal).await;
        wait_for(|| manager.lane_depths().values().sum::<usize>() == 0).await;
        manager.stop().await;

        assert_eq!(*states.lock().unwrap(), vec![LoadState::Warning, LoadState::Normal]);
        assert!(manager.get_health().healthy);
        assert_eq!(manager.get_stats().backpressure_events, 1);
    }

    /// OS-thread producers racing a running worker keep every counter consistent
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_concurrent_producers() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 2000;

        let manager = Arc::new(manager_from_file());
        let executed = Arc::new(AtomicUsize::new(0));
        manager.start().unwrap();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|t| {
                let manager = Arc::clone(&manager);
                let executed = Arc::clone(&executed);
                std::thread::spawn(move || {
                    let mut accepted = 0u64;
                    for i in 0..PER_PRODUCER {
                        let priority = Priority::ALL[(t + i) % Priority::COUNT];
                        let counter = Arc::clone(&executed);
                        let operation = Operation::new(format!("{t}-{i}"), priority, "count", "")
                            .with_work(move |_| {
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            });
                        if manager.submit(operation) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let accepted = tokio::task::spawn_blocking(move || {
            producers
                .into_iter()
                .map(|producer| producer.join().unwrap())
                .sum::<u64>()
        })
        .await
        .unwrap();
        manager.stop().await;

        let offered = (PRODUCERS * PER_PRODUCER) as u64;
        let remaining = manager.lane_depths().values().sum::<usize>() as u64;
        let stats = manager.get_stats();

        assert!(accepted > 0);
        assert_eq!(stats.submitted_total, accepted);
        assert_eq!(stats.submitted_total + stats.dropped_total, offered);
        assert_eq!(stats.shed_total + stats.lane_full_total, stats.dropped_total);
        assert_eq!(stats.processed_total + remaining, accepted);
        assert_eq!(executed.load(Ordering::SeqCst) as u64, stats.processed_total);
        assert_eq!(stats.retried_total, 0);
    }

    #[tokio::test]
    async fn test_e2e_restart_resumes_dispatch() {
        let manager = Arc::new(manager_from_file());
        let done = Arc::new(AtomicUsize::new(0));

        for round in 0..3 {
            manager.start().unwrap();
            let counter = Arc::clone(&done);
            assert!(manager.submit(
                Operation::new(format!("round-{round}"), Priority::Medium, "count", "")
                    .with_work(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
            ));
            wait_for(|| done.load(Ordering::SeqCst) == round + 1).await;
            manager.stop().await;
            manager.stop().await;
            assert!(!manager.is_running());
        }
    }
}

#[cfg(test)]
mod registry_tests {
    use backpressure::{registry, BackpressureError};
    use contracts::{BackpressureConfig, Operation, Priority};

    #[tokio::test]
    async fn test_registry_shares_one_manager() {
        let manager = registry::initialize(BackpressureConfig::default()).unwrap();
        assert!(matches!(
            registry::initialize(BackpressureConfig::default()),
            Err(BackpressureError::AlreadyInitialized)
        ));

        let same = registry::get().unwrap();
        assert!(same.submit(Operation::new("via-registry", Priority::High, "test", "")));
        assert_eq!(manager.get_stats().submitted_total, 1);

        registry::shutdown().await;
        assert!(matches!(registry::get(), Err(BackpressureError::NotInitialized)));
    }
}
