// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: tests/coordinator_test.rs
// Version: 0.4.0
//
// This file contains integration tests for the work coordinator, located in
// the tests directory. It covers the job assignment policy, result handling,
// pool failover, start/stop and hotplug admission against mock pools and
// in-memory device links.
//
// Tree Location:
// - tests/coordinator_test.rs (coordinator tests)
// - Depends on: rigbridge, tokio

mod common;

#[cfg(test)]
mod tests {
    use super::common::{MockOpener, MockPool, RemoteDevice, job, job_on, spec, wait_until};
    use rigbridge::coordinator::{Assignment, DeviceSource, WorkCoordinator};
    use rigbridge::core::types::Job;
    use rigbridge::device::WRITE_TIMEOUT;
    use rigbridge::device::{DeviceEntry, LinkOpener, LinkState, SerialHotplug};
    use rigbridge::core::config::DeviceSettings;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn source(opener: &Arc<MockOpener>, ports: &[&str]) -> DeviceSource {
        let opener = Arc::clone(opener);
        let ports: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
        Box::new(move || {
            ports
                .iter()
                .map(|p| DeviceEntry::Device(spec(p, &opener, 60)))
                .collect()
        })
    }

    async fn running(
        pools: &[&str],
        ports: &[&str],
    ) -> (Arc<WorkCoordinator<MockPool>>, Arc<MockOpener>) {
        let opener = MockOpener::new(ports);
        let coordinator = WorkCoordinator::new(
            pools.iter().map(|url| MockPool::new(url)).collect(),
            source(&opener, ports),
            Duration::ZERO,
        );
        coordinator.start().unwrap().await.unwrap();
        assert!(coordinator.is_started());
        let devices = coordinator.devices();
        assert!(
            wait_until(
                || devices.iter().all(|d| d.state() == LinkState::Listening),
                WAIT
            )
            .await
        );
        (coordinator, opener)
    }

    fn held(coordinator: &WorkCoordinator<MockPool>) -> Vec<Option<String>> {
        coordinator
            .devices()
            .iter()
            .map(|d| d.current_job_id())
            .collect()
    }

    fn id_of(job: Option<Arc<Job>>) -> Option<String> {
        job.map(|j| j.job_id.clone())
    }

    #[tokio::test]
    async fn test_forced_job_reaches_every_device_and_result_is_submitted() {
        let ports = ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2"];
        let (coordinator, opener) = running(&["pool-a:3333"], &ports).await;
        let ids: Vec<usize> = coordinator.devices().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(coordinator.pools()[0].starts(), 1);

        let j1 = job("J1");
        coordinator.on_new_job(0, Arc::clone(&j1), true).await;
        assert_eq!(held(&coordinator), vec![Some("J1".to_string()); 3]);
        for port in ports {
            let mut remote = RemoteDevice::new(opener.take_remote(port).unwrap());
            let work = remote.next_work().await.unwrap();
            assert_eq!(work["job"]["job_id"], "J1");
            assert_eq!(work["restart"], true);
        }

        coordinator.on_device_result_found(2, Arc::clone(&j1), "0badf00d").await;
        let pool = Arc::clone(&coordinator.pools()[0]);
        assert!(wait_until(|| pool.submissions().len() == 1, WAIT).await);
        let submission = &pool.submissions()[0];
        assert_eq!(submission.job_id, "J1");
        assert_eq!(submission.nonce, "0badf00d");
        assert_eq!(submission.extranonce2, "00000000");
        assert_eq!(submission.device_id, 2);

        let device = coordinator.registry().get(2).unwrap();
        assert!(wait_until(|| device.stats().accepted.load(Ordering::SeqCst) == 1, WAIT).await);
        assert!(device.stats().accepted_hash_rate() > 0.0);
        assert_eq!(device.current_job_id().as_deref(), Some("J1"));
        assert_eq!(coordinator.assign_next_job(2).await, Assignment::NoNewWork);
        assert_eq!(id_of(coordinator.current_job().await).as_deref(), Some("J1"));

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_job_is_staged_while_devices_work() {
        let (coordinator, _opener) = running(&["pool-a:3333"], &["p0", "p1", "p2"]).await;
        let pool = Arc::clone(&coordinator.pools()[0]);

        assert!(pool.send_job(job("J1"), true));
        assert!(wait_until(|| held(&coordinator).iter().all(|h| h.as_deref() == Some("J1")), WAIT).await);

        assert!(pool.send_job(job("J2"), false));
        let mut staged = false;
        for _ in 0..500 {
            if id_of(coordinator.next_job().await).as_deref() == Some("J2") {
                staged = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(staged);
        assert_eq!(id_of(coordinator.current_job().await).as_deref(), Some("J1"));
        assert_eq!(held(&coordinator), vec![Some("J1".to_string()); 3]);

        assert_eq!(coordinator.on_device_requested_work(1).await, Assignment::Started);
        assert_eq!(coordinator.devices()[1].current_job_id().as_deref(), Some("J2"));
        assert_eq!(id_of(coordinator.current_job().await).as_deref(), Some("J2"));

        assert_eq!(coordinator.on_device_requested_work(1).await, Assignment::NoNewWork);
        assert_eq!(id_of(coordinator.current_job().await).as_deref(), Some("J2"));

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_idle_devices_take_new_job_without_restart() {
        let ports = ["p0", "p1"];
        let (coordinator, opener) = running(&["pool-a:3333"], &ports).await;
        let mut remotes: Vec<RemoteDevice> = ports
            .iter()
            .map(|p| RemoteDevice::new(opener.take_remote(p).unwrap()))
            .collect();

        coordinator.on_new_job(0, job("J1"), false).await;
        for remote in remotes.iter_mut() {
            assert_eq!(remote.next_work().await.unwrap()["restart"], true);
        }
        assert!(coordinator.is_working().await);

        assert_eq!(coordinator.assign_next_job(0).await, Assignment::NoNewWork);
        assert!(coordinator.is_working().await);
        assert_eq!(coordinator.assign_next_job(1).await, Assignment::NoNewWork);
        assert!(!coordinator.is_working().await);

        coordinator.on_new_job(0, job("J2"), false).await;
        assert_eq!(held(&coordinator), vec![Some("J2".to_string()); 2]);
        for remote in remotes.iter_mut() {
            let work = remote.next_work().await.unwrap();
            assert_eq!(work["job"]["job_id"], "J2");
            assert_eq!(work["restart"], false);
        }

        coordinator.on_new_job(0, job("J3"), true).await;
        assert_eq!(held(&coordinator), vec![Some("J3".to_string()); 2]);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_latest_job_always_wins() {
        let (coordinator, _opener) = running(&["pool-a:3333"], &["p0"]).await;
        for (n, force) in [(1, false), (2, false), (3, true), (4, false), (5, false)] {
            let id = format!("J{}", n);
            coordinator.on_new_job(0, job(&id), force).await;
            assert_eq!(id_of(coordinator.next_job().await), Some(id));
        }
        // Not the active pool
        coordinator.on_new_job(1, job("other"), true).await;
        assert_eq!(id_of(coordinator.next_job().await).as_deref(), Some("J5"));

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded_not_submitted() {
        let (coordinator, _opener) = running(&["pool-a:3333"], &["p0", "p1"]).await;
        let mut j1 = (*job("J1")).clone();
        j1.difficulty = 4.0;
        let j1 = Arc::new(j1);
        coordinator.on_new_job(0, Arc::clone(&j1), true).await;
        coordinator.on_new_job(0, job("J2"), false).await;
        assert_eq!(coordinator.assign_next_job(0).await, Assignment::Started);

        coordinator.on_device_result_found(1, Arc::clone(&j1), "01").await;
        let device = coordinator.registry().get(1).unwrap();
        assert_eq!(device.stats().discarded_work_units.load(Ordering::SeqCst), 4);
        assert_eq!(device.current_job_id().as_deref(), Some("J2"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(coordinator.pools()[0].submissions().is_empty());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_rejected_share_counts_as_rejected() {
        let (coordinator, _opener) = running(&["pool-a:3333"], &["p0"]).await;
        let pool = Arc::clone(&coordinator.pools()[0]);
        pool.accept.store(false, Ordering::SeqCst);
        let j1 = job("J1");
        coordinator.on_new_job(0, Arc::clone(&j1), true).await;
        coordinator.on_device_result_found(0, j1, "02").await;

        let device = coordinator.registry().get(0).unwrap();
        assert!(wait_until(|| device.stats().rejected.load(Ordering::SeqCst) == 1, WAIT).await);
        assert_eq!(device.stats().accepted.load(Ordering::SeqCst), 0);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_fails_over_to_next_pool() {
        let (coordinator, _opener) = running(&["pool-a:3333", "pool-b:3333"], &["p0"]).await;
        let pools: Vec<Arc<MockPool>> = coordinator.pools().to_vec();
        assert_eq!(coordinator.active_pool().await, Some(0));

        assert!(pools[0].disconnect());
        let mut switched = false;
        for _ in 0..500 {
            if coordinator.active_pool().await == Some(1) {
                switched = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(switched);
        assert_eq!(pools[1].starts(), 1);
        assert_eq!(pools[0].stops(), 1);

        assert_eq!(coordinator.attempt_pool_failover().await, Some(0));
        assert_eq!(coordinator.attempt_pool_failover().await, Some(1));
        assert_eq!(pools[0].starts(), 2);
        assert_eq!(pools[1].starts(), 2);

        pools[1].connecting.store(true, Ordering::SeqCst);
        assert_eq!(coordinator.attempt_pool_failover().await, None);
        assert_eq!(coordinator.active_pool().await, Some(1));

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_failover_with_single_pool_restarts_it() {
        let (coordinator, _opener) = running(&["pool-a:3333"], &[]).await;
        coordinator.on_new_job(0, job("J1"), true).await;
        assert_eq!(coordinator.attempt_pool_failover().await, Some(0));
        assert_eq!(coordinator.pools()[0].starts(), 2);
        assert!(coordinator.current_job().await.is_none());
        assert!(coordinator.next_job().await.is_none());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_result_on_dead_pool_triggers_failover() {
        let (coordinator, _opener) = running(&["pool-a:3333", "pool-b:3333"], &["p0"]).await;
        let j1 = job("J1");
        coordinator.on_new_job(0, Arc::clone(&j1), true).await;
        coordinator.pools()[0].connected.store(false, Ordering::SeqCst);

        coordinator.on_device_result_found(0, j1, "03").await;
        assert_eq!(coordinator.active_pool().await, Some(1));
        assert!(coordinator.pools()[0].submissions().is_empty());
        assert!(coordinator.pools()[1].submissions().is_empty());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_reused_job_id_after_failover_goes_to_new_pool_job() {
        let (coordinator, opener) = running(&["pool-a:3333", "pool-b:3333"], &["p0"]).await;
        let pools: Vec<Arc<MockPool>> = coordinator.pools().to_vec();
        let mut remote = RemoteDevice::new(opener.take_remote("p0").unwrap());

        let old = job_on("1", "aaaa", "6553f100");
        coordinator.on_new_job(0, Arc::clone(&old), true).await;
        assert_eq!(remote.next_work().await.unwrap()["job"]["extranonce1"], "aaaa");

        assert!(pools[0].disconnect());
        let mut switched = false;
        for _ in 0..500 {
            if coordinator.active_pool().await == Some(1) {
                switched = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(switched);

        let mut fresh = (*job_on("1", "bbbb", "6553f200")).clone();
        fresh.extranonce2_size = 8;
        let fresh = Arc::new(fresh);
        coordinator.on_new_job(1, Arc::clone(&fresh), false).await;
        let work = remote.next_work().await.unwrap();
        assert_eq!(work["job"]["extranonce1"], "bbbb");
        assert_eq!(work["restart"], true);

        remote.send(r#"{"type":"nonce","job_id":"1","nonce":"00c0ffee"}"#).await;
        assert!(wait_until(|| pools[1].submissions().len() == 1, WAIT).await);
        let submission = &pools[1].submissions()[0];
        assert_eq!(submission.job_id, "1");
        assert_eq!(submission.ntime, "6553f200");
        assert_eq!(submission.extranonce2, "0000000000000000");

        // A result still tied to the first pool's job is stale
        coordinator.on_device_result_found(0, old, "ff").await;
        let device = coordinator.registry().get(0).unwrap();
        assert_eq!(device.stats().discarded_work_units.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pools[0].submissions().is_empty());
        assert_eq!(pools[1].submissions().len(), 1);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_device_that_stops_reading_does_not_block_others() {
        let (coordinator, opener) = running(&["pool-a:3333"], &["slow", "fast"]).await;
        // Never read, so its link fills up
        let _slow = opener.take_remote("slow").unwrap();
        let mut fast = RemoteDevice::new(opener.take_remote("fast").unwrap());
        let drained = tokio::spawn(async move {
            while let Some(work) = fast.next_work().await {
                if work["job"]["job_id"] == "J1999" {
                    return true;
                }
            }
            false
        });

        for n in 0..2_000 {
            coordinator.on_new_job(0, job(&format!("J{}", n)), true).await;
        }
        let assigned = tokio::time::timeout(Duration::from_secs(3), coordinator.assign_next_job(1)).await;
        assert_eq!(assigned.unwrap(), Assignment::NoNewWork);
        assert!(tokio::time::timeout(WAIT, drained).await.unwrap().unwrap());

        let stopped = tokio::time::timeout(WRITE_TIMEOUT, coordinator.stop()).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_load_finishes_loads_nothing() {
        let opener = MockOpener::new(&["p0", "p1"]);
        let coordinator = WorkCoordinator::new(
            vec![MockPool::new("pool-a:3333")],
            source(&opener, &["p0", "p1"]),
            Duration::ZERO,
        );

        let loading = coordinator.start().unwrap();
        coordinator.stop().await;
        loading.await.unwrap();

        assert!(!coordinator.is_started());
        assert!(coordinator.devices().is_empty());
        assert_eq!(coordinator.active_pool().await, None);
        assert_eq!(coordinator.pools()[0].starts(), 0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(opener.opens(), 0);

        coordinator.start().unwrap().await.unwrap();
        assert!(coordinator.is_started());
        assert_eq!(coordinator.devices().len(), 2);
        assert_eq!(coordinator.pools()[0].starts(), 1);

        coordinator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_restart_delay_cancels_reconnect() {
        let opener = MockOpener::new(&[]);
        let coordinator = WorkCoordinator::new(
            vec![MockPool::new("pool-a:3333")],
            source(&opener, &["p0"]),
            Duration::ZERO,
        );
        coordinator.start().unwrap().await.unwrap();
        let device = coordinator.registry().get(0).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_ne!(device.state(), LinkState::Listening);
        opener.set_ports(&["p0"]);
        coordinator.stop().await;
        assert_eq!(device.state(), LinkState::Unloaded);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(device.state(), LinkState::Unloaded);
        assert_eq!(device.stats().restarts.load(Ordering::SeqCst), 0);
        assert_eq!(opener.opens(), 0);
    }

    #[tokio::test]
    async fn test_result_while_pool_connects_is_dropped_without_failover() {
        let (coordinator, _opener) = running(&["pool-a:3333", "pool-b:3333"], &["p0"]).await;
        let j1 = job("J1");
        coordinator.on_new_job(0, Arc::clone(&j1), true).await;
        let pools: Vec<Arc<MockPool>> = coordinator.pools().to_vec();
        pools[0].connected.store(false, Ordering::SeqCst);
        pools[0].connecting.store(true, Ordering::SeqCst);

        coordinator.on_device_result_found(0, j1, "04").await;
        assert_eq!(coordinator.active_pool().await, Some(0));
        assert_eq!(pools[1].starts(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pools[0].submissions().is_empty());
        let device = coordinator.registry().get(0).unwrap();
        assert_eq!(device.stats().discarded_work_units.load(Ordering::SeqCst), 0);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_ids_are_not_reused() {
        let opener = MockOpener::new(&["p0", "p1"]);
        let coordinator = WorkCoordinator::new(
            vec![MockPool::new("pool-a:3333")],
            source(&opener, &["p0", "p1"]),
            Duration::ZERO,
        );
        coordinator.stop().await;
        assert!(!coordinator.is_started());

        coordinator.start().unwrap().await.unwrap();
        assert!(coordinator.start().is_none());
        let first = coordinator.devices();
        assert!(wait_until(|| first.iter().all(|d| d.state() == LinkState::Listening), WAIT).await);
        assert!(coordinator.pools()[0].is_bound());

        coordinator.stop().await;
        coordinator.stop().await;
        assert!(!coordinator.is_started());
        assert!(coordinator.devices().is_empty());
        assert!(first.iter().all(|d| d.state() == LinkState::Unloaded));
        assert_eq!(coordinator.pools()[0].stops(), 1);
        assert!(!coordinator.pools()[0].is_bound());
        assert_eq!(coordinator.active_pool().await, None);

        coordinator.start().unwrap().await.unwrap();
        let ids: Vec<usize> = coordinator.devices().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(coordinator.pools()[0].starts(), 2);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_hotplugged_device_continues_ids_and_gets_work() {
        let opener = MockOpener::new(&["/dev/ttyUSB0"]);
        let hotplug_opener: Arc<dyn LinkOpener> = opener.clone();
        let fixed = Arc::clone(&opener);
        let source: DeviceSource = Box::new(move || {
            vec![
                DeviceEntry::Device(spec("/dev/ttyUSB0", &fixed, 60)),
                DeviceEntry::Hotplug(Arc::new(SerialHotplug::new(
                    "/dev/ttyACM".to_string(),
                    Duration::from_millis(50),
                    vec!["/dev/ttyACM9".to_string()],
                    DeviceSettings::default(),
                    Arc::clone(&hotplug_opener),
                ))),
            ]
        });
        let coordinator = WorkCoordinator::new(vec![MockPool::new("pool-a:3333")], source, Duration::ZERO);
        coordinator.start().unwrap().await.unwrap();
        assert_eq!(coordinator.devices().len(), 1);
        coordinator.on_new_job(0, job("J1"), true).await;

        opener.set_ports(&["/dev/ttyUSB0", "/dev/ttyACM0", "/dev/ttyACM9"]);
        assert!(wait_until(|| coordinator.devices().len() == 2, WAIT).await);
        let added = coordinator.registry().get(1).unwrap();
        assert_eq!(added.port(), "/dev/ttyACM0");
        assert!(wait_until(|| added.current_job_id().as_deref() == Some("J1"), WAIT).await);
        assert!(wait_until(|| added.state() == LinkState::Listening, WAIT).await);

        coordinator.stop().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(coordinator.devices().is_empty());
        assert_eq!(added.state(), LinkState::Unloaded);
    }
}
