//! End-to-end tests for the write buffer, its sinks and the disk backup.

use serde_json::Value;
use std::fs;
use std::time::Duration;
use writebehind_core::backup::MemoryWriter;
use writebehind_core::{BackupLayout, BufferState, LogLevel, SaturationPolicy, WriteBuffer};
use writebehind_testkit::prelude::*;

const WAIT: Duration = Duration::from_secs(5);

fn ids(events: &[Event]) -> Vec<u64> {
    events.iter().map(|e| e.id).collect()
}

#[test]
fn capacity_threshold_flushes_once() {
    let primary = RecordingSink::new();
    let (config, _log) = quiet_config();
    let config = config.capacity(3).flush_interval(Duration::from_secs(10));
    let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("unused"), config);
    buffer.start().unwrap();

    for event in events(1, 3) {
        buffer.add(event);
    }

    assert!(wait_until(WAIT, || primary.call_count() == 1));
    assert_eq!(primary.batches(), vec![events(1, 3)]);
    assert_eq!(buffer.len(), 0);
    buffer.stop().unwrap();
}

#[test]
fn timer_flush_backs_up_when_both_sinks_fail() {
    let spool = TestSpool::new();
    let (config, log) = quiet_config();
    let config = config
        .flush_interval(Duration::from_millis(50))
        .backup_dir(spool.backup_dir(), "", 0)
        .backup_layout(BackupLayout::PerRecord);
    let primary = FailingSink::new("primary down");
    let secondary = FailingSink::new("secondary down");
    let buffer = WriteBuffer::new(primary.clone(), secondary.clone(), config);
    buffer.start().unwrap();

    let x = Event::new(7, "x");
    buffer.add(x.clone());

    assert!(wait_until(WAIT, || spool.lines().len() == 1));
    let data = spool.data();
    assert_eq!(data, vec![serde_json::to_value(&x).unwrap()]);
    assert!(spool.lines()[0]["time"].is_string());

    buffer.stop().unwrap();
    assert_eq!(primary.record_count(), 1);
    assert_eq!(secondary.record_count(), 1);
    assert!(log.contains(LogLevel::Error, "primary sink failed for 1 records"));
    assert!(log.contains(LogLevel::Error, "secondary sink failed for 1 records"));

    let name = spool.files()[0]
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap();
    assert!(name.starts_with("failed.") && name.ends_with(".log"));
}

#[test]
fn stop_right_after_add_delivers_record() {
    let primary = RecordingSink::new();
    let (config, _log) = quiet_config();
    let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("unused"), config);
    buffer.start().unwrap();

    buffer.add(Event::new(1, "only"));
    buffer.stop().unwrap();

    assert_eq!(primary.records(), vec![Event::new(1, "only")]);
    assert_eq!(buffer.state(), BufferState::Stopped);
}

#[test]
fn healthy_primary_never_touches_fallbacks() {
    let primary = RecordingSink::new();
    let secondary = RecordingSink::new();
    let writer = MemoryWriter::new();
    let backup = writer.handle();
    let (config, _log) = quiet_config();
    let config = config
        .capacity(4)
        .flush_interval(Duration::from_millis(10))
        .backup_writer(writer);
    let buffer = WriteBuffer::new(primary.clone(), secondary.clone(), config);
    buffer.start().unwrap();

    for event in events(0, 50) {
        buffer.add(event);
    }
    buffer.stop().unwrap();

    assert_eq!(primary.record_count(), 50);
    assert_eq!(secondary.call_count(), 0);
    assert_eq!(backup.open_count(), 0);
    assert!(backup.lines().is_empty());
}

#[test]
fn secondary_receives_exactly_what_primary_rejected() {
    let primary = FailingSink::new("rejecting everything");
    let secondary = RecordingSink::new();
    let writer = MemoryWriter::new();
    let backup = writer.handle();
    let (config, _log) = quiet_config();
    let config = config
        .capacity(5)
        .flush_interval(Duration::from_millis(10))
        .backup_writer(writer);
    let buffer = WriteBuffer::new(primary.clone(), secondary.clone(), config);
    buffer.start().unwrap();

    buffer.add_list(events(0, 12));
    for event in events(12, 8) {
        buffer.add(event);
    }
    buffer.stop().unwrap();

    assert_eq!(primary.call_count(), secondary.call_count());
    assert_eq!(primary.record_count(), secondary.record_count());
    assert_eq!(ids(&secondary.records()), (0..20).collect::<Vec<_>>());
    assert_eq!(backup.open_count(), 0);
}

#[test]
fn backup_file_is_append_only_across_flushes() {
    let spool = TestSpool::new();
    let (config, _log) = quiet_config();
    let config = config
        .flush_interval(Duration::from_secs(10))
        .capacity(2)
        .backup_dir(spool.backup_dir(), "audit", 0o750)
        .backup_layout(BackupLayout::PerBatch);
    let buffer = WriteBuffer::new(
        FailingSink::new("down"),
        FailingSink::new("down"),
        config,
    );
    buffer.start().unwrap();

    buffer.add_list(events(0, 2));
    assert!(wait_until(WAIT, || spool.lines().len() == 1));
    let first = fs::read(&spool.files()[0]).unwrap();

    buffer.add_list(events(2, 3));
    assert!(wait_until(WAIT, || spool.lines().len() == 2));
    buffer.stop().unwrap();

    let files = spool.files();
    assert_eq!(files.len(), 1);
    let after = fs::read(&files[0]).unwrap();
    assert!(after.starts_with(&first));

    let batches: Vec<usize> = spool
        .data()
        .iter()
        .map(|d| d.as_array().map_or(0, Vec::len))
        .collect();
    assert_eq!(batches, vec![2, 3]);
    assert_eq!(buffer.stats().backup_batches, 2);
}

#[test]
fn backup_disabled_drops_with_error_log() {
    let (config, log) = quiet_config();
    let buffer = WriteBuffer::new(FailingSink::new("a"), FailingSink::new("b"), config);

    buffer.add_list(events(0, 4));
    buffer.stop().unwrap();

    assert!(log.contains(LogLevel::Error, "dropping 4 records"));
    let stats = buffer.stats();
    assert_eq!(stats.dropped_batches, 1);
    assert_eq!(stats.dropped_records, 4);
}

#[test]
fn unreachable_backup_logs_the_lost_records() {
    let spool = TestSpool::new();
    let blocker = spool.path().join("blocked");
    fs::write(&blocker, b"not a directory").unwrap();

    let (config, log) = quiet_config();
    let config = config.backup_dir(blocker.clone(), "", 0);
    let buffer = WriteBuffer::new(FailingSink::new("a"), FailingSink::new("b"), config);

    buffer.add(Event::new(77, "checkout"));
    buffer.stop().unwrap();

    let lost = log
        .messages(LogLevel::Error)
        .into_iter()
        .find(|m| m.starts_with("backup unavailable, dropping 1 records"))
        .unwrap();
    assert!(lost.contains("failed to create backup directory"));
    assert!(lost.contains(r#"data: [{"id":77,"name":"checkout"}]"#));
    assert_eq!(buffer.stats().dropped_records, 1);
}

#[test]
fn concurrent_producers_lose_nothing() {
    let primary = RecordingSink::new();
    let (config, _log) = quiet_config();
    let config = config
        .capacity(64)
        .flush_interval(Duration::from_millis(5));
    let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("unused"), config);
    buffer.start().unwrap();

    let stress = StressConfig {
        producers: 8,
        records_per_producer: 1_500,
        list_size: 1,
    };
    let produced = run_producers(&buffer, &stress);
    buffer.stop().unwrap();

    assert_eq!(produced, stress.total());
    let audit = DeliveryAudit::check(stress.total(), ids(&primary.records()));
    assert!(audit.is_exact(), "{audit:?}");
    assert_eq!(buffer.stats().records_flushed, stress.total() as u64);
}

#[test]
fn concurrent_lists_stay_contiguous() {
    let primary = RecordingSink::new();
    let (config, _log) = quiet_config();
    let config = config.capacity(10).flush_interval(Duration::from_millis(5));
    let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("unused"), config);
    buffer.start().unwrap();

    let stress = StressConfig {
        producers: 4,
        records_per_producer: 400,
        list_size: 8,
    };
    run_producers(&buffer, &stress);
    buffer.stop().unwrap();

    let audit = DeliveryAudit::check(stress.total(), ids(&primary.records()));
    assert!(audit.is_exact(), "{audit:?}");

    // a list is never split across two batches
    for batch in primary.batches() {
        let mut by_list = std::collections::HashMap::<u64, usize>::new();
        for event in &batch {
            *by_list.entry(event.id / 8).or_default() += 1;
        }
        assert!(by_list.values().all(|n| *n == 8));
    }
}

#[test]
fn block_policy_under_load() {
    let primary = RecordingSink::new().with_delay(Duration::from_millis(2));
    let (config, _log) = quiet_config();
    let config = config
        .capacity(1)
        .signal_queue(1)
        .saturation(SaturationPolicy::Block)
        .flush_interval(Duration::from_secs(10));
    let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("unused"), config);
    buffer.start().unwrap();

    let stress = StressConfig {
        producers: 4,
        records_per_producer: 100,
        list_size: 1,
    };
    run_producers(&buffer, &stress);
    buffer.stop().unwrap();

    let audit = DeliveryAudit::check(stress.total(), ids(&primary.records()));
    assert!(audit.is_exact(), "{audit:?}");
}

#[test]
fn panicking_primary_keeps_engine_alive() {
    let primary = FlakySink::new(Fault::Panic, 1);
    let secondary = RecordingSink::new();
    let (config, log) = quiet_config();
    let config = config.capacity(2).flush_interval(Duration::from_secs(10));
    let buffer = WriteBuffer::new(primary.clone(), secondary.clone(), config);
    buffer.start().unwrap();

    buffer.add_list(events(0, 2));
    assert!(wait_until(WAIT, || buffer.stats().panics == 1));

    buffer.add_list(events(2, 2));
    assert!(wait_until(WAIT, || primary.recorded().call_count() == 1));
    buffer.stop().unwrap();

    assert_eq!(ids(&primary.recorded().records()), vec![2, 3]);
    assert_eq!(secondary.call_count(), 0);
    assert!(log.contains(LogLevel::Error, "scripted panic"));
}

#[test]
fn flaky_primary_falls_back_then_recovers() {
    let primary = FlakySink::new(Fault::Reject, 1);
    let secondary = RecordingSink::new();
    let (config, _log) = quiet_config();
    let config = config.capacity(3).flush_interval(Duration::from_secs(10));
    let buffer = WriteBuffer::new(primary.clone(), secondary.clone(), config);
    buffer.start().unwrap();

    buffer.add_list(events(0, 3));
    assert!(wait_until(WAIT, || secondary.call_count() == 1));
    buffer.add_list(events(3, 3));
    assert!(wait_until(WAIT, || primary.recorded().call_count() == 1));
    buffer.stop().unwrap();

    let stats = buffer.stats();
    assert_eq!(stats.secondary_batches, 1);
    assert_eq!(stats.primary_batches, 1);
    assert_eq!(stats.flushes, 2);
}

#[test]
fn buffers_sharing_a_directory_append_independently() {
    let spool = TestSpool::new();
    let make = || {
        let (config, _log) = quiet_config();
        let config = config
            .flush_interval(Duration::from_secs(10))
            .backup_dir(spool.backup_dir(), "shared", 0);
        WriteBuffer::new(FailingSink::new("a"), FailingSink::new("b"), config)
    };
    let left = make();
    let right = make();

    left.add_list(events(0, 3));
    right.add_list(events(100, 2));
    left.stop().unwrap();
    right.stop().unwrap();

    assert_eq!(spool.files().len(), 1);
    let mut seen: Vec<u64> = spool
        .data()
        .iter()
        .filter_map(|d| d["id"].as_u64())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 100, 101]);
}

#[test]
fn dropping_running_buffer_flushes() {
    let primary = RecordingSink::new();
    {
        let (config, _log) = quiet_config();
        let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("unused"), config);
        buffer.start().unwrap();
        buffer.add_list(events(0, 5));
    }
    assert_eq!(primary.record_count(), 5);
}

#[test]
fn unserializable_records_are_skipped_in_backup() {
    struct Opaque(u32);

    impl serde::Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if self.0 % 2 == 0 {
                serializer.serialize_u32(self.0)
            } else {
                Err(serde::ser::Error::custom("odd values are private"))
            }
        }
    }

    let writer = MemoryWriter::new();
    let backup = writer.handle();
    let (config, log) = quiet_config();
    let config = config.backup_writer(writer);
    let buffer = WriteBuffer::new(
        FailingSink::new("a"),
        FailingSink::new("b"),
        config,
    );

    buffer.add_list((0..4).map(Opaque).collect());
    buffer.stop().unwrap();

    let data: Vec<Value> = backup
        .lines()
        .iter()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["data"].clone())
        .collect();
    assert_eq!(data, vec![Value::from(0), Value::from(2)]);
    assert_eq!(buffer.stats().skipped_records, 2);
    assert!(log.count(LogLevel::Error) >= 2);
    assert_eq!(backup.close_count(), 1);
}

#[test]
fn stats_agree_with_sinks() {
    let primary = FlakySink::new(Fault::Reject, 2);
    let secondary = RecordingSink::new();
    let (config, _log) = quiet_config();
    let config = config.capacity(10).flush_interval(Duration::from_secs(10));
    let buffer = WriteBuffer::new(primary.clone(), secondary.clone(), config);
    buffer.start().unwrap();

    for round in 0..4u64 {
        buffer.add_list(events(round * 10, 10));
        assert!(wait_until(WAIT, || buffer.stats().flushes == round + 1));
    }
    buffer.stop().unwrap();

    let stats = buffer.stats();
    assert_eq!(stats.flushes, 4);
    assert_eq!(stats.records_flushed, 40);
    assert_eq!(stats.primary_batches as usize, primary.recorded().call_count());
    assert_eq!(stats.secondary_batches as usize, secondary.call_count());
    assert_eq!(stats.primary_batches, 2);
    assert_eq!(primary.fault_count(), 2);
    assert_eq!(stats.panics, 0);
}
