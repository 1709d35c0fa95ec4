//! Readers racing a writer on the same status file

use crate::common::TestEnv;
use chrono::Utc;
use stackscan::status::{Phase, Progress, UnitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_readers_never_see_partial_documents() {
    let env = TestEnv::new();
    let store = env.store();
    store.create_job_dir("job-race").unwrap();

    let mut initial = UnitStatus::new(0, "race", std::process::id(), Utc::now());
    initial.phase = Phase::Scanning;
    store.write_unit("job-race", &initial).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let store = store.clone();
        let done = Arc::clone(&done);
        let mut status = initial.clone();
        thread::spawn(move || {
            for i in 0..500u64 {
                status.progress = Progress {
                    total: Some(500),
                    current: Some(i),
                };
                // Vary the document size so a torn read would not parse
                status.current_item = Some("x".repeat((i % 97) as usize));
                status.touch(Utc::now());
                store.write_unit("job-race", &status).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0usize;
                let mut last = 0u64;
                while !done.load(Ordering::Acquire) {
                    let unit = store.read_unit("job-race", 0).unwrap().unwrap();
                    assert_eq!(unit.name, "race");
                    let current = unit.progress.current.unwrap_or(0);
                    assert!(current >= last, "progress went backwards");
                    last = current;
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    writer.join().unwrap();
    let total_reads: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(total_reads > 0);

    let last = store.read_unit("job-race", 0).unwrap().unwrap();
    assert_eq!(last.progress.current, Some(499));
    // No temp files left behind
    let leftovers = std::fs::read_dir(store.job_dir("job-race").unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
}
