use btosi::{Error, THREAD_NAME_MAX, WorkerThread};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn test_thousand_increments() {
    let worker = WorkerThread::new("counter", 64).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let counter = counter.clone();
        worker
            .post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    worker.stop();
    worker.join().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
}

#[test]
fn test_work_runs_in_post_order() {
    let worker = WorkerThread::new("ordered", 8).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..100 {
        let seen = seen.clone();
        worker.post(move || seen.lock().unwrap().push(i)).unwrap();
    }

    drop(worker);

    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_post_after_exit_fails() {
    let worker = WorkerThread::new("stopped", 4).unwrap();

    worker.stop();
    worker.join().unwrap();

    let err = worker.post(|| {}).unwrap_err();
    assert!(matches!(err, Error::ThreadStopped { .. }));
    assert_eq!(err.as_label(), "thread_stopped");
}

#[test]
fn test_items_posted_before_stop_all_run() {
    init_logging();
    let worker = WorkerThread::new("drain", 16).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    // Hold the worker so the queue fills up behind it.
    let (release_tx, release_rx) = mpsc::channel::<()>();
    worker
        .post(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
        })
        .unwrap();

    for _ in 0..10 {
        let counter = counter.clone();
        worker
            .post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    worker.stop();
    release_tx.send(()).unwrap();
    worker.join().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn test_post_blocks_under_backpressure() {
    let worker = Arc::new(WorkerThread::new("backpressure", 1).unwrap());
    let counter = Arc::new(AtomicUsize::new(0));

    let (release_tx, release_rx) = mpsc::channel::<()>();
    worker
        .post(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
        })
        .unwrap();

    let poster = {
        let worker = worker.clone();
        let counter = counter.clone();
        thread::spawn(move || {
            for _ in 0..5 {
                let counter = counter.clone();
                worker
                    .post(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    release_tx.send(()).unwrap();
    poster.join().unwrap();

    worker.stop();
    worker.join().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[test]
fn test_join_is_idempotent() {
    let worker = WorkerThread::new("joiner", 2).unwrap();
    worker.stop();

    assert!(worker.join().is_ok());
    assert!(worker.join().is_ok());
}

#[test]
fn test_join_from_itself_is_refused() {
    let worker = Arc::new(WorkerThread::new("self_join", 2).unwrap());
    let (tx, rx) = mpsc::channel();

    let inner = worker.clone();
    worker
        .post(move || {
            tx.send((inner.is_self(), inner.join().map_err(|e| e.as_label())))
                .unwrap();
        })
        .unwrap();

    let (is_self, joined) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(is_self);
    assert_eq!(joined, Err("join_self"));
    assert!(!worker.is_self());

    worker.stop();
    worker.join().unwrap();
}

#[test]
fn test_name_is_truncated() {
    let worker = WorkerThread::new("a_very_long_thread_name", 1).unwrap();
    assert_eq!(worker.name(), "a_very_long_thr");
    assert_eq!(worker.name().len(), THREAD_NAME_MAX);

    let (tx, rx) = mpsc::channel();
    worker
        .post(move || {
            tx.send(thread::current().name().map(str::to_owned)).unwrap();
        })
        .unwrap();

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(),
        Some("a_very_long_thr")
    );
}

#[test]
fn test_tid_is_kernel_thread_id() {
    let worker = WorkerThread::new("tid", 1).unwrap();
    assert!(worker.tid() > 0);
    assert_ne!(worker.tid() as u32, std::process::id());
}

#[test]
fn test_lowering_priority_succeeds() {
    let worker = WorkerThread::new("nice", 1).unwrap();
    assert!(worker.set_priority(19).is_ok());
}

#[test]
fn test_reactor_watches_run_on_worker() {
    let worker = WorkerThread::new("extra_watch", 4).unwrap();
    let sem = Arc::new(btosi::Semaphore::new(0).unwrap());
    let (tx, rx) = mpsc::channel();

    let watch = {
        let sem = sem.clone();
        worker
            .reactor()
            .register_read(sem.fd(), move || {
                if sem.try_wait() {
                    tx.send(thread::current().name().map(str::to_owned)).unwrap();
                }
            })
            .unwrap()
    };

    sem.post();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(),
        Some("extra_watch")
    );

    worker.reactor().unregister(watch);
}

#[test]
fn test_drain_ends_while_producer_keeps_posting() {
    init_logging();
    let worker = Arc::new(WorkerThread::new("busy_drain", 2).unwrap());
    let executed = Arc::new(AtomicUsize::new(0));

    let (release_tx, release_rx) = mpsc::channel::<()>();
    worker
        .post(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
        })
        .unwrap();

    let producer = {
        let worker = worker.clone();
        let executed = executed.clone();
        thread::spawn(move || {
            let mut accepted = 0;
            loop {
                let executed = executed.clone();
                let posted = worker.post(move || {
                    thread::sleep(Duration::from_millis(1));
                    executed.fetch_add(1, Ordering::SeqCst);
                });
                if posted.is_err() {
                    break accepted;
                }
                accepted += 1;
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    worker.stop();
    release_tx.send(()).unwrap();
    worker.join().unwrap();

    let accepted = producer.join().unwrap();
    assert!(accepted >= 2);
    assert_eq!(executed.load(Ordering::SeqCst), accepted);
}
