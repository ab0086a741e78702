use btosi::{Callback, Reactor, RunStatus, Semaphore, Watch};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_stop_from_another_thread() {
    let reactor = Arc::new(Reactor::new());

    let runner = {
        let reactor = reactor.clone();
        thread::spawn(move || reactor.start())
    };

    thread::sleep(Duration::from_millis(50));
    reactor.stop();

    assert_eq!(runner.join().unwrap().unwrap(), RunStatus::Stopped);
}

#[test]
fn test_stop_before_start_returns_immediately() {
    let reactor = Reactor::new();
    reactor.stop();

    let start = Instant::now();
    assert_eq!(reactor.start().unwrap(), RunStatus::Stopped);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_one_callback_per_readiness() {
    let reactor = Reactor::new();
    let sem = Arc::new(Semaphore::new(3).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));

    let watch = {
        let sem = sem.clone();
        let calls = calls.clone();
        reactor
            .register_read(sem.fd(), move || {
                assert!(sem.try_wait());
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
    };

    assert_eq!(reactor.run_once().unwrap(), RunStatus::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(reactor.run(2).unwrap(), RunStatus::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!sem.try_wait());

    reactor.unregister(watch);
    assert_eq!(reactor.watch_count(), 0);
}

#[test]
fn test_unregister_from_read_callback_skips_write() {
    let reactor = Arc::new(Reactor::new());
    // A semaphore eventfd holding a permit is both readable and writable.
    let sem = Semaphore::new(1).unwrap();

    let slot: Arc<Mutex<Option<Watch>>> = Arc::new(Mutex::new(None));
    let reads = Arc::new(AtomicUsize::new(0));
    let writes = Arc::new(AtomicUsize::new(0));

    let on_readable: Callback = {
        let weak = Arc::downgrade(&reactor);
        let slot = slot.clone();
        let reads = reads.clone();
        Box::new(move || {
            reads.fetch_add(1, Ordering::SeqCst);
            if let (Some(reactor), Some(watch)) = (weak.upgrade(), slot.lock().unwrap().take()) {
                reactor.unregister(watch);
            }
        })
    };
    let on_writable: Callback = {
        let writes = writes.clone();
        Box::new(move || {
            writes.fetch_add(1, Ordering::SeqCst);
        })
    };

    let watch = reactor
        .register(sem.fd(), Some(on_readable), Some(on_writable))
        .unwrap();
    *slot.lock().unwrap() = Some(watch);

    assert_eq!(reactor.run_once().unwrap(), RunStatus::Done);

    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(writes.load(Ordering::SeqCst), 0);
    assert_eq!(reactor.watch_count(), 0);
}

#[test]
fn test_write_callback_runs() {
    let reactor = Reactor::new();
    let sem = Semaphore::new(0).unwrap();
    let writes = Arc::new(AtomicUsize::new(0));

    let counter = writes.clone();
    let watch = reactor
        .register_write(sem.fd(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(reactor.run_once().unwrap(), RunStatus::Done);
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    reactor.unregister(watch);
}

#[test]
fn test_foreign_unregister_waits_for_running_callback() {
    let reactor = Arc::new(Reactor::new());
    let sem = Arc::new(Semaphore::new(0).unwrap());
    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let watch = {
        let sem = sem.clone();
        let started = started.clone();
        let finished = finished.clone();
        reactor
            .register_read(sem.fd(), move || {
                sem.try_wait();
                started.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            })
            .unwrap()
    };

    let runner = {
        let reactor = reactor.clone();
        thread::spawn(move || reactor.start())
    };

    sem.post();
    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    reactor.unregister(watch);
    assert!(finished.load(Ordering::SeqCst));

    reactor.stop();
    assert_eq!(runner.join().unwrap().unwrap(), RunStatus::Stopped);
}

#[test]
fn test_callbacks_run_on_reactor_thread() {
    let reactor = Arc::new(Reactor::new());
    let sem = Arc::new(Semaphore::new(1).unwrap());
    let on_loop = Arc::new(AtomicBool::new(false));

    let watch = {
        let weak = Arc::downgrade(&reactor);
        let sem = sem.clone();
        let on_loop = on_loop.clone();
        reactor
            .register_read(sem.fd(), move || {
                sem.try_wait();
                if let Some(reactor) = weak.upgrade() {
                    on_loop.store(reactor.is_loop_thread(), Ordering::SeqCst);
                    reactor.stop();
                }
            })
            .unwrap()
    };

    assert!(!reactor.is_loop_thread());
    assert_eq!(reactor.start().unwrap(), RunStatus::Stopped);
    assert!(on_loop.load(Ordering::SeqCst));

    reactor.unregister(watch);
}

#[test]
#[should_panic(expected = "at least one callback")]
fn test_register_without_callback_panics() {
    let reactor = Reactor::new();
    let sem = Semaphore::new(0).unwrap();
    let _ = reactor.register(sem.fd(), None, None);
}

#[test]
#[should_panic(expected = "does not belong")]
fn test_unregister_on_wrong_reactor_panics() {
    let first = Reactor::new();
    let second = Reactor::new();
    let sem = Semaphore::new(0).unwrap();

    let watch = first.register_read(sem.fd(), || {}).unwrap();
    second.unregister(watch);
}

#[test]
fn test_register_invalid_fd_fails() {
    let reactor = Reactor::new();
    let err = reactor.register_read(-1, || {}).unwrap_err();

    assert_eq!(err.as_label(), "register_failed");
    assert_eq!(reactor.watch_count(), 0);
}
