use btosi::{BoundedChannel, Reactor, RunStatus};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn test_capacity_two_scenario() {
    let channel = BoundedChannel::new(2).unwrap();

    channel.enqueue("A");
    channel.enqueue("B");
    assert_eq!(channel.try_enqueue("C"), Err("C"));
    assert_eq!(channel.len(), 2);

    assert_eq!(channel.dequeue(), "A");
    assert_eq!(channel.try_enqueue("C"), Ok(()));
    assert_eq!(channel.dequeue(), "B");
    assert_eq!(channel.dequeue(), "C");
    assert!(channel.is_empty());
}

#[test]
fn test_try_dequeue_on_empty() {
    let channel: BoundedChannel<u32> = BoundedChannel::new(4).unwrap();

    assert_eq!(channel.try_dequeue(), None);
    assert_eq!(channel.try_pull(), None);
    assert_eq!(channel.len(), 0);
    assert_eq!(channel.capacity(), 4);

    // No permit was lost by the failed attempts.
    for i in 0..4 {
        assert_eq!(channel.try_enqueue(i), Ok(()));
    }
    assert_eq!(channel.try_enqueue(4), Err(4));
}

#[test]
fn test_spsc_fifo_order() {
    let channel = Arc::new(BoundedChannel::new(8).unwrap());

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || {
            for i in 0..1000u32 {
                channel.enqueue(i);
            }
        })
    };

    let received: Vec<u32> = (0..1000).map(|_| channel.dequeue()).collect();
    producer.join().unwrap();

    assert_eq!(received, (0..1000).collect::<Vec<_>>());
    assert!(channel.is_empty());
}

#[test]
fn test_length_stays_within_capacity() {
    let channel = Arc::new(BoundedChannel::new(3).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let channel = channel.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    channel.enqueue(i);
                }
            })
        })
        .collect();

    let watcher = {
        let channel = channel.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut max = 0;
            while !done.load(Ordering::Acquire) {
                max = max.max(channel.len());
            }
            max
        })
    };

    for _ in 0..1000 {
        channel.dequeue();
    }
    for p in producers {
        p.join().unwrap();
    }
    done.store(true, Ordering::Release);

    assert!(watcher.join().unwrap() <= 3);
    assert!(channel.is_empty());
}

#[test]
fn test_stack_operations() {
    let channel = BoundedChannel::new(4).unwrap();

    channel.enqueue(1);
    channel.enqueue(2);
    channel.push(0);
    assert_eq!(channel.try_push(9), Ok(()));
    assert_eq!(channel.try_push(10), Err(10));

    assert_eq!(channel.pull(), 2);
    assert_eq!(channel.dequeue(), 9);
    assert_eq!(channel.try_pull(), Some(1));
    assert_eq!(channel.try_dequeue(), Some(0));
}

#[test]
fn test_peek_does_not_remove() {
    let channel = BoundedChannel::new(3).unwrap();
    assert_eq!(channel.peek_first(), None::<String>);

    channel.enqueue("first".to_string());
    channel.enqueue("last".to_string());

    assert_eq!(channel.peek_first().as_deref(), Some("first"));
    assert_eq!(channel.peek_last().as_deref(), Some("last"));
    assert_eq!(channel.len(), 2);
}

#[test]
fn test_remove_releases_slot() {
    let channel = BoundedChannel::new(3).unwrap();
    channel.enqueue(1);
    channel.enqueue(2);
    channel.enqueue(3);

    assert_eq!(channel.remove(&2), Some(2));
    assert_eq!(channel.remove(&7), None);
    assert_eq!(channel.remove_where(|v| *v > 2), Some(3));
    assert_eq!(channel.len(), 1);

    assert_eq!(channel.try_enqueue(4), Ok(()));
    assert_eq!(channel.try_enqueue(5), Ok(()));
    assert_eq!(channel.try_enqueue(6), Err(6));

    assert_eq!(channel.dequeue(), 1);
    assert_eq!(channel.dequeue(), 4);
    assert_eq!(channel.dequeue(), 5);
    assert_eq!(channel.try_dequeue(), None);
}

#[test]
fn test_flush_and_clear() {
    let channel = BoundedChannel::new(4).unwrap();
    for i in 0..4 {
        channel.enqueue(i);
    }

    let mut seen = Vec::new();
    channel.flush(|item| seen.push(item));
    assert_eq!(seen, vec![0, 1, 2, 3]);
    assert!(channel.is_empty());

    channel.enqueue(10);
    channel.enqueue(11);
    channel.clear();
    assert!(channel.is_empty());
    for i in 0..4 {
        assert_eq!(channel.try_enqueue(i), Ok(()));
    }
}

#[test]
fn test_zero_capacity_is_a_handoff() {
    let channel = Arc::new(BoundedChannel::new(0).unwrap());

    assert_eq!(channel.try_enqueue(1), Err(1));
    assert_eq!(channel.try_dequeue(), None);

    let consumer = {
        let channel = channel.clone();
        thread::spawn(move || channel.dequeue())
    };

    channel.enqueue(42);
    assert_eq!(consumer.join().unwrap(), 42);

    assert_eq!(channel.try_enqueue(2), Err(2));
    assert!(channel.is_empty());
}

#[test]
fn test_zero_capacity_remove_hands_slot_back() {
    let channel = Arc::new(BoundedChannel::new(0).unwrap());

    let consumer = {
        let channel = channel.clone();
        thread::spawn(move || channel.dequeue())
    };

    channel.enqueue(1);
    let removed = channel.remove(&1);
    if removed.is_some() {
        // The consumer is still waiting and takes the next item.
        channel.enqueue(2);
    }

    let received = consumer.join().unwrap();
    match removed {
        Some(_) => assert_eq!(received, 2),
        None => assert_eq!(received, 1),
    }

    assert_eq!(channel.try_enqueue(3), Err(3));
    assert!(channel.is_empty());
}

#[test]
fn test_zero_capacity_flush_hands_slot_back() {
    let channel = Arc::new(BoundedChannel::new(0).unwrap());

    let consumer = {
        let channel = channel.clone();
        thread::spawn(move || channel.dequeue())
    };

    channel.enqueue(1);
    let mut flushed = Vec::new();
    channel.flush(|item| flushed.push(item));
    if !flushed.is_empty() {
        channel.enqueue(2);
    }

    let received = consumer.join().unwrap();
    if flushed.is_empty() {
        assert_eq!(received, 1);
    } else {
        assert_eq!(flushed, vec![1]);
        assert_eq!(received, 2);
    }
    assert_eq!(channel.try_enqueue(3), Err(3));
}

#[test]
fn test_descriptors_are_distinct() {
    let channel: BoundedChannel<u8> = BoundedChannel::new(1).unwrap();
    assert!(channel.dequeue_fd() >= 0);
    assert!(channel.enqueue_fd() >= 0);
    assert_ne!(channel.dequeue_fd(), channel.enqueue_fd());
}

#[test]
fn test_register_dequeue_drives_consumer() {
    let reactor = Arc::new(Reactor::new());
    let channel = Arc::new(BoundedChannel::new(16).unwrap());
    let (tx, rx) = mpsc::channel();

    channel
        .register_dequeue(&reactor, move |queue| {
            if let Some(item) = queue.try_dequeue() {
                tx.send(item).unwrap();
            }
        })
        .unwrap();

    let runner = {
        let reactor = reactor.clone();
        thread::spawn(move || reactor.start())
    };

    for i in 0..5 {
        channel.enqueue(i);
    }

    let received: Vec<i32> = (0..5)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    assert_eq!(received, vec![0, 1, 2, 3, 4]);

    reactor.stop();
    assert_eq!(runner.join().unwrap().unwrap(), RunStatus::Stopped);

    channel.unregister_dequeue();
    assert_eq!(reactor.watch_count(), 0);
}

#[test]
fn test_dropping_channel_unregisters() {
    let reactor = Arc::new(Reactor::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let channel = Arc::new(BoundedChannel::<u8>::new(1).unwrap());
    let counter = calls.clone();
    channel
        .register_dequeue(&reactor, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(reactor.watch_count(), 1);

    drop(channel);
    assert_eq!(reactor.watch_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
