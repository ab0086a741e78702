use btosi::{HandlerTable, SmMessage, StateMachine};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Link {
    Idle,
    Connecting,
    Connected,
}

type Log = Arc<Mutex<Vec<(Link, SmMessage)>>>;

fn recording(machine: &StateMachine<Link>, log: &Log, state: Link) {
    let log = log.clone();
    machine.add_state(state, move |ctx| {
        log.lock().unwrap().push((ctx.state(), ctx.message().clone()));

        let id = match ctx.message() {
            SmMessage::Process(id, _) => Some(*id),
            _ => None,
        };
        match (ctx.state(), id) {
            (Link::Idle, Some(1)) => ctx.transition_to(Link::Connecting),
            (Link::Connecting, Some(2)) => ctx.defer(),
            (Link::Connecting, Some(3)) => ctx.transition_to(Link::Connected),
            _ => {}
        }
    });
}

#[test]
fn test_enter_exit_and_transitions() {
    let machine = StateMachine::new("sm_basic").unwrap();
    let log: Log = Arc::default();
    for state in [Link::Idle, Link::Connecting, Link::Connected] {
        recording(&machine, &log, state);
    }

    assert_eq!(machine.state(), None);
    machine.start(Link::Idle).unwrap();
    machine.send(1, vec![0xaa]).unwrap();
    machine.stop().unwrap();

    assert_eq!(machine.state(), Some(Link::Connecting));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (Link::Idle, SmMessage::Enter),
            (Link::Idle, SmMessage::Process(1, vec![0xaa])),
            (Link::Idle, SmMessage::Exit),
            (Link::Connecting, SmMessage::Enter),
        ]
    );
}

#[test]
fn test_deferred_message_replays_after_transition() {
    let machine = StateMachine::new("sm_defer").unwrap();
    let log: Log = Arc::default();
    for state in [Link::Idle, Link::Connecting, Link::Connected] {
        recording(&machine, &log, state);
    }

    machine.start(Link::Connecting).unwrap();
    machine.send(2, vec![]).unwrap();
    machine.send(3, vec![]).unwrap();
    machine.stop().unwrap();

    assert_eq!(machine.state(), Some(Link::Connected));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (Link::Connecting, SmMessage::Enter),
            (Link::Connecting, SmMessage::Process(2, vec![])),
            (Link::Connecting, SmMessage::Process(3, vec![])),
            (Link::Connecting, SmMessage::Exit),
            (Link::Connected, SmMessage::Enter),
            (Link::Connected, SmMessage::Process(2, vec![])),
        ]
    );
}

#[test]
fn test_external_defer_and_transition() {
    let machine = StateMachine::new("sm_external").unwrap();
    let log: Log = Arc::default();
    recording(&machine, &log, Link::Idle);
    recording(&machine, &log, Link::Connected);

    machine.defer(7, vec![1, 2]);
    machine.start(Link::Idle).unwrap();
    machine.transition_to(Link::Connected).unwrap();
    machine.stop().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (Link::Idle, SmMessage::Enter),
            (Link::Idle, SmMessage::Process(7, vec![1, 2])),
            (Link::Idle, SmMessage::Exit),
            (Link::Connected, SmMessage::Enter),
        ]
    );
}

#[test]
fn test_messages_before_start_are_dropped() {
    let machine = StateMachine::new("sm_unstarted").unwrap();
    let log: Log = Arc::default();
    recording(&machine, &log, Link::Idle);

    machine.send(1, vec![]).unwrap();
    machine.stop().unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(machine.state(), None);
    assert!(machine.send(1, vec![]).is_err());
}

#[test]
fn test_removed_state_is_not_invoked() {
    let machine = StateMachine::new("sm_remove").unwrap();
    let log: Log = Arc::default();
    recording(&machine, &log, Link::Idle);
    machine.remove_state(Link::Idle);

    machine.start(Link::Idle).unwrap();
    machine.stop().unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(machine.state(), Some(Link::Idle));
}

#[test]
fn test_handler_table() {
    let mut table: HandlerTable<u8, Vec<u8>> = HandlerTable::new();
    assert!(table.is_empty());

    assert!(!table.register(1, |msg: &mut Vec<u8>| msg.push(1)));
    assert!(!table.register(2, |msg: &mut Vec<u8>| msg.push(2)));
    assert!(table.register(2, |msg: &mut Vec<u8>| msg.push(22)));
    assert_eq!(table.len(), 2);
    assert!(table.contains(&1));

    let mut msg = Vec::new();
    assert!(table.invoke(&1, &mut msg));
    assert!(table.invoke(&2, &mut msg));
    assert!(!table.invoke(&3, &mut msg));
    assert_eq!(msg, vec![1, 22]);

    assert!(table.deregister(&1));
    assert!(!table.deregister(&1));
    assert!(!table.contains(&1));
}
