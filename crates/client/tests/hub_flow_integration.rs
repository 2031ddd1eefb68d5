// End-to-end client flow: scripted transport -> session -> hub ->
// subscribers and offline cache.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use roomline_client::cache::{CacheDb, OfflineCache};
use roomline_client::hub::{HubEvent, HubSubscriber, SubscriptionHub};
use roomline_client::session::{ChatTransport, SessionEvent, SessionState, SocketSession};
use roomline_common::protocol::ws::ChatEvent;
use roomline_common::types::Message;

const TEST_URL: &str = "ws://127.0.0.1:8080/v1/ws";

#[derive(Debug, Default)]
struct ScriptedTransport {
    recv_queue: VecDeque<Option<ChatEvent>>,
    sent: Vec<ChatEvent>,
}

impl ScriptedTransport {
    fn with_handshake() -> Self {
        let mut transport = Self::default();
        transport.recv_queue.push_back(Some(ChatEvent::HelloAck {
            conn_id: Uuid::new_v4(),
            server_time: Utc::now().to_rfc3339(),
        }));
        transport
    }

    fn queue(&mut self, event: ChatEvent) {
        self.recv_queue.push_back(Some(event));
    }
}

impl ChatTransport for ScriptedTransport {
    fn connect(&mut self, _ws_url: &str) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, event: &ChatEvent) -> Result<()> {
        self.sent.push(event.clone());
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<ChatEvent>> {
        Ok(self.recv_queue.pop_front().flatten())
    }

    fn close(&mut self) {}
}

struct BodyRecorder {
    bodies: Rc<RefCell<Vec<String>>>,
}

impl HubSubscriber for BodyRecorder {
    fn on_new_message(&self, message: &Message) {
        self.bodies.borrow_mut().push(message.body.clone());
    }
}

fn message(sender: Uuid, receiver: Uuid, body: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        sender_id: sender,
        receiver_id: receiver,
        body: body.to_string(),
        is_read: false,
        created_at: Utc::now(),
    }
}

/// Drain the session into the hub the way an app event loop would.
fn pump(session: &mut SocketSession<ScriptedTransport>, hub: &mut SubscriptionHub) {
    while let Ok(Some(event)) = session.next_event() {
        if let Some(hub_event) = HubEvent::from_session(event.clone()) {
            hub.deliver(hub_event);
        }
        if matches!(event, SessionEvent::Dropped { .. }) {
            break;
        }
    }
}

#[test]
fn two_messages_arrive_in_send_order_and_land_in_the_cache() {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let mut session = SocketSession::new(TEST_URL, ScriptedTransport::with_handshake());
    session.set_auth_token(Some("jwt".into()));
    assert!(matches!(session.connect().unwrap(), SessionEvent::Connected { .. }));

    let bodies = Rc::new(RefCell::new(Vec::new()));
    let mut hub = SubscriptionHub::new(OfflineCache::in_memory());
    hub.initialize();
    hub.subscribe(Box::new(BodyRecorder { bodies: Rc::clone(&bodies) }));

    let first = message(alice, bob, "hi, about the studio");
    let second = message(alice, bob, "is it still free in May?");
    session.transport_mut().queue(ChatEvent::NewMessage { message: first.clone() });
    session.transport_mut().queue(ChatEvent::NewMessage { message: second.clone() });

    pump(&mut session, &mut hub);

    assert_eq!(*bodies.borrow(), vec!["hi, about the studio", "is it still free in May?"]);
    let cached = hub.cache().messages();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0].id, first.id);
    assert_eq!(cached[1].id, second.id);
}

#[test]
fn redundant_channels_reach_subscribers_twice_but_cache_once() {
    let msg = message(Uuid::new_v4(), Uuid::new_v4(), "double delivery");

    let mut session = SocketSession::new(TEST_URL, ScriptedTransport::with_handshake());
    session.set_auth_token(Some("jwt".into()));
    session.connect().unwrap();

    let bodies = Rc::new(RefCell::new(Vec::new()));
    let mut hub = SubscriptionHub::new(OfflineCache::in_memory());
    hub.initialize();
    hub.subscribe(Box::new(BodyRecorder { bodies: Rc::clone(&bodies) }));

    session.transport_mut().queue(ChatEvent::NewMessage { message: msg.clone() });
    session.transport_mut().queue(ChatEvent::NewUserMessage { message: msg.clone() });

    pump(&mut session, &mut hub);

    // Subscribers dedupe by id themselves; the cache already has.
    assert_eq!(bodies.borrow().len(), 2);
    assert_eq!(hub.cache().len(), 1);
}

#[test]
fn connection_close_reaches_subscribers_as_disconnected() {
    struct DropRecorder {
        reasons: Rc<RefCell<Vec<String>>>,
    }
    impl HubSubscriber for DropRecorder {
        fn on_disconnected(&self, reason: &str) {
            self.reasons.borrow_mut().push(reason.to_string());
        }
    }

    let mut session = SocketSession::new(TEST_URL, ScriptedTransport::with_handshake());
    session.set_auth_token(Some("jwt".into()));
    session.connect().unwrap();

    let reasons = Rc::new(RefCell::new(Vec::new()));
    let mut hub = SubscriptionHub::new(OfflineCache::in_memory());
    hub.initialize();
    hub.subscribe(Box::new(DropRecorder { reasons: Rc::clone(&reasons) }));

    // Scripted queue is empty -> transport reports a clean close.
    pump(&mut session, &mut hub);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(reasons.borrow().len(), 1);
}

#[test]
fn cached_messages_survive_an_app_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("offline.db");
    let msg = message(Uuid::new_v4(), Uuid::new_v4(), "persisted");

    {
        let mut hub = SubscriptionHub::new(OfflineCache::with_db(CacheDb::open(&path).unwrap()));
        hub.initialize();
        hub.deliver(HubEvent::NewMessage(msg.clone()));
    }

    // New process: a fresh hub over the same storage sees the message
    // without any screen having been mounted when it arrived.
    let hub = SubscriptionHub::new(OfflineCache::with_db(CacheDb::open(&path).unwrap()));
    let cached = hub.cache().messages();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, msg.id);
}
