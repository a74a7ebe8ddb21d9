//! `topic_router` wildcard matching end to end (spec §4.5): `*` and `#`
//! combined in a single subscription set, plus priority-descending
//! dispatch across several matching subscribers.

use messaging_core::bus::{Message, MessagePriority, MessageType, TopicRouter};
use std::sync::{Arc, Mutex};

#[test]
fn hash_and_star_subscriptions_both_match_the_same_topic() {
    let router = TopicRouter::new();
    let hits: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let h1 = hits.clone();
    router.subscribe(
        "orders.#",
        MessagePriority::Low,
        Box::new(move |_m| {
            h1.lock().unwrap().push("hash");
            Ok(())
        }),
    );
    let h2 = hits.clone();
    router.subscribe(
        "orders.*.created",
        MessagePriority::High,
        Box::new(move |_m| {
            h2.lock().unwrap().push("star");
            Ok(())
        }),
    );

    let message = Message::new("orders.eu.created", MessageType::Event);
    router.route(&message).unwrap();

    // High-priority "star" subscriber runs before the low-priority
    // "hash" subscriber, even though both matched.
    assert_eq!(*hits.lock().unwrap(), vec!["star", "hash"]);
}

#[test]
fn star_does_not_cross_a_segment_boundary() {
    let router = TopicRouter::new();
    router.subscribe("a.*", MessagePriority::Normal, Box::new(|_m| Ok(())));

    let too_deep = Message::new("a.b.c", MessageType::Event);
    assert!(router.route(&too_deep).is_err());

    let just_right = Message::new("a.b", MessageType::Event);
    assert!(router.route(&just_right).is_ok());
}

#[test]
fn hash_alone_matches_the_bare_prefix_topic() {
    let router = TopicRouter::new();
    router.subscribe("logs.#", MessagePriority::Normal, Box::new(|_m| Ok(())));
    let bare = Message::new("logs", MessageType::Event);
    assert!(router.route(&bare).is_ok());
}

#[test]
fn unsubscribing_one_of_several_leaves_the_rest_routable() {
    let router = TopicRouter::new();
    let id_a = router.subscribe("x.*", MessagePriority::Normal, Box::new(|_m| Ok(())));
    let _id_b = router.subscribe("x.*", MessagePriority::Normal, Box::new(|_m| Ok(())));
    assert_eq!(router.subscription_count(), 2);

    router.unsubscribe(id_a);
    assert_eq!(router.subscription_count(), 1);

    let message = Message::new("x.y", MessageType::Event);
    assert!(router.route(&message).is_ok());
}
