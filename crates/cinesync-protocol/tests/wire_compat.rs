// Verify wire format matches what the browser clients expect.
// These tests ensure protocol compatibility is never broken.

use cinesync_core::types::{ChangeAction, RatingChangeEvent, RealtimeEvent};
use cinesync_protocol::{WireFrame, SOURCE_NETWORK, SOURCE_SERVER};

#[test]
fn rating_frame_round_trip() {
    let json = r#"{"type":"rating-updated","entityId":"m1","value":4.0,"action":"create","actorId":"u1","occurredAt":1700000000000}"#;
    let frame = WireFrame::parse(json).unwrap();

    assert_eq!(frame.entity_id(), "m1");
    assert!(frame.is_valid());
    match &frame {
        WireFrame::RatingUpdated { event, source } => {
            assert_eq!(event.value, 4.0);
            assert_eq!(event.action, ChangeAction::Create);
            assert_eq!(event.actor_id, "u1");
            assert!(source.is_none());
        }
        _ => panic!("expected rating-updated"),
    }
}

#[test]
fn rating_frame_serialization_shape() {
    let mut event = RatingChangeEvent::new("m1", 4.5, ChangeAction::Update).with_actor("u7");
    event.occurred_at = 1700000000000;
    let frame = WireFrame::from(RealtimeEvent::Rating(event));
    let json = frame.to_json();

    assert!(json.contains(r#""type":"rating-updated""#));
    assert!(json.contains(r#""entityId":"m1""#));
    assert!(json.contains(r#""actorId":"u7""#));
    assert!(json.contains(r#""action":"update""#));
    // source must be absent until a relay hop stamps it
    assert!(!json.contains(r#""source""#));
}

#[test]
fn source_annotation_added_on_rebroadcast() {
    let json = r#"{"type":"rating-updated","entityId":"m1","value":3.0,"action":"delete","actorId":"u1","occurredAt":1}"#;
    let frame = WireFrame::parse(json).unwrap().with_source(SOURCE_NETWORK);

    assert_eq!(frame.source(), Some(SOURCE_NETWORK));
    assert!(frame.to_json().contains(r#""source":"network""#));

    let restamped = frame.with_source(SOURCE_SERVER);
    assert_eq!(restamped.source(), Some(SOURCE_SERVER));
}

#[test]
fn stats_frame_round_trip() {
    let json =
        r#"{"type":"rating-stats-updated","entityId":"m2","averageValue":4.2,"sampleCount":17}"#;
    let frame = WireFrame::parse(json).unwrap();

    match frame {
        WireFrame::StatsUpdated { event, .. } => {
            assert_eq!(event.entity_id, "m2");
            assert_eq!(event.sample_count, 17);
        }
        _ => panic!("expected rating-stats-updated"),
    }
}

#[test]
fn missing_actor_defaults_to_anonymous() {
    let json = r#"{"type":"rating-updated","entityId":"m1","value":2.0,"action":"update"}"#;
    let frame = WireFrame::parse(json).unwrap();

    match frame {
        WireFrame::RatingUpdated { event, .. } => {
            assert_eq!(event.actor_id, "anonymous");
        }
        _ => panic!("expected rating-updated"),
    }
}

#[test]
fn empty_entity_id_is_invalid() {
    let json = r#"{"type":"rating-updated","entityId":"","value":1.0,"action":"create","actorId":"u1","occurredAt":1}"#;
    let frame = WireFrame::parse(json).unwrap();
    assert!(!frame.is_valid());
}

#[test]
fn unknown_type_and_garbage_are_rejected() {
    assert!(WireFrame::parse(r#"{"type":"presence-ping"}"#).is_none());
    assert!(WireFrame::parse("not json at all").is_none());
}
