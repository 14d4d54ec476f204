use std::sync::Arc;

use parcelsim_core::{Timestamp, WaybillId, WorkerId};
use parcelsim_events::{ChannelName, EventBus, EventEnvelope, InMemoryEventBus, SimEvent, wire};
use parcelsim_projections::{ChatContext, DashboardTables, FloorView, attach};
use parcelsim_simulation::{InitialSnapshot, ParcelRecord, ParcelStatus, WarehouseState, WorkerStatus};

type Bus = Arc<InMemoryEventBus<EventEnvelope<SimEvent>>>;

fn seeded_state() -> WarehouseState {
    let snapshot = InitialSnapshot::new(vec![
        ParcelRecord::pending(WaybillId::new("W1").unwrap(), Timestamp::EPOCH, 12_000.0),
        ParcelRecord::pending(WaybillId::new("W2").unwrap(), Timestamp::EPOCH, 3_000.0),
    ]);
    WarehouseState::from_snapshot(&WorkerId::roster("AB", 10), &snapshot).unwrap()
}

fn publish_wire(bus: &Bus, seq: u64, json: &str) {
    assert!(wire::publish_wire(bus, &ChannelName::warehouse(), seq, json));
}

#[test]
fn wire_messages_drive_every_consumer_to_the_same_state() {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let channel = ChannelName::warehouse();

    let floor = attach(&bus, &channel, FloorView::new(seeded_state(), 100.0, 0.02));
    let tables = attach(&bus, &channel, DashboardTables::new(seeded_state()));
    let chat = attach(&bus, &channel, ChatContext::new(seeded_state()));

    publish_wire(&bus, 1, r#"{"msg":"하차된 물건","category":"PROCESS","ts":1000,"waybillId":"W1"}"#);
    publish_wire(
        &bus,
        2,
        r#"{"msg":"작업자 처리","category":"PROCESS","ts":2000,"workerId":"A1","waybillId":"W1","operatorId":7,"operatorName":"Kim"}"#,
    );
    publish_wire(
        &bus,
        3,
        r#"{"msg":"작업자 고장","category":"ALARM","severity":"CRITICAL","ts":3000,"workerId":"A2","brokenUntil":13000}"#,
    );

    let w1 = WaybillId::new("W1").unwrap();
    let a1 = WorkerId::new("A1").unwrap();
    let a2 = WorkerId::new("A2").unwrap();

    tables.read(|t| {
        let parcels = t.state().parcels();
        assert_eq!(parcels.get(&w1).unwrap().status(), ParcelStatus::Normal);
        assert_eq!(parcels.count(ParcelStatus::Accident), 0);
        assert_eq!(t.state().workers().get(&a1).unwrap().processed_count(), 1);
        assert_eq!(t.state().workers().get(&a2).unwrap().status(), WorkerStatus::Broken);
    });

    let floor_state = floor.read(|f| f.state().clone());
    let chat_state = chat.read(|c| c.state().clone());
    tables.read(|t| {
        assert_eq!(t.state().parcels(), floor_state.parcels());
        assert_eq!(t.state().workers(), floor_state.workers());
        assert_eq!(t.state().parcels(), chat_state.parcels());
        assert_eq!(t.state().workers(), chat_state.workers());
    });

    let context = chat.update(|c| c.refresh(Timestamp::from_millis(4_000)).map(|s| s.render()));
    let context = context.unwrap();
    assert!(context.contains("A2 BROKEN"));
    assert!(context.contains("NORMAL count=1 declaredValue=12000"));
    assert!(context.contains("작업자 고장"));
}

#[test]
fn redelivered_envelopes_are_applied_once() {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let channel = ChannelName::warehouse();
    let tables = attach(&bus, &channel, DashboardTables::new(seeded_state()));

    let unloaded = EventEnvelope::new(
        channel.clone(),
        1,
        SimEvent::Unloaded {
            waybill_id: WaybillId::new("W1").unwrap(),
            at: Timestamp::from_millis(10),
        },
    );
    bus.publish(&channel, unloaded.clone()).unwrap();
    bus.publish(&channel, unloaded).unwrap();

    assert_eq!(tables.cursor().map(|c| c.last_sequence_number()), Some(1));
    tables.read(|t| assert_eq!(t.parcel_summary().get(ParcelStatus::Unloaded).unwrap().count, 1));
}

#[test]
fn malformed_messages_never_reach_consumers() {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let channel = ChannelName::warehouse();
    let floor = attach(&bus, &channel, FloorView::new(seeded_state(), 100.0, 0.02));
    let tables = attach(&bus, &channel, DashboardTables::new(seeded_state()));
    let chat = attach(&bus, &channel, ChatContext::new(seeded_state()));

    publish_wire(&bus, 1, r#"{"msg":"하차된 물건","ts":1000,"waybillId":"W1"}"#);
    let before = tables.read(|t| t.state().clone());

    for (seq, json) in [
        (2, r#"{"msg":"작업자 처리","workerId":"A1"}"#),
        (3, r#"{"msg":"모르는 메시지"}"#),
        (4, "not json"),
        (5, r#"{"msg":"하차된 물건","ts":"soon","waybillId":"W2"}"#),
    ] {
        assert!(!wire::publish_wire(&bus, &channel, seq, json));
    }

    for cursor in [floor.cursor(), tables.cursor(), chat.cursor()] {
        assert_eq!(cursor.map(|c| c.last_sequence_number()), Some(1));
    }
    for state in [
        tables.read(|t| t.state().clone()),
        floor.read(|f| f.state().clone()),
        chat.read(|c| c.state().clone()),
    ] {
        assert_eq!(state.parcels(), before.parcels());
        assert_eq!(state.workers(), before.workers());
    }
    assert_eq!(floor.read(|f| f.ticker().count()), 1);
}

#[test]
fn extreme_wire_timestamps_do_not_break_the_floor_view() {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let floor = attach(&bus, &ChannelName::warehouse(), FloorView::new(seeded_state(), 100.0, 0.02));

    publish_wire(&bus, 1, r#"{"msg":"하차된 물건","waybillId":"W1","ts":-9223372036854775808}"#);

    let frame = floor.update(|f| f.frame(Timestamp::from_millis(1_000)));
    let w1 = frame.parcels.iter().find(|p| p.waybill_id.as_str() == "W1").unwrap();
    assert_eq!(w1.position, Some(1.0));
}

#[test]
fn unknown_ids_on_the_wire_are_ignored() {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let tables = attach(&bus, &ChannelName::warehouse(), DashboardTables::new(seeded_state()));

    publish_wire(&bus, 1, r#"{"msg":"하차된 물건","ts":5,"waybillId":"NOPE"}"#);
    publish_wire(&bus, 2, r#"{"msg":"작업 종료","ts":6,"workerId":"Z9"}"#);

    tables.read(|t| {
        assert_eq!(t.parcel_summary().get(ParcelStatus::PendingUnload).unwrap().count, 2);
        assert_eq!(t.worker_summary().idle, 20);
    });
}
