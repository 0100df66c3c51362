use maple_host::packet::MaplePacket;
use maple_host::{
    Clock, HostConfig, MapleHostNode, MapleTiming, PumpProgress, SharedTxScheduler, TX_TIME_ASAP,
    Transmission, Transmitter, TransmitterHandle,
};
use maple_phy_interface::TxPacing;
use maple_phy_mock::{ManualClock, MockPhy, Reply, WireHandle};

type Scheduler = SharedTxScheduler<4, 8>;
type Node<'a> = MapleHostNode<'a, MockPhy, ManualClock, 4, 8>;

const T: TransmitterHandle = TransmitterHandle(7);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Started(u32),
    Complete {
        id: u32,
        command: u8,
        payload_len: usize,
    },
    Failed {
        id: u32,
        write: bool,
        read: bool,
    },
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl Transmitter for Recorder {
    fn tx_started(&mut self, tx: &Transmission) {
        assert_eq!(tx.transmitter, T);
        self.events.push(Event::Started(tx.id));
    }

    fn tx_complete(&mut self, response: &MaplePacket, tx: &Transmission) {
        self.events.push(Event::Complete {
            id: tx.id,
            command: response.frame.command,
            payload_len: response.payload.len(),
        });
    }

    fn tx_failed(&mut self, write_failed: bool, read_failed: bool, tx: &Transmission) {
        self.events.push(Event::Failed {
            id: tx.id,
            write: write_failed,
            read: read_failed,
        });
    }
}

fn timing() -> MapleTiming {
    MapleTiming {
        open_line_check_us: 0,
        ..MapleTiming::default()
    }
}

fn node<'a>(
    wire: &WireHandle,
    clock: &ManualClock,
    scheduler: &'a Scheduler,
    config: HostConfig,
) -> Node<'a> {
    let phy = MockPhy::new_with_wire(wire, clock.clone());
    MapleHostNode::new(phy, timing(), clock.clone(), scheduler, config)
}

fn poll_packet() -> MaplePacket {
    MaplePacket::from_payload(0x09, 0x20, 0x00, &[0x0100_0000]).unwrap()
}

#[test]
fn delivers_response_with_callbacks_in_order() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 0, 0)
        .unwrap();
    wire.push_reply(Reply::packet(0x0800_0001, &[0xCAFE_F00D]));

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
    assert_eq!(
        recorder.events,
        vec![
            Event::Started(id),
            Event::Complete {
                id,
                command: 0x08,
                payload_len: 1,
            },
        ]
    );
    assert_eq!(node.poll(&mut recorder), PumpProgress::Idle);
}

#[test]
fn reports_zero_length_response_when_none_expected() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), false, 0, 0, 0)
        .unwrap();

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
    assert_eq!(
        recorder.events,
        vec![
            Event::Started(id),
            Event::Complete {
                id,
                command: 0,
                payload_len: 0,
            },
        ]
    );
}

#[test]
fn silent_peer_fails_the_read_side() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 0, 0)
        .unwrap();
    wire.push_reply(Reply::Silence);

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    clock.advance(HostConfig::default().response_timeout_us + 1);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Failed);
    assert_eq!(
        recorder.events,
        vec![
            Event::Started(id),
            Event::Failed {
                id,
                write: false,
                read: true,
            },
        ]
    );
}

#[test]
fn hung_write_fails_the_write_side() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 0, 0)
        .unwrap();
    wire.set_hold_tx_end(true);

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    clock.advance(10_000);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Failed);
    assert_eq!(
        recorder.events,
        vec![
            Event::Started(id),
            Event::Failed {
                id,
                write: true,
                read: false,
            },
        ]
    );
}

#[test]
fn cancel_before_start_means_no_callbacks() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 0, 0)
        .unwrap();
    assert_eq!(scheduler.cancel_by_id(id), 1);

    assert_eq!(node.poll(&mut recorder), PumpProgress::Idle);
    assert!(recorder.events.is_empty());
    assert_eq!(wire.tx_count(), 0);
}

#[test]
fn auto_repeat_requeues_the_same_id_on_cadence() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(2)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 1_000, 0)
        .unwrap();
    wire.push_reply(Reply::packet(0x0800_0001, &[0x0000_0001]));

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
    // Re-added on the cadence, not immediately due.
    assert_eq!(node.poll(&mut recorder), PumpProgress::Idle);

    clock.advance(1_000);
    wire.push_reply(Reply::packet(0x0800_0001, &[0x0000_0002]));
    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);

    let started: Vec<_> = recorder
        .events
        .iter()
        .filter(|e| matches!(e, Event::Started(i) if *i == id))
        .collect();
    assert_eq!(started.len(), 2);
}

#[test]
fn mid_flight_cancel_suppresses_the_repeat_but_not_callbacks() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(2)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 1_000, 0)
        .unwrap();
    wire.push_reply(Reply::packet(0x0800_0001, &[0x0000_0001]));

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    // Already delivered to the pump: nothing queued to remove.
    assert_eq!(scheduler.cancel_by_id(id), 0);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
    assert_eq!(recorder.events.len(), 2);

    // And it was not re-added.
    clock.advance(10_000);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Idle);
    assert_eq!(scheduler.cancel_by_id(id), 0);
}

#[test]
fn auto_repeat_stops_at_its_end_time() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    node.endpoint(2)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 1_000, 500)
        .unwrap();
    wire.push_reply(Reply::packet(0x0800_0001, &[0x0000_0001]));

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    // Completion lands past the end time: no re-add.
    clock.advance(600);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
    clock.advance(10_000);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Idle);
}

#[test]
fn resend_request_retransmits_without_consulting_the_scheduler() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    let id = node
        .endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), true, 1, 0, 0)
        .unwrap();
    wire.push_reply(Reply::packet(0xFB00_0000, &[]));
    wire.push_reply(Reply::packet(0x0800_0001, &[0x1234_5678]));

    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    // The resend request keeps the transmission in flight and puts the very
    // same words back on the wire.
    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    let log = wire.take_tx_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].words, log[1].words);
    assert_eq!(log[0].crc, log[1].crc);

    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
    assert_eq!(
        recorder.events,
        vec![
            Event::Started(id),
            Event::Complete {
                id,
                command: 0x08,
                payload_len: 1,
            },
        ]
    );
}

#[test]
fn single_sender_shortcut_rewrites_addresses() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let config = HostConfig {
        sender_addr: 0x40,
        rewrite_sender: true,
        ..HostConfig::default()
    };
    let mut node = node(&wire, &clock, &scheduler, config);
    let mut recorder = Recorder::default();

    node.endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), false, 0, 0, 0)
        .unwrap();
    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);

    // Sender forced to the endpoint, recipient port bits aligned to it.
    let frame_word = wire.last_tx().unwrap().words[0];
    assert_eq!(frame_word, 0x0960_4001);
}

#[test]
fn full_partition_drops_the_repeat() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler: SharedTxScheduler<2, 1> = SharedTxScheduler::new();
    let phy = MockPhy::new_with_wire(&wire, clock.clone());
    let mut node: MapleHostNode<'_, MockPhy, ManualClock, 2, 1> = MapleHostNode::new(
        phy,
        timing(),
        clock.clone(),
        &scheduler,
        HostConfig::default(),
    );
    let mut recorder = Recorder::default();

    scheduler
        .add(0, TX_TIME_ASAP, T, poll_packet(), false, 0, 1_000, 0)
        .unwrap();
    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    // Someone fills the only slot while the repeat is in flight.
    scheduler
        .add(0, 5_000, T, poll_packet(), false, 0, 0, 0)
        .unwrap();

    assert_eq!(node.poll(&mut recorder), PumpProgress::RepeatDropped);
    assert_eq!(recorder.events.len(), 2);
}

#[test]
fn unsolicited_read_defers_the_schedule() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let mut node = node(&wire, &clock, &scheduler, HostConfig::default());
    let mut recorder = Recorder::default();

    node.endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), false, 0, 0, 0)
        .unwrap();

    // Someone is listening for client-mode traffic on this bus.
    wire.push_reply(Reply::packet(0x0920_4001, &[0x0100_0000]));
    node.bus().start_read(1_000).unwrap();
    assert_eq!(node.poll(&mut recorder), PumpProgress::Idle);
    assert!(recorder.events.is_empty());

    let status = node.bus().process_events(clock.now_us());
    assert_eq!(status.phase, maple_host::Phase::ReadComplete);

    // With the bus idle again the schedule drains normally.
    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    assert_eq!(node.poll(&mut recorder), PumpProgress::Delivered);
}

#[test]
fn pacing_config_reaches_the_backend() {
    let wire = WireHandle::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::new();
    let pacing = TxPacing {
        delay_us: 100,
        first_word_chunk: 2,
        second_word_chunk: 4,
    };
    let config = HostConfig {
        pacing,
        ..HostConfig::default()
    };
    let mut node = node(&wire, &clock, &scheduler, config);
    let mut recorder = Recorder::default();

    node.endpoint(1)
        .add(TX_TIME_ASAP, T, poll_packet(), false, 0, 0, 0)
        .unwrap();
    assert_eq!(node.poll(&mut recorder), PumpProgress::InFlight);
    assert_eq!(wire.last_tx().unwrap().pacing, pacing);
}
