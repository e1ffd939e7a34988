use std::sync::Arc;

use frame99::{
    hardware::simulation::{RecordingHost, SimulatedCanBus},
    protocol::{decode_can_frame, FRAME_BUFFER_SIZE},
    CanBitrate, CanFrame, EcuIds, Frame99Error, ProtocolSession, ResultCode, SessionConfig,
};

fn setup() -> (ProtocolSession, SimulatedCanBus, Arc<RecordingHost>) {
    let _ = env_logger::try_init();
    let bus = SimulatedCanBus::new();
    let host = Arc::new(RecordingHost::new());
    let session = ProtocolSession::new(
        SessionConfig {
            flow_control_timeout_ms: 100,
            ..Default::default()
        },
        Box::new(bus.clone()),
        host.clone(),
    )
    .expect("valid config");
    bus.attach(session.router());
    (session, bus, host)
}

fn cmd(code: u8, body: &[u8]) -> Vec<u8> {
    let mut v = vec![0x99, 0x33, 0x22, code];
    v.extend_from_slice(body);
    v
}

fn single_frame_cmd() -> Vec<u8> {
    cmd(0x11, &[0x00, 0x02, 0x3E, 0x00])
}

#[test]
fn resync_after_garbage_byte() {
    let (mut session, bus, host) = setup();
    let mut bytes = vec![0xFF];
    bytes.extend(single_frame_cmd());
    session.feed(&bytes).unwrap();
    assert_eq!(bus.sent_frames().len(), 1);
    assert_eq!(host.responses(), vec![(0x11, ResultCode::Ack)]);
}

#[test]
fn resync_across_feeds() {
    let (mut session, bus, host) = setup();
    session.feed(&[0x00, 0x99, 0x99]).unwrap();
    session.feed(&[0x33]).unwrap();
    assert!(host.frames().is_empty());
    for b in single_frame_cmd() {
        session.feed(&[b]).unwrap();
    }
    assert_eq!(bus.sent_frames().len(), 1);
    assert_eq!(host.responses(), vec![(0x11, ResultCode::Ack)]);
    assert_eq!(session.buffered_len(), 0);
}

#[test]
fn overflow_processes_nothing() {
    let (mut session, bus, host) = setup();
    let mut bytes = single_frame_cmd();
    bytes.resize(FRAME_BUFFER_SIZE + 1, 0);
    let err = session.feed(&bytes).unwrap_err();
    assert!(matches!(err, Frame99Error::BufferOverflow { .. }));
    assert_eq!(session.buffered_len(), 0);
    assert!(bus.sent_frames().is_empty());
    assert!(host.frames().is_empty());

    // Session keeps working afterwards
    session.feed(&single_frame_cmd()).unwrap();
    assert_eq!(host.responses(), vec![(0x11, ResultCode::Ack)]);
}

#[test]
fn overflow_counts_buffered_bytes() {
    let (mut session, _, host) = setup();
    // Header and a length of 8192, payload still incomplete
    session.feed(&cmd(0x11, &[0x20, 0x00])).unwrap();
    session.feed(&vec![0x01; 8000]).unwrap();
    assert!(session.feed(&[0x01; 300]).is_err());
    assert_eq!(session.buffered_len(), 0);
    assert!(host.frames().is_empty());
}

#[test]
fn oversized_payload_length_is_nak() {
    let (mut session, bus, host) = setup();
    session.feed(&cmd(0x11, &[0x20, 0x01, 0x00])).unwrap();
    assert!(bus.sent_frames().is_empty());
    assert_eq!(host.responses(), vec![(0x11, ResultCode::Nak)]);
    assert_eq!(session.buffered_len(), 0);
}

#[test]
fn unknown_command_is_nak() {
    let (mut session, _, host) = setup();
    session.feed(&cmd(0x42, &[0x00])).unwrap();
    assert_eq!(host.frames(), vec![vec![0x99, 0x33, 0x22, 0x01, 0x42, 0x00]]);
    assert_eq!(session.buffered_len(), 0);
}

#[test]
fn trailing_bytes_after_command_are_dropped() {
    let (mut session, bus, host) = setup();
    let mut bytes = single_frame_cmd();
    bytes.extend(single_frame_cmd());
    session.feed(&bytes).unwrap();
    assert_eq!(bus.sent_frames().len(), 1);
    assert_eq!(host.responses().len(), 1);
    assert_eq!(session.buffered_len(), 0);
}

#[test]
fn scenario_c_set_ecu_ids() {
    let (mut session, bus, host) = setup();
    session
        .feed(&cmd(0x04, &[0, 0, 0x07, 0xE0, 0, 0, 0x07, 0xE8]))
        .unwrap();
    assert_eq!(
        session.ecu_ids(),
        EcuIds {
            rx_id: 0x7E0,
            tx_id: 0x7E8
        }
    );

    bus.set_responder(|f| {
        if f.raw_data()[0] & 0xF0 == 0x10 {
            vec![
                // Flow control from the previous TX ID is not ours
                CanFrame::new(0x7DF, &[0x30, 0, 0], false),
                CanFrame::new(0x7E8, &[0x30, 0, 0], false),
            ]
        } else {
            vec![]
        }
    });
    session.feed(&single_frame_cmd()).unwrap();
    session.feed(&cmd(0x11, &[0x00, 0x0A, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9])).unwrap();

    let sent = bus.sent_frames();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|f| f.id() == 0x7E0 && !f.is_extended()));
    assert_eq!(
        host.responses(),
        vec![
            (0x04, ResultCode::Ack),
            (0x11, ResultCode::Ack),
            (0x11, ResultCode::Ack)
        ]
    );
    assert_eq!(host.forwarded(), vec![CanFrame::new(0x7DF, &[0x30, 0, 0], false)]);
}

#[test]
fn can_enable_disable() {
    let (mut session, bus, host) = setup();
    session.feed(&cmd(0x02, &[0x00])).unwrap();
    assert!(!bus.is_enabled());
    session.feed(&cmd(0x02, &[0x01])).unwrap();
    assert!(bus.is_enabled());
    session.feed(&cmd(0x02, &[0x02])).unwrap();
    assert!(bus.is_enabled());
    assert_eq!(
        host.responses(),
        vec![
            (0x02, ResultCode::Ack),
            (0x02, ResultCode::Ack),
            (0x02, ResultCode::Nak)
        ]
    );
}

#[test]
fn set_bitrate() {
    let (mut session, bus, host) = setup();
    // Simulated controller refuses speed changes while running
    session.feed(&cmd(0x03, &[0x08])).unwrap();
    session.feed(&cmd(0x02, &[0x00])).unwrap();
    session.feed(&cmd(0x03, &[0x08])).unwrap();
    session.feed(&cmd(0x03, &[0x0B])).unwrap();
    assert_eq!(bus.bitrate(), Some(CanBitrate::Kbps500));
    assert_eq!(
        host.responses(),
        vec![
            (0x03, ResultCode::Nak),
            (0x02, ResultCode::Ack),
            (0x03, ResultCode::Ack),
            (0x03, ResultCode::Nak)
        ]
    );
}

#[test]
fn raw_can_frame_is_sent_verbatim() {
    let (mut session, bus, host) = setup();
    session
        .feed(&cmd(0x21, &[0x18, 0xDB, 0x33, 0xF1, 0x00, 0x03, 0x02, 0x01, 0x0C]))
        .unwrap();
    session.feed(&cmd(0x21, &[0, 0, 0x01, 0x23, 0x01, 0x00])).unwrap();
    let sent = bus.sent_frames();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], CanFrame::new(0x18DB_33F1, &[0x02, 0x01, 0x0C], true));
    assert!(sent[1].is_rtr());
    assert_eq!(sent[1].dlc(), 0);
    assert_eq!(
        host.responses(),
        vec![(0x21, ResultCode::Ack), (0x21, ResultCode::Ack)]
    );
}

#[test]
fn raw_can_frame_errors_are_nak() {
    let (mut session, bus, host) = setup();
    session.feed(&cmd(0x21, &[0, 0, 0x07, 0xE0, 0x00, 0x09])).unwrap();
    session.feed(&cmd(0x02, &[0x00])).unwrap();
    session.feed(&cmd(0x21, &[0, 0, 0x07, 0xE0, 0x00, 0x01, 0xAB])).unwrap();
    assert!(bus.sent_frames().is_empty());
    assert_eq!(
        host.responses(),
        vec![
            (0x21, ResultCode::Nak),
            (0x02, ResultCode::Ack),
            (0x21, ResultCode::Nak)
        ]
    );
}

#[test]
fn bus_traffic_round_trips_to_host() {
    let (session, bus, host) = setup();
    let frames = [
        CanFrame::new(0x7E8, &[0x06, 0x41, 0x00, 0xBE, 0x3F, 0xA8, 0x13], false),
        CanFrame::new(0x18DA_F110, &[0x03, 0x7F, 0x22, 0x78], true),
        CanFrame::new(0x100, &[], false).with_rtr(true),
    ];
    for f in frames {
        bus.inject(f);
    }
    let wire = host.frames();
    assert_eq!(wire.len(), 3);
    for (bytes, f) in wire.iter().zip(frames) {
        assert_eq!(&bytes[..4], &[0x99, 0x33, 0x22, 0x20]);
        assert_eq!(decode_can_frame(bytes), Some(f));
    }
    assert!(!session.router().is_awaiting_flow_control());
}

#[test]
fn responses_go_through_mpsc_sink() {
    let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
    let bus = SimulatedCanBus::new();
    let mut session =
        ProtocolSession::new(SessionConfig::default(), Box::new(bus), Arc::new(tx)).unwrap();
    session.feed(&cmd(0x05, &[0x00])).unwrap();
    assert_eq!(rx.recv().unwrap(), vec![0x99, 0x33, 0x22, 0x01, 0x05, 0x01]);
}
