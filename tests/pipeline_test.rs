//! End-to-end tests for the receiver pipeline on the simulated radio

#[cfg(not(target_os = "espidf"))]
mod pipeline_tests {
    use csi_link::capture::{CaptureCore, Emitter};
    use csi_link::link::{AssociationManager, LivenessSignal, RetryPolicy, KEEPALIVE_PAYLOAD};
    use csi_link::radio::{CsiRecord, LinkStatus, SimRadio, SyntheticPeer};
    use csi_link::receiver::{CsiReceiver, Tick};
    use csi_link::stats::create_shared_stats;
    use macaddr::MacAddr6;
    use std::net::UdpSocket;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    const PEER: [u8; 6] = [0x84, 0x1F, 0xE8, 0x67, 0xF6, 0xAD];
    const STRANGER: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            poll_interval: Duration::from_millis(1),
            polls_per_attempt: 20,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts: Some(5),
        }
    }

    /// Parse the payload list back out of an emitted line.
    fn parse_payload(line: &str) -> Vec<i8> {
        let (_, data) = line
            .split_once("Packet Data: ")
            .expect("line has a payload section");
        data.split(", ")
            .map(|s| s.parse().expect("payload entry is an integer"))
            .collect()
    }

    #[test]
    fn test_reference_event_sequence() {
        let stats = create_shared_stats();
        let peer: MacAddr6 = "84:1F:E8:67:F6:AD".parse().unwrap();
        let (core, queue) = CaptureCore::new(peer, 64, stats.clone());
        let radio = SimRadio::new(0);
        let handle = radio.handle();
        let mut association = AssociationManager::new(
            radio,
            "CSI_PROJECT_NETWORK",
            "passwordhardlikeassembly",
            Arc::new(core),
            fast_policy(),
            stats.clone(),
        );
        association.establish(&AtomicBool::new(true)).unwrap();

        handle.deliver(&CsiRecord::new(PEER, -45, &[1, -2, 127]));
        handle.deliver(&CsiRecord::new([0, 0, 0, 0, 0, 1], -45, &[1, -2, 127]));
        handle.deliver(&CsiRecord::new(PEER, -45, &[]));
        handle.deliver(&CsiRecord::new(PEER, -60, &[5]));

        let mut emitter = Emitter::new(queue, Vec::new(), stats.clone());
        assert_eq!(emitter.emit_pending(), 2);
        let output = String::from_utf8(emitter.into_writer()).unwrap();
        assert_eq!(
            output,
            "[CSI DATA] Packet no. 0, RSSI -45, Length 3, Packet Data: 1, -2, 127\n\
             [CSI DATA] Packet no. 1, RSSI -60, Length 1, Packet Data: 5\n"
        );
    }

    #[test]
    fn test_only_peer_frames_reach_output() {
        let stats = create_shared_stats();
        let (core, queue) = CaptureCore::new(MacAddr6::from(PEER), 64, stats.clone());
        let radio = SimRadio::new(2);
        let handle = radio.handle();
        let mut association = AssociationManager::new(
            radio,
            "CSI_PROJECT_NETWORK",
            "passwordhardlikeassembly",
            Arc::new(core),
            fast_policy(),
            stats.clone(),
        );
        let running = AtomicBool::new(true);
        association.establish(&running).unwrap();

        let first: Vec<i8> = vec![12, -3, 7];
        assert!(handle.deliver(&CsiRecord::new(PEER, -52, &first)));
        assert!(handle.deliver(&CsiRecord::new(STRANGER, -30, &[9, 9, 9, 9])));
        assert!(handle.deliver(&CsiRecord::new(PEER, -60, &[])));
        assert!(handle.deliver(&CsiRecord::new(PEER, -49, &[-128, 127])));

        let mut emitter = Emitter::new(queue, Vec::new(), stats.clone());
        assert_eq!(emitter.emit_pending(), 2);

        let output = String::from_utf8(emitter.into_writer()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "[CSI DATA] Packet no. 0, RSSI -52, Length 3, Packet Data: 12, -3, 7"
        );
        assert_eq!(
            lines[1],
            "[CSI DATA] Packet no. 1, RSSI -49, Length 2, Packet Data: -128, 127"
        );
        assert_eq!(parse_payload(lines[0]), first);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_admitted, 2);
        assert_eq!(snapshot.frames_emitted, 2);
        assert_eq!(snapshot.frames_dropped, 0);
    }

    #[test]
    fn test_full_queue_drops_without_sequence_gaps() {
        let stats = create_shared_stats();
        let (core, queue) = CaptureCore::new(MacAddr6::from(PEER), 2, stats.clone());
        let radio = SimRadio::new(0);
        let handle = radio.handle();
        let mut association = AssociationManager::new(
            radio,
            "CSI_PROJECT_NETWORK",
            "passwordhardlikeassembly",
            Arc::new(core),
            fast_policy(),
            stats.clone(),
        );
        association.establish(&AtomicBool::new(true)).unwrap();

        for rssi in [-40, -41, -42] {
            handle.deliver(&CsiRecord::new(PEER, rssi, &[1]));
        }

        let mut emitter = Emitter::new(queue, Vec::new(), stats.clone());
        assert_eq!(emitter.emit_pending(), 2);
        handle.deliver(&CsiRecord::new(PEER, -43, &[2]));
        assert_eq!(emitter.emit_pending(), 1);

        let output = String::from_utf8(emitter.into_writer()).unwrap();
        let sequences: Vec<&str> = output
            .lines()
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(
            sequences,
            vec![
                "[CSI DATA] Packet no. 0",
                "[CSI DATA] Packet no. 1",
                "[CSI DATA] Packet no. 2",
            ]
        );
        assert!(output.contains("RSSI -43"));
        assert!(!output.contains("RSSI -42"));
        assert_eq!(stats.snapshot().frames_dropped, 1);
    }

    #[test]
    fn test_keepalive_datagrams_over_udp() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let stats = create_shared_stats();
        let liveness = LivenessSignal::new(sender, listener.local_addr().unwrap(), stats.clone());

        assert!(!liveness.pulse(LinkStatus::Disconnected));
        let mut buf = [0u8; 16];
        assert!(listener.recv_from(&mut buf).is_err());

        assert!(liveness.pulse(LinkStatus::Connected));
        let (n, _) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], KEEPALIVE_PAYLOAD);
        assert_eq!(stats.snapshot().keepalives_sent, 1);
    }

    #[test]
    fn test_capture_resumes_after_reconnect() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let stats = create_shared_stats();
        let (core, queue) = CaptureCore::new(MacAddr6::from(PEER), 64, stats.clone());
        let radio = SimRadio::new(1);
        let handle = radio.handle();
        let association = AssociationManager::new(
            radio,
            "CSI_PROJECT_NETWORK",
            "passwordhardlikeassembly",
            Arc::new(core),
            fast_policy(),
            stats.clone(),
        );
        let liveness = LivenessSignal::new(sender, listener.local_addr().unwrap(), stats.clone());
        let mut receiver = CsiReceiver::new(association, liveness, Duration::ZERO);
        let running = AtomicBool::new(true);

        receiver.start(&running).unwrap();
        handle.deliver(&CsiRecord::new(PEER, -45, &[1]));

        handle.drop_link();
        assert!(!handle.is_csi_armed());
        assert_eq!(receiver.tick(&running).unwrap(), Tick::Recovered);
        assert!(handle.is_csi_armed());

        handle.deliver(&CsiRecord::new(PEER, -46, &[2]));
        assert_eq!(
            receiver.tick(&running).unwrap(),
            Tick::Pulsed { delivered: true }
        );

        let mut emitter = Emitter::new(queue, Vec::new(), stats.clone());
        assert_eq!(emitter.emit_pending(), 2);
        assert_eq!(stats.snapshot().reconnects, 1);
        assert_eq!(stats.snapshot().keepalives_sent, 1);
    }

    #[test]
    fn test_synthetic_peer_stream_is_filtered() {
        let stats = create_shared_stats();
        let (core, queue) = CaptureCore::new(MacAddr6::from(PEER), 10_000, stats.clone());
        let radio = SimRadio::new(0);
        let handle = radio.handle();
        let mut association = AssociationManager::new(
            radio,
            "CSI_PROJECT_NETWORK",
            "passwordhardlikeassembly",
            Arc::new(core),
            fast_policy(),
            stats.clone(),
        );
        association.establish(&AtomicBool::new(true)).unwrap();

        let mut peer = SyntheticPeer::new(handle, PEER, Duration::from_millis(1));
        peer.start();
        let deadline = Instant::now() + Duration::from_secs(5);
        while peer.frames_delivered() < 30 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        peer.stop();
        let delivered = peer.frames_delivered();
        assert!(delivered >= 30);

        let mut emitter = Emitter::new(queue, Vec::new(), stats.clone());
        let emitted = emitter.emit_pending() as u64;
        assert!(emitted > 0);
        assert!(emitted < delivered);
        assert_eq!(emitted, stats.snapshot().frames_admitted);

        let output = String::from_utf8(emitter.into_writer()).unwrap();
        for (seq, line) in output.lines().enumerate() {
            assert!(line.starts_with(&format!("[CSI DATA] Packet no. {seq}, RSSI -")));
            assert!(line.contains("Length 128,"));
            assert_eq!(parse_payload(line).len(), 128);
        }
    }
}
