use super::*;
use crate::module::module_test::{packet, Collector};
use std::sync::{Arc, Mutex};

/// Module that counts invocations and passes packets through.
struct Probe {
    calls: Arc<Mutex<usize>>,
}

impl Module for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn process_packets(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        *self.calls.lock()? += 1;
        Ok(packets)
    }
}

#[test]
fn test_match_dtls_range() {
    for b in 0..=255u8 {
        assert_eq!(match_dtls(&[b]), (20..=63).contains(&b), "byte {b}");
    }
    assert!(!match_dtls(&[]));
}

#[test]
fn test_match_funcs() {
    let tests = vec![
        (0u8, true, false, false),
        (3, true, false, false),
        (4, false, false, false),
        (19, false, false, false),
        (20, false, true, false),
        (63, false, true, false),
        (64, false, false, false),
        (127, false, false, false),
        (128, false, false, true),
        (191, false, false, true),
        (192, false, false, false),
    ];

    for (b, stun, dtls, srtp) in tests {
        assert_eq!(match_stun(&[b]), stun, "stun {b}");
        assert_eq!(match_dtls(&[b]), dtls, "dtls {b}");
        assert_eq!(match_srtp(&[b]), srtp, "srtp {b}");
    }
}

#[test]
fn test_dtls_path_classification_over_all_bytes() -> Result<()> {
    let (collector, seen) = Collector::new("dtls-receiver");
    let mut demuxer = Demuxer::new("demuxer").with_packet_path(PacketPath::new(
        "dtls",
        |p: &Packet| match_dtls(p.payload()),
        ModuleChain::new("dtls").with_module(Box::new(collector)),
    ));

    let packets: Vec<Packet> = (0..=255u8).map(|b| packet(&[b, 0xaa])).collect();
    for p in &packets {
        let expected = (20..=63).contains(&p.first_byte().unwrap_or(0));
        assert_eq!(demuxer.classify(p).is_some(), expected);
    }

    let out = demuxer.process_packets(packets)?;
    assert!(out.is_empty());

    let routed: Vec<u8> = seen.lock()?.iter().filter_map(|p| p.first_byte()).collect();
    assert_eq!(routed, (20..=63).collect::<Vec<u8>>());

    Ok(())
}

#[test]
fn test_first_match_wins() -> Result<()> {
    let (first, first_seen) = Collector::new("first");
    let (second, second_seen) = Collector::new("second");
    let mut demuxer = Demuxer::new("demuxer")
        .with_packet_path(PacketPath::new(
            "always",
            |_: &Packet| true,
            ModuleChain::new("always").with_module(Box::new(first)),
        ))
        .with_packet_path(PacketPath::new(
            "never",
            |_: &Packet| false,
            ModuleChain::new("never").with_module(Box::new(second)),
        ));

    assert_eq!(demuxer.path_names(), vec!["always", "never"]);

    demuxer.process_packets(vec![packet(&[1]), packet(&[22]), packet(&[200])])?;

    assert_eq!(first_seen.lock()?.len(), 3);
    assert!(second_seen.lock()?.is_empty());

    Ok(())
}

#[test]
fn test_overlapping_paths_registration_order() -> Result<()> {
    let (wide, wide_seen) = Collector::new("wide");
    let (narrow, narrow_seen) = Collector::new("narrow");
    let mut demuxer = Demuxer::new("demuxer")
        .with_packet_path(PacketPath::new(
            "narrow",
            |p: &Packet| match_range(22, 22, p.payload()),
            ModuleChain::new("narrow").with_module(Box::new(narrow)),
        ))
        .with_packet_path(PacketPath::new(
            "wide",
            |p: &Packet| match_dtls(p.payload()),
            ModuleChain::new("wide").with_module(Box::new(wide)),
        ));

    demuxer.process_packets(vec![packet(&[22]), packet(&[23]), packet(&[22, 1])])?;

    assert_eq!(narrow_seen.lock()?.len(), 2);
    assert_eq!(wide_seen.lock()?.len(), 1);

    Ok(())
}

#[test]
fn test_unmatched_packet_is_dropped() -> Result<()> {
    let calls = Arc::new(Mutex::new(0));
    let mut chain = ModuleChain::new("incoming").with_module(Box::new(
        Demuxer::new("demuxer").with_packet_path(PacketPath::new(
            "dtls",
            |p: &Packet| match_dtls(p.payload()),
            ModuleChain::new("dtls").with_module(Box::new(Probe {
                calls: Arc::clone(&calls),
            })),
        )),
    ));

    let out = chain.process_packets(vec![packet(&[128, 1, 2])]);
    assert!(out.is_empty());
    assert_eq!(*calls.lock()?, 0, "no downstream module is invoked");

    let out = chain.process_packets(vec![packet(&[23, 1, 2])]);
    assert_eq!(out.len(), 1, "probe passes the packet through unchanged");
    assert_eq!(out[0].payload().as_ref(), &[23u8, 1, 2]);
    assert_eq!(*calls.lock()?, 1);

    Ok(())
}

#[test]
fn test_default_path_receives_unmatched() -> Result<()> {
    let (dtls, dtls_seen) = Collector::new("dtls");
    let (fallback, fallback_seen) = Collector::new("fallback");
    let mut demuxer = Demuxer::new("demuxer").with_packet_path(PacketPath::new(
        "dtls",
        |p: &Packet| match_dtls(p.payload()),
        ModuleChain::new("dtls").with_module(Box::new(dtls)),
    ));
    demuxer.set_default_path(ModuleChain::new("fallback").with_module(Box::new(fallback)));

    demuxer.process_packets(vec![packet(&[0]), packet(&[22]), packet(&[129])])?;

    assert_eq!(dtls_seen.lock()?.len(), 1);
    let fallback: Vec<u8> = fallback_seen
        .lock()?
        .iter()
        .filter_map(|p| p.first_byte())
        .collect();
    assert_eq!(fallback, vec![0, 129]);

    Ok(())
}

#[test]
fn test_zero_length_packet_dropped_even_with_default_path() -> Result<()> {
    let (fallback, fallback_seen) = Collector::new("fallback");
    let mut demuxer = Demuxer::new("demuxer");
    demuxer.set_default_path(ModuleChain::new("fallback").with_module(Box::new(fallback)));

    demuxer.process_packets(vec![packet(&[])])?;
    assert!(fallback_seen.lock()?.is_empty());

    Ok(())
}

#[test]
fn test_path_preserves_arrival_order() -> Result<()> {
    let (dtls, dtls_seen) = Collector::new("dtls");
    let mut demuxer = Demuxer::new("demuxer").with_packet_path(PacketPath::new(
        "dtls",
        |p: &Packet| match_dtls(p.payload()),
        ModuleChain::new("dtls").with_module(Box::new(dtls)),
    ));

    let batch = vec![
        packet(&[22, 1]),
        packet(&[200]),
        packet(&[22, 2]),
        packet(&[5]),
        packet(&[22, 3]),
    ];
    demuxer.process_packets(batch)?;

    let seconds: Vec<u8> = dtls_seen.lock()?.iter().map(|p| p.payload()[1]).collect();
    assert_eq!(seconds, vec![1, 2, 3]);

    Ok(())
}
