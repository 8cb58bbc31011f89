use super::*;
use crate::module::module_test::{packet, Collector};
use crate::module::muxer::Muxer;
use crate::module::ModuleChain;
use crate::shutdown::shutdown_channel;
use std::thread;

fn sink_input() -> MuxerInput {
    let (collector, _seen) = Collector::new("sink");
    let mut muxer = Muxer::new(
        "outgoing",
        ModuleChain::new("outgoing").with_module(Box::new(collector)),
    );
    muxer.attach_input("dtls")
}

#[test]
fn test_bridge_round_trip() -> Result<()> {
    let (_trigger, shutdown) = shutdown_channel();

    // Peer side: its receiver is the terminal module of our outgoing chain.
    let (peer_receiver, peer) =
        handshake_bridge(8, sink_input(), TransportContext::default(), shutdown.clone());
    let mut muxer = Muxer::new(
        "outgoing",
        ModuleChain::new("outgoing").with_module(Box::new(peer_receiver)),
    );
    let (_local_receiver, local) = handshake_bridge(
        8,
        muxer.attach_input("dtls"),
        TransportContext::default(),
        shutdown,
    );

    let hello: Vec<u8> = (0..200u8).collect();
    local.send(&hello)?;
    local.send(&[22, 254, 253])?;

    let mut buf = vec![0u8; peer.receive_limit()];
    let n = peer.receive(&mut buf, Duration::from_secs(1))?;
    assert_eq!(&buf[..n], hello.as_slice());
    let n = peer.receive(&mut buf, Duration::from_secs(1))?;
    assert_eq!(&buf[..n], &[22, 254, 253]);

    Ok(())
}

#[test]
fn test_bridge_receive_times_out() -> Result<()> {
    let (_trigger, shutdown) = shutdown_channel();
    let (_receiver, transport) =
        handshake_bridge(4, sink_input(), TransportContext::default(), shutdown);

    let mut buf = [0u8; RECEIVE_MTU];
    let started = Instant::now();
    let result = transport.receive(&mut buf, Duration::from_millis(50));

    assert_eq!(result, Err(Error::ErrTimeout));
    assert!(started.elapsed() >= Duration::from_millis(50));

    Ok(())
}

#[test]
fn test_bridge_receive_truncates_to_buffer() -> Result<()> {
    let (_trigger, shutdown) = shutdown_channel();
    let (mut receiver, transport) =
        handshake_bridge(4, sink_input(), TransportContext::default(), shutdown);

    receiver.process_packets(vec![packet(&[20, 1, 2, 3, 4, 5])])?;

    let mut buf = [0u8; 4];
    assert_eq!(transport.receive(&mut buf, Duration::from_secs(1))?, 4);
    assert_eq!(buf, [20, 1, 2, 3]);

    Ok(())
}

#[test]
fn test_bridge_drops_oldest_when_full() -> Result<()> {
    let (_trigger, shutdown) = shutdown_channel();
    let (mut receiver, transport) =
        handshake_bridge(2, sink_input(), TransportContext::default(), shutdown);

    let out = receiver.process_packets(vec![packet(&[20]), packet(&[21]), packet(&[22])])?;
    assert!(out.is_empty());
    assert_eq!(receiver.dropped(), 1);

    let mut buf = [0u8; 8];
    let mut got = vec![];
    while let Ok(n) = transport.receive(&mut buf, Duration::from_millis(20)) {
        got.push(buf[..n].to_vec());
    }
    assert_eq!(got, vec![vec![21u8], vec![22u8]]);

    Ok(())
}

#[test]
fn test_bridge_send_rejects_oversized_datagram() -> Result<()> {
    let (_trigger, shutdown) = shutdown_channel();
    let (_receiver, transport) =
        handshake_bridge(4, sink_input(), TransportContext::default(), shutdown);

    let big = vec![0u8; RECEIVE_MTU + 1];
    assert_eq!(transport.send(&big), Err(Error::ErrPacketTooBig));
    assert_eq!(transport.send_limit(), RECEIVE_MTU);

    Ok(())
}

#[test]
fn test_bridge_shutdown_unblocks_receive() -> Result<()> {
    let (mut trigger, shutdown) = shutdown_channel();
    let (_receiver, transport) =
        handshake_bridge(4, sink_input(), TransportContext::default(), shutdown);

    let waiter = thread::spawn(move || {
        let mut buf = [0u8; RECEIVE_MTU];
        transport.receive(&mut buf, Duration::from_secs(30))
    });

    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    trigger.trigger();

    let result = waiter
        .join()
        .map_err(|_| Error::Other("receiver panicked".to_owned()))?;
    assert_eq!(result, Err(Error::ErrUseClosedNetworkConn));
    assert!(started.elapsed() < Duration::from_secs(5));

    Ok(())
}
