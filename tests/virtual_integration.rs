//! Integration tests against the virtual DAQ backend.
//!
//! These exercise the full public contract the demo binary relies on:
//! open a session, allocate a buffer, loop single-frame blocking reads,
//! inspect samples by flattened channel index, then close and drop.

use daq_capture::validation::{validate_activity, validate_sample_bounds};
use daq_capture::{ChannelConfig, DaqError, DaqSession, SampleBuffer, VirtualDevice};
use serial_test::serial;

/// Frame count matching the reference consumer's loop bound.
const MAX_FRAMES: usize = 120;

fn virtual_config() -> ChannelConfig {
    ChannelConfig {
        device: "virtual".to_owned(),
        channels: 8,
        sample_rate: 2,
        ..ChannelConfig::default()
    }
}

#[test]
#[serial]
fn test_virtual_session_open_close() {
    let session =
        DaqSession::<VirtualDevice>::open(virtual_config()).expect("open should succeed");

    assert_eq!(session.config().channels, 8);
    assert_eq!(session.calibration().len(), 8);

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_defaults_applied() {
    let session =
        DaqSession::<VirtualDevice>::open(ChannelConfig::default()).expect("open should succeed");

    assert_eq!(session.config().device, "virtual");
    assert_eq!(session.config().channels, 8);
    assert_eq!(session.config().sample_rate, 1000);
    assert_eq!(session.config().subdevice, 0);
    assert_eq!(session.config().range, 0);

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_open_bad_path_is_an_error() {
    let config = ChannelConfig {
        device: "/dev/nonexistent".to_owned(),
        ..ChannelConfig::default()
    };
    let result = DaqSession::<VirtualDevice>::open(config);
    assert!(matches!(result, Err(DaqError::DeviceOpen { .. })));
}

#[test]
#[serial]
fn test_virtual_rate_coercion_is_observable() {
    // 7 kHz is not representable on the 1 µs tick: 142857 ns rounds down to
    // 142000 ns, and the session must report the rate actually armed.
    let config = ChannelConfig {
        device: "virtual".to_owned(),
        channels: 2,
        sample_rate: 7000,
        ..ChannelConfig::default()
    };
    let session = DaqSession::<VirtualDevice>::open(config).expect("open should succeed");

    assert_eq!(session.config().sample_rate, 1_000_000_000 / 142_000);

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_blocking_read_loop() {
    // The reference consumer: 120 sequential single-frame blocking reads,
    // watching one channel.
    let mut session =
        DaqSession::<VirtualDevice>::open(virtual_config()).expect("open should succeed");
    let mut buf = SampleBuffer::for_config(session.config(), 1).expect("allocation should succeed");

    let mut watched = Vec::with_capacity(MAX_FRAMES);
    {
        let mut reader = session.reader();
        for _ in 0..MAX_FRAMES {
            let got = reader.read(&mut buf, 1, true).expect("read should succeed");
            assert_eq!(got, 1);
            watched.push(buf.samples()[5]);
        }
    }

    validate_sample_bounds(&buf, 1, session.calibration())
        .expect("samples should stay within the calibrated range");
    validate_activity(&watched, 0.5).expect("the synthesized signal should move");

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_multi_frame_read_normalized() {
    let mut session =
        DaqSession::<VirtualDevice>::open(virtual_config()).expect("open should succeed");
    let mut buf =
        SampleBuffer::for_config(session.config(), 16).expect("allocation should succeed");

    let got = session
        .reader()
        .read(&mut buf, 16, true)
        .expect("read should succeed");
    assert_eq!(got, 16);

    validate_sample_bounds(&buf, got, session.calibration())
        .expect("samples should stay within the calibrated range");

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_read_never_exceeds_capacity() {
    let mut session =
        DaqSession::<VirtualDevice>::open(virtual_config()).expect("open should succeed");
    let mut buf = SampleBuffer::for_config(session.config(), 2).expect("allocation should succeed");

    let got = session
        .reader()
        .read(&mut buf, 1000, true)
        .expect("read should succeed");
    assert_eq!(got, 2);

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_nonblocking_read_bounded_by_backlog() {
    let mut session =
        DaqSession::<VirtualDevice>::open(virtual_config()).expect("open should succeed");
    let mut buf =
        SampleBuffer::for_config(session.config(), 64).expect("allocation should succeed");

    // The virtual driver arms with a small backlog; a non-blocking read must
    // not return more than that, however much was requested.
    let got = session
        .reader()
        .read(&mut buf, 64, false)
        .expect("read should succeed");
    assert!(got > 0);
    assert!(got < 64);

    session.close().expect("close should succeed");
}

#[test]
#[serial]
fn test_virtual_buffer_reuse_across_sessions() {
    let mut buf = SampleBuffer::allocate(8, 1).expect("allocation should succeed");

    for _ in 0..2 {
        let mut session =
            DaqSession::<VirtualDevice>::open(virtual_config()).expect("open should succeed");
        let got = session
            .reader()
            .read(&mut buf, 1, true)
            .expect("read should succeed");
        assert_eq!(got, 1);
        session.close().expect("close should succeed");
    }
}
