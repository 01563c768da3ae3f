//! Daq-capture binary for reading frames from the virtual DAQ device.

use daq_capture::{ChannelConfig, DaqSession, SampleBuffer, VirtualDevice};

/// Number of frames to read before termination.
const MAX_FRAMES: usize = 120;

/// Channel whose samples are printed.
const WATCH_CHANNEL: usize = 5;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> daq_capture::Result<()> {
    let config = ChannelConfig {
        device: "virtual".to_owned(),
        channels: 8,
        sample_rate: 2,
        ..ChannelConfig::default()
    };

    let mut session = DaqSession::<VirtualDevice>::open(config)?;

    println!(
        "Device: {} ({} channels at {} Hz)",
        session.config().device,
        session.config().channels,
        session.config().sample_rate
    );

    // One frame of storage is enough for the print loop.
    let mut buf = SampleBuffer::for_config(session.config(), 1)?;

    {
        let mut reader = session.reader();
        for frame in 0..MAX_FRAMES {
            print!("{frame:02}:");
            let got = reader.read(&mut buf, 1, true)?;
            for ch in 0..buf.samples_per_frame() {
                // Print only this channel...
                if ch == WATCH_CHANNEL && got > 0 {
                    print!(" {:5.3}", buf.samples()[ch]);
                }
            }
            println!();
        }
    }

    session.close()
}
