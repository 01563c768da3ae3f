//! Virtual DAQ backend: a deterministic waveform generator implementing the
//! driver contract, used by the demo binary and the integration tests.

use crate::command::{AcquisitionCommand, ChanSpec, TriggerSource, TriggerSpec};
use crate::traits::{
    CommandTest, DaqDevice, DaqError, Range, RawSample, Result, RAW_SAMPLE_SIZE,
};

/// Channels exposed by the virtual analog-input subdevice.
pub const VIRTUAL_CHANNELS: u32 = 16;

/// Largest raw code the virtual converter produces.
pub const VIRTUAL_MAX_CODE: RawSample = RawSample::MAX;

/// Shortest scan period the virtual pacing timer supports (10 kHz).
pub const MIN_SCAN_PERIOD_NS: u32 = 100_000;

const TIMER_TICK_NS: u32 = 1_000;
const SUBDEVICES: u32 = 1;
const BACKLOG_SCANS: usize = 4;
const MAX_BUFFERED_BYTES: usize = 64 * 1024;
const SCANS_PER_CYCLE: f64 = 32.0;

const RANGES: [Range; 2] = [Range::new(0, 0.0, 1.0), Range::new(1, -1.0, 1.0)];

struct ArmedState {
    channels: usize,
    clock: u64,
    buffered: usize,
}

/// Synthetic DAQ device generating a phase-shifted sine per channel.
///
/// Opens under the path `"virtual"` (optionally suffixed, e.g.
/// `"virtual:bench"`). Timing requests are clamped to
/// [`MIN_SCAN_PERIOD_NS`] and rounded down to a 1 µs tick, so a session may
/// observe a coerced sample rate just as with real pacing hardware. Blocking
/// reads always synthesize the full request; the simulated driver backlog
/// only bounds non-blocking reads.
pub struct VirtualDevice {
    armed: Option<ArmedState>,
}

impl VirtualDevice {
    fn masked_source(
        spec: &mut TriggerSpec,
        valid: TriggerSource,
        phase: &str,
    ) -> Result<bool> {
        let masked = spec.source & valid;
        if masked.is_empty() {
            return Err(DaqError::CommandValidation {
                message: format!("no supported {phase} trigger source"),
            });
        }
        let changed = masked != spec.source;
        spec.source = masked;
        if !masked.is_unique() {
            return Err(DaqError::CommandValidation {
                message: format!("ambiguous {phase} trigger source"),
            });
        }
        Ok(changed)
    }

    fn check_chan_list(chan_list: &[ChanSpec]) -> Result<()> {
        if chan_list.is_empty() {
            return Err(DaqError::CommandValidation {
                message: "empty channel list".to_owned(),
            });
        }
        for spec in chan_list {
            if spec.channel >= VIRTUAL_CHANNELS {
                return Err(DaqError::CommandValidation {
                    message: format!("channel {} out of range", spec.channel),
                });
            }
            if spec.range as usize >= RANGES.len() {
                return Err(DaqError::CommandValidation {
                    message: format!("range {} out of range", spec.range),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn waveform_code(scan: u64, slot: usize, channels: usize) -> RawSample {
        // One full cycle every SCANS_PER_CYCLE scans, phase-shifted per
        // channel slot so channels are distinguishable.
        let cycles = scan as f64 / SCANS_PER_CYCLE + slot as f64 / channels as f64;
        let unit = (cycles * std::f64::consts::TAU).sin().mul_add(0.5, 0.5);
        (unit * f64::from(VIRTUAL_MAX_CODE)).round() as RawSample
    }
}

impl DaqDevice for VirtualDevice {
    fn open(path: &str) -> Result<Self> {
        if path == "virtual" || path.starts_with("virtual:") {
            Ok(Self { armed: None })
        } else {
            Err(DaqError::DeviceOpen {
                path: path.to_owned(),
                message: "no such device".to_owned(),
            })
        }
    }

    fn default_path() -> &'static str {
        "virtual"
    }

    fn close(&mut self) -> Result<()> {
        self.armed = None;
        Ok(())
    }

    fn command_template(
        &mut self,
        subdevice: u32,
        channels: u32,
        period_ns: u32,
    ) -> Result<AcquisitionCommand> {
        if subdevice >= SUBDEVICES {
            return Err(DaqError::CommandGeneration {
                message: format!("subdevice {subdevice} out of range"),
            });
        }
        if channels == 0 || channels > VIRTUAL_CHANNELS {
            return Err(DaqError::CommandGeneration {
                message: format!("cannot scan {channels} channels"),
            });
        }
        Ok(AcquisitionCommand {
            subdevice,
            start: TriggerSpec::new(TriggerSource::NOW, 0),
            scan_begin: TriggerSpec::new(TriggerSource::TIMER, period_ns),
            convert: TriggerSpec::new(TriggerSource::NOW, 0),
            scan_end: TriggerSpec::new(TriggerSource::COUNT, channels),
            stop: TriggerSpec::new(TriggerSource::COUNT, 1),
            chan_list: Vec::new(),
        })
    }

    fn validate_command(&mut self, cmd: &mut AcquisitionCommand) -> Result<CommandTest> {
        let mut adjusted = false;

        adjusted |= Self::masked_source(
            &mut cmd.start,
            TriggerSource::NOW | TriggerSource::INT,
            "start",
        )?;
        adjusted |= Self::masked_source(
            &mut cmd.scan_begin,
            TriggerSource::TIMER | TriggerSource::FOLLOW | TriggerSource::EXT,
            "scan-begin",
        )?;
        adjusted |= Self::masked_source(
            &mut cmd.convert,
            TriggerSource::NOW | TriggerSource::TIMER,
            "convert",
        )?;
        adjusted |= Self::masked_source(&mut cmd.scan_end, TriggerSource::COUNT, "scan-end")?;
        adjusted |= Self::masked_source(
            &mut cmd.stop,
            TriggerSource::NONE | TriggerSource::COUNT,
            "stop",
        )?;

        Self::check_chan_list(&cmd.chan_list)?;

        if cmd.scan_begin.source == TriggerSource::TIMER {
            if cmd.scan_begin.arg < MIN_SCAN_PERIOD_NS {
                cmd.scan_begin.arg = MIN_SCAN_PERIOD_NS;
                adjusted = true;
            }
            let rem = cmd.scan_begin.arg % TIMER_TICK_NS;
            if rem != 0 {
                cmd.scan_begin.arg -= rem;
                adjusted = true;
            }
        }
        if cmd.convert.source == TriggerSource::TIMER && cmd.convert.arg < TIMER_TICK_NS {
            cmd.convert.arg = TIMER_TICK_NS;
            adjusted = true;
        }

        let scan_len = u32::try_from(cmd.chan_list.len()).unwrap_or(u32::MAX);
        if cmd.scan_end.arg != scan_len {
            cmd.scan_end.arg = scan_len;
            adjusted = true;
        }
        if cmd.stop.source == TriggerSource::NONE && cmd.stop.arg != 0 {
            cmd.stop.arg = 0;
            adjusted = true;
        }

        Ok(if adjusted {
            CommandTest::Adjusted
        } else {
            CommandTest::Ready
        })
    }

    fn start_command(&mut self, cmd: &AcquisitionCommand) -> Result<()> {
        if cmd.chan_list.is_empty() {
            return Err(DaqError::Start {
                message: "command has no channel list".to_owned(),
            });
        }
        let channels = cmd.scan_len();
        self.armed = Some(ArmedState {
            channels,
            clock: 0,
            buffered: BACKLOG_SCANS * channels * RAW_SAMPLE_SIZE,
        });
        Ok(())
    }

    fn cancel(&mut self, _subdevice: u32) -> Result<()> {
        self.armed = None;
        Ok(())
    }

    fn buffered_bytes(&mut self, _subdevice: u32) -> Result<usize> {
        Ok(self.armed.as_ref().map_or(0, |state| state.buffered))
    }

    fn max_raw_code(&mut self, _subdevice: u32, channel: u32) -> Result<RawSample> {
        if channel >= VIRTUAL_CHANNELS {
            return Err(DaqError::InvalidConfig {
                message: format!("channel {channel} out of range"),
            });
        }
        Ok(VIRTUAL_MAX_CODE)
    }

    fn range_info(&mut self, _subdevice: u32, channel: u32, range: u32) -> Result<Range> {
        if channel >= VIRTUAL_CHANNELS {
            return Err(DaqError::InvalidConfig {
                message: format!("channel {channel} out of range"),
            });
        }
        RANGES
            .get(range as usize)
            .copied()
            .ok_or_else(|| DaqError::InvalidConfig {
                message: format!("range {range} out of range"),
            })
    }

    fn poll(&mut self, _subdevice: u32) -> Result<()> {
        if let Some(state) = self.armed.as_mut() {
            let scan_bytes = state.channels * RAW_SAMPLE_SIZE;
            state.buffered = (state.buffered + scan_bytes).min(MAX_BUFFERED_BYTES);
        }
        Ok(())
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(state) = self.armed.as_mut() else {
            return Err(DaqError::Read {
                message: "no active acquisition".to_owned(),
            });
        };

        let len = buf.len() - buf.len() % RAW_SAMPLE_SIZE;
        for chunk in buf[..len].chunks_exact_mut(RAW_SAMPLE_SIZE) {
            let scan = state.clock / state.channels as u64;
            #[allow(clippy::cast_possible_truncation)]
            let slot = (state.clock % state.channels as u64) as usize;
            let code = Self::waveform_code(scan, slot, state.channels);
            chunk.copy_from_slice(&code.to_ne_bytes());
            state.clock += 1;
        }
        state.buffered = state.buffered.saturating_sub(len);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_device(channels: u32) -> VirtualDevice {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let template = device
            .command_template(0, channels, 1_000_000)
            .expect("template should succeed");
        let chan_list = (0..channels).map(ChanSpec::new).collect();
        let mut cmd = template.continuous(chan_list);
        device
            .validate_command(&mut cmd)
            .expect("validation should succeed");
        device.start_command(&cmd).expect("start should succeed");
        device
    }

    #[test]
    fn test_open_rejects_unknown_path() {
        assert!(VirtualDevice::open("virtual").is_ok());
        assert!(VirtualDevice::open("virtual:bench").is_ok());
        assert!(matches!(
            VirtualDevice::open("/dev/comedi0"),
            Err(DaqError::DeviceOpen { .. })
        ));
    }

    #[test]
    fn test_template_rejects_bad_parameters() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        assert!(matches!(
            device.command_template(1, 8, 1_000_000),
            Err(DaqError::CommandGeneration { .. })
        ));
        assert!(matches!(
            device.command_template(0, 0, 1_000_000),
            Err(DaqError::CommandGeneration { .. })
        ));
        assert!(matches!(
            device.command_template(0, VIRTUAL_CHANNELS + 1, 1_000_000),
            Err(DaqError::CommandGeneration { .. })
        ));
    }

    #[test]
    fn test_validation_masks_trigger_sources() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let template = device
            .command_template(0, 2, 1_000_000)
            .expect("template should succeed");
        let mut cmd = template.continuous(vec![ChanSpec::new(0), ChanSpec::new(1)]);

        // A start source with an unsupported candidate gets masked down.
        cmd.start.source = TriggerSource::NOW | TriggerSource::EXT;
        let outcome = device
            .validate_command(&mut cmd)
            .expect("validation should succeed");
        assert_eq!(outcome, CommandTest::Adjusted);
        assert_eq!(cmd.start.source, TriggerSource::NOW);

        // Second pass reaches the fixed point.
        let outcome = device
            .validate_command(&mut cmd)
            .expect("validation should succeed");
        assert_eq!(outcome, CommandTest::Ready);
    }

    #[test]
    fn test_validation_rejects_unsupported_source() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let template = device
            .command_template(0, 1, 1_000_000)
            .expect("template should succeed");
        let mut cmd = template.continuous(vec![ChanSpec::new(0)]);
        cmd.start.source = TriggerSource::TIMER;

        assert!(matches!(
            device.validate_command(&mut cmd),
            Err(DaqError::CommandValidation { .. })
        ));
    }

    #[test]
    fn test_validation_clamps_scan_period() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let template = device
            .command_template(0, 1, 50_000)
            .expect("template should succeed");
        let mut cmd = template.continuous(vec![ChanSpec::new(0)]);

        let outcome = device
            .validate_command(&mut cmd)
            .expect("validation should succeed");
        assert_eq!(outcome, CommandTest::Adjusted);
        assert_eq!(cmd.scan_begin.arg, MIN_SCAN_PERIOD_NS);
        assert_eq!(
            device
                .validate_command(&mut cmd)
                .expect("validation should succeed"),
            CommandTest::Ready
        );
    }

    #[test]
    fn test_validation_rounds_period_to_tick() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let template = device
            .command_template(0, 1, 333_333_333)
            .expect("template should succeed");
        let mut cmd = template.continuous(vec![ChanSpec::new(0)]);

        device
            .validate_command(&mut cmd)
            .expect("validation should succeed");
        assert_eq!(cmd.scan_begin.arg, 333_333_000);
    }

    #[test]
    fn test_validation_rejects_out_of_range_channel() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let template = device
            .command_template(0, 1, 1_000_000)
            .expect("template should succeed");
        let mut cmd = template.continuous(vec![ChanSpec::new(VIRTUAL_CHANNELS)]);

        assert!(matches!(
            device.validate_command(&mut cmd),
            Err(DaqError::CommandValidation { .. })
        ));
    }

    #[test]
    fn test_read_requires_armed_command() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let mut buf = [0u8; 4];
        assert!(matches!(
            device.read_raw(&mut buf),
            Err(DaqError::Read { .. })
        ));
    }

    #[test]
    fn test_read_synthesizes_full_request() {
        let mut device = armed_device(2);
        let mut buf = [0u8; 16];
        let n = device.read_raw(&mut buf).expect("read should succeed");
        assert_eq!(n, 16);
    }

    #[test]
    fn test_poll_tops_up_backlog() {
        let mut device = armed_device(2);
        let before = device.buffered_bytes(0).expect("query should succeed");
        device.poll(0).expect("poll should succeed");
        let after = device.buffered_bytes(0).expect("query should succeed");
        assert_eq!(after, before + 2 * RAW_SAMPLE_SIZE);
    }

    #[test]
    fn test_reads_drain_backlog() {
        let mut device = armed_device(2);
        let before = device.buffered_bytes(0).expect("query should succeed");
        let mut buf = [0u8; 4];
        device.read_raw(&mut buf).expect("read should succeed");
        let after = device.buffered_bytes(0).expect("query should succeed");
        assert_eq!(after, before - 4);
    }

    #[test]
    fn test_cancel_disarms() {
        let mut device = armed_device(2);
        device.cancel(0).expect("cancel should succeed");
        assert_eq!(device.buffered_bytes(0).expect("query should succeed"), 0);
        let mut buf = [0u8; 4];
        assert!(device.read_raw(&mut buf).is_err());
    }

    #[test]
    fn test_range_info_bounds() {
        let mut device = VirtualDevice::open("virtual").expect("open should succeed");
        let range = device.range_info(0, 0, 0).expect("range should exist");
        assert!((range.min - 0.0).abs() < f64::EPSILON);
        assert!((range.max - 1.0).abs() < f64::EPSILON);
        assert!(device.range_info(0, 0, 2).is_err());
        assert!(device.range_info(0, VIRTUAL_CHANNELS, 0).is_err());
    }

    #[test]
    fn test_waveform_codes_cover_full_swing() {
        // Over one full cycle the waveform must reach both ends of the code
        // space for slot 0.
        let codes: Vec<RawSample> =
            (0..32).map(|scan| VirtualDevice::waveform_code(scan, 0, 8)).collect();
        let min = codes.iter().copied().min().unwrap_or(RawSample::MAX);
        let max = codes.iter().copied().max().unwrap_or(0);
        assert!(min < 1000);
        assert!(max > 64_000);
    }
}
