//! Device session lifecycle: configuration defaulting, command negotiation,
//! calibration, and teardown.

use crate::command::{AcquisitionCommand, ChanSpec};
use crate::reader::FrameReader;
use crate::traits::{Aref, CommandTest, DaqDevice, DaqError, Range, RawSample, Result, Sample};

/// Default sample rate applied when the caller leaves it unset.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 1000;

/// Default channel count applied when the caller leaves it unset.
pub const DEFAULT_CHANNELS: u32 = 8;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Caller-supplied acquisition configuration.
///
/// Zero-valued `device`, `sample_rate`, and `channels` fields are filled in
/// by [`DaqSession::open`]. `subdevice`, `range`, and `aref` are *not*
/// defaulted: zero is a valid setting for all three.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    /// Device identifier; empty means the backend's default path.
    pub device: String,
    /// Number of channels to read; 0 means the default of 8.
    pub channels: u32,
    /// Target frame rate in Hz; 0 means the default of 1000.
    pub sample_rate: u32,
    /// Readings per produced frame. Oversampling reduction is not
    /// implemented; this is forced to 0 and the timing math treats it as 1.
    pub oversampling: u32,
    /// Subdevice to read from.
    pub subdevice: u32,
    /// Measurement range index.
    pub range: u32,
    /// Analog voltage reference.
    pub aref: Aref,
}

/// Per-channel calibration: the device-reported maximum raw code and range
/// descriptor used to normalize raw samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationEntry {
    /// Largest raw code the converter produces on this channel.
    pub max_code: RawSample,
    /// Range the raw codes map onto.
    pub range: Range,
}

impl CalibrationEntry {
    /// Convert a raw code to its physical value within the entry's range.
    #[must_use]
    pub fn to_physical(&self, code: RawSample) -> Sample {
        if self.max_code == 0 {
            return Sample::NAN;
        }
        f64::from(code) / f64::from(self.max_code) * self.range.span() + self.range.min
    }
}

/// Calibration entries for every configured channel, populated once right
/// after the command is armed and immutable from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    /// Entries in channel order.
    #[must_use]
    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    /// Number of calibrated channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An open acquisition session.
///
/// Owns the device handle, the armed [`AcquisitionCommand`], and the
/// [`CalibrationTable`]; all three live exactly as long as the session.
/// The publicly visible [`ChannelConfig`] is an effective snapshot: if the
/// driver coerced the requested timing, `config().sample_rate` reports the
/// rate actually armed.
pub struct DaqSession<D: DaqDevice> {
    pub(crate) config: ChannelConfig,
    pub(crate) device: D,
    pub(crate) command: AcquisitionCommand,
    pub(crate) calibration: CalibrationTable,
}

impl<D: DaqDevice> DaqSession<D> {
    /// Open the device named by `config.device` (or the backend default) and
    /// arm continuous acquisition.
    pub fn open(config: ChannelConfig) -> Result<Self> {
        let config = Self::apply_defaults(config);
        let device = D::open(&config.device)?;
        Self::arm(device, config)
    }

    /// Arm continuous acquisition on a device the caller already opened.
    pub fn open_with(device: D, config: ChannelConfig) -> Result<Self> {
        Self::arm(device, Self::apply_defaults(config))
    }

    fn apply_defaults(mut config: ChannelConfig) -> ChannelConfig {
        if config.device.is_empty() {
            config.device = D::default_path().to_owned();
        }
        if config.sample_rate == 0 {
            config.sample_rate = DEFAULT_SAMPLE_RATE_HZ;
        }
        if config.channels == 0 {
            config.channels = DEFAULT_CHANNELS;
        }
        // Oversampling reduction is not implemented.
        config.oversampling = 0;
        config
    }

    fn arm(mut device: D, mut config: ChannelConfig) -> Result<Self> {
        let oversampling = config.oversampling.max(1);
        let period_ns = u64::from(oversampling) * u64::from(NANOS_PER_SEC / config.sample_rate);
        let period_ns = u32::try_from(period_ns).unwrap_or(u32::MAX);

        let template = device.command_template(config.subdevice, config.channels, period_ns)?;

        let chan_list: Vec<ChanSpec> = (0..config.channels)
            .map(|ch| {
                ChanSpec::new(ch)
                    .with_range(config.range)
                    .with_aref(config.aref)
            })
            .collect();
        let mut command = template.continuous(chan_list);

        // The first test may silently mask trigger sources and clamp
        // arguments in place. If the second test still wants changes, the
        // caller's command was underdetermined.
        if device.validate_command(&mut command)? == CommandTest::Adjusted {
            log::debug!("validation adjusted the command, re-testing");
            if device.validate_command(&mut command)? == CommandTest::Adjusted {
                return Err(DaqError::CommandValidation {
                    message: "command still required adjustment after two passes".to_owned(),
                });
            }
        }

        if let Some(actual_period) = command.scan_period_ns() {
            let actual_rate = NANOS_PER_SEC / actual_period;
            if actual_rate != config.sample_rate {
                log::debug!(
                    "driver coerced sample rate from {} Hz to {} Hz",
                    config.sample_rate,
                    actual_rate
                );
                config.sample_rate = actual_rate;
            }
        }

        device.start_command(&command)?;

        let mut entries = Vec::with_capacity(config.channels as usize);
        for ch in 0..config.channels {
            let max_code = device.max_raw_code(config.subdevice, ch)?;
            let range = device.range_info(config.subdevice, ch, config.range)?;
            entries.push(CalibrationEntry { max_code, range });
        }

        log::info!(
            "opened '{}': {} channels at {} Hz",
            config.device,
            config.channels,
            config.sample_rate
        );

        Ok(Self {
            config,
            device,
            command,
            calibration: CalibrationTable { entries },
        })
    }

    /// Effective configuration snapshot for this session.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The command armed on the device.
    #[must_use]
    pub fn command(&self) -> &AcquisitionCommand {
        &self.command
    }

    /// Calibration entries for the configured channels.
    #[must_use]
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Create a frame reader borrowing this session.
    pub fn reader(&mut self) -> FrameReader<'_, D> {
        FrameReader::new(self)
    }

    /// Cancel acquisition and close the device.
    ///
    /// Both teardown steps always run; their failures are aggregated into a
    /// single [`DaqError::Close`]. Owned command and calibration memory is
    /// released unconditionally when the session is consumed.
    pub fn close(mut self) -> Result<()> {
        let cancel_err = self.device.cancel(self.config.subdevice).err();
        let close_err = self.device.close().err();

        if cancel_err.is_none() && close_err.is_none() {
            log::info!("closed '{}'", self.config.device);
            return Ok(());
        }

        let message = cancel_err
            .iter()
            .chain(close_err.iter())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(DaqError::Close { message })
    }
}
