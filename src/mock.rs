//! Mock driver implementation for testing without hardware.

use std::collections::VecDeque;

use crate::command::{AcquisitionCommand, TriggerSource, TriggerSpec};
use crate::traits::{CommandTest, DaqDevice, DaqError, Range, RawSample, Result};

/// Scripted outcome for one [`DaqDevice::validate_command`] call.
#[derive(Debug, Clone, Copy)]
pub enum MockValidation {
    /// Report the command as ready without touching it.
    Ready,
    /// Mutate the command (apply the configured coerced scan period, if any)
    /// and report it as adjusted.
    Adjusted,
    /// Report the command as structurally invalid.
    Invalid,
}

/// Scriptable mock driver for testing session and reader behavior.
pub struct MockDaq {
    validate_script: VecDeque<MockValidation>,
    coerced_scan_period: Option<u32>,
    fail_template: bool,
    fail_start: bool,
    fail_cancel: bool,
    fail_close: bool,
    buffered: usize,
    short_read: Option<usize>,
    max_codes: Vec<RawSample>,
    range: Range,
    next_code: RawSample,
    /// Number of `poll` calls observed.
    pub polls: u32,
    /// Number of `read_raw` calls observed.
    pub reads: u32,
    /// Number of `cancel` calls observed.
    pub cancels: u32,
}

impl Default for MockDaq {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDaq {
    /// Create a mock that accepts every command and emits sequential raw
    /// codes starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validate_script: VecDeque::new(),
            coerced_scan_period: None,
            fail_template: false,
            fail_start: false,
            fail_cancel: false,
            fail_close: false,
            buffered: usize::MAX,
            short_read: None,
            max_codes: Vec::new(),
            range: Range::new(0, 0.0, 1.0),
            next_code: 0,
            polls: 0,
            reads: 0,
            cancels: 0,
        }
    }

    /// Script the outcomes of successive validation calls. Calls beyond the
    /// script report [`MockValidation::Ready`].
    #[must_use]
    pub fn with_validate_script(mut self, script: Vec<MockValidation>) -> Self {
        self.validate_script = script.into();
        self
    }

    /// Scan period installed into the command by adjusting validation calls.
    #[must_use]
    pub fn with_coerced_scan_period(mut self, period_ns: u32) -> Self {
        self.coerced_scan_period = Some(period_ns);
        self
    }

    /// Make `command_template` fail.
    #[must_use]
    pub fn with_template_failure(mut self) -> Self {
        self.fail_template = true;
        self
    }

    /// Make `start_command` fail.
    #[must_use]
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make `cancel` fail.
    #[must_use]
    pub fn with_cancel_failure(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    /// Make `close` fail.
    #[must_use]
    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Byte count reported by `buffered_bytes`.
    #[must_use]
    pub fn with_buffered_bytes(mut self, bytes: usize) -> Self {
        self.buffered = bytes;
        self
    }

    /// Cap `read_raw` at `bytes` regardless of the request size.
    #[must_use]
    pub fn with_short_read(mut self, bytes: usize) -> Self {
        self.short_read = Some(bytes);
        self
    }

    /// Per-channel maximum raw codes; channels beyond the list report the
    /// full 16-bit range.
    #[must_use]
    pub fn with_max_codes(mut self, codes: Vec<RawSample>) -> Self {
        self.max_codes = codes;
        self
    }

    /// Range descriptor reported for every channel.
    #[must_use]
    pub fn with_range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }
}

impl DaqDevice for MockDaq {
    fn open(path: &str) -> Result<Self> {
        if path == "missing" {
            return Err(DaqError::DeviceOpen {
                path: path.to_owned(),
                message: "no such device".to_owned(),
            });
        }
        Ok(Self::new())
    }

    fn default_path() -> &'static str {
        "mock0"
    }

    fn close(&mut self) -> Result<()> {
        if self.fail_close {
            return Err(std::io::Error::other("close rejected").into());
        }
        Ok(())
    }

    fn command_template(
        &mut self,
        subdevice: u32,
        channels: u32,
        period_ns: u32,
    ) -> Result<AcquisitionCommand> {
        if self.fail_template {
            return Err(DaqError::CommandGeneration {
                message: "timed commands unsupported".to_owned(),
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
        match self.validate_script.pop_front() {
            None | Some(MockValidation::Ready) => Ok(CommandTest::Ready),
            Some(MockValidation::Adjusted) => {
                if let Some(period) = self.coerced_scan_period {
                    cmd.scan_begin = TriggerSpec::new(TriggerSource::TIMER, period);
                }
                Ok(CommandTest::Adjusted)
            }
            Some(MockValidation::Invalid) => Err(DaqError::CommandValidation {
                message: "trigger source unsupported".to_owned(),
            }),
        }
    }

    fn start_command(&mut self, _cmd: &AcquisitionCommand) -> Result<()> {
        if self.fail_start {
            return Err(DaqError::Start {
                message: "subdevice busy".to_owned(),
            });
        }
        Ok(())
    }

    fn cancel(&mut self, _subdevice: u32) -> Result<()> {
        self.cancels += 1;
        if self.fail_cancel {
            return Err(std::io::Error::other("cancel rejected").into());
        }
        Ok(())
    }

    fn buffered_bytes(&mut self, _subdevice: u32) -> Result<usize> {
        Ok(self.buffered)
    }

    fn max_raw_code(&mut self, _subdevice: u32, channel: u32) -> Result<RawSample> {
        Ok(self
            .max_codes
            .get(channel as usize)
            .copied()
            .unwrap_or(RawSample::MAX))
    }

    fn range_info(&mut self, _subdevice: u32, _channel: u32, range: u32) -> Result<Range> {
        Ok(Range::new(range, self.range.min, self.range.max))
    }

    fn poll(&mut self, _subdevice: u32) -> Result<()> {
        self.polls += 1;
        Ok(())
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reads += 1;
        let len = self.short_read.map_or(buf.len(), |s| s.min(buf.len()));
        for chunk in buf[..len].chunks_exact_mut(2) {
            chunk.copy_from_slice(&self.next_code.to_ne_bytes());
            self.next_code = self.next_code.wrapping_add(1);
        }
        Ok(len)
    }
}
