//! Acquisition command synthesis: trigger sources, channel packing, and the
//! command value submitted to the driver to start continuous streaming.

use crate::traits::Aref;

bitflags::bitflags! {
    /// Trigger sources understood by the driver.
    ///
    /// Trigger sources are bitmasks: a command phase may name several
    /// candidate sources, and validation masks them against the sources the
    /// subdevice actually supports. A phase is only armable once exactly one
    /// bit remains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TriggerSource: u32 {
        /// Never trigger (used as a stop source for continuous acquisition).
        const NONE = 1 << 0;
        /// Trigger immediately.
        const NOW = 1 << 1;
        /// Follow the preceding phase.
        const FOLLOW = 1 << 2;
        /// Trigger at a wall-clock time.
        const TIME = 1 << 3;
        /// Trigger from the subdevice's pacing timer; the argument is the
        /// period in nanoseconds.
        const TIMER = 1 << 4;
        /// Trigger after a count; the argument is the count.
        const COUNT = 1 << 5;
        /// Trigger from an external line.
        const EXT = 1 << 6;
        /// Trigger from a software interrupt.
        const INT = 1 << 7;
        /// Driver-specific source.
        const OTHER = 1 << 8;
    }
}

impl TriggerSource {
    /// Whether exactly one source bit is set.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        self.bits().count_ones() == 1
    }
}

/// One trigger phase of an acquisition command: a source and its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSpec {
    /// Trigger source bitmask.
    pub source: TriggerSource,
    /// Source-dependent argument (period, count, or line number).
    pub arg: u32,
}

impl TriggerSpec {
    /// Create a new trigger phase.
    #[must_use]
    pub const fn new(source: TriggerSource, arg: u32) -> Self {
        Self { source, arg }
    }

    /// The timer period carried by this phase, if it is timer-paced.
    #[must_use]
    pub fn timer_period_ns(&self) -> Option<u32> {
        (self.source == TriggerSource::TIMER && self.arg != 0).then_some(self.arg)
    }
}

/// Per-channel acquisition descriptor: channel index, range, and reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChanSpec {
    /// Channel index on the subdevice.
    pub channel: u32,
    /// Measurement range index.
    pub range: u32,
    /// Analog reference.
    pub aref: Aref,
}

impl ChanSpec {
    /// Create a descriptor for `channel` with range 0 and ground reference.
    #[must_use]
    pub const fn new(channel: u32) -> Self {
        Self {
            channel,
            range: 0,
            aref: Aref::Ground,
        }
    }

    /// Set the measurement range index.
    #[must_use]
    pub const fn with_range(mut self, range: u32) -> Self {
        self.range = range;
        self
    }

    /// Set the analog reference.
    #[must_use]
    pub const fn with_aref(mut self, aref: Aref) -> Self {
        self.aref = aref;
        self
    }

    /// Pack into the driver's channel-list encoding:
    /// `channel | range << 16 | aref << 24`.
    #[must_use]
    pub const fn packed(&self) -> u32 {
        (self.channel & 0xffff) | ((self.range & 0xff) << 16) | ((self.aref.code() & 0x3) << 24)
    }
}

/// A validated description of timing, triggers, and channels submitted to the
/// driver to start streaming acquisition.
///
/// Commands are built once per session open: the driver supplies a generic
/// timed template, [`AcquisitionCommand::continuous`] overrides it for
/// continuous multi-channel streaming, and the session's two-pass validation
/// settles the final trigger arguments. After arming, the command is owned by
/// the session and dropped with it; reconfiguring means building a new
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionCommand {
    /// Subdevice the command targets.
    pub subdevice: u32,
    /// When acquisition starts.
    pub start: TriggerSpec,
    /// When each scan over the channel list begins.
    pub scan_begin: TriggerSpec,
    /// When each conversion within a scan happens.
    pub convert: TriggerSpec,
    /// When a scan ends (count of conversions).
    pub scan_end: TriggerSpec,
    /// When acquisition stops.
    pub stop: TriggerSpec,
    /// Channels sampled by each scan, in order.
    pub chan_list: Vec<ChanSpec>,
}

impl AcquisitionCommand {
    /// Turn a driver template into a continuous streaming command: install
    /// the channel list, set the scan length to the channel count, and
    /// disable the stop condition.
    #[must_use]
    pub fn continuous(mut self, chan_list: Vec<ChanSpec>) -> Self {
        let len = u32::try_from(chan_list.len()).unwrap_or(u32::MAX);
        self.chan_list = chan_list;
        self.scan_end = TriggerSpec::new(TriggerSource::COUNT, len);
        self.stop = TriggerSpec::new(TriggerSource::NONE, 0);
        self
    }

    /// Effective scan period in nanoseconds after validation, if the command
    /// is timer-paced. The scan-begin timer takes precedence over the
    /// per-conversion timer.
    #[must_use]
    pub fn scan_period_ns(&self) -> Option<u32> {
        self.scan_begin
            .timer_period_ns()
            .or_else(|| self.convert.timer_period_ns())
    }

    /// Number of channels sampled per scan.
    #[must_use]
    pub fn scan_len(&self) -> usize {
        self.chan_list.len()
    }
}
