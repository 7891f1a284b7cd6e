//! Debounced send-mode button.
//!
//! Two edge sources share one contract: at most one toggle per physical
//! press and none from contact bounce. The interrupt source latches a
//! falling edge in an [`EdgeFlag`] written from ISR context; the polled
//! source samples the level every fast tick and restarts a timer on any
//! raw change.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::config::{InputMode, MonitorConfig};

pub trait DigitalInput {
    fn read_level(&mut self) -> bool;

    /// Re-enables a one-shot edge interrupt after the latch consumed it.
    fn rearm(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleEvent {
    pub at_ms: u64,
}

/// Single-word flag shared with the edge interrupt. The ISR only calls
/// [`EdgeFlag::raise`].
#[derive(Debug, Clone, Default)]
pub struct EdgeFlag(Arc<AtomicBool>);

impl EdgeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug)]
pub struct InterruptLatch {
    flag: EdgeFlag,
    debounce_ms: u64,
    active_low: bool,
    last_accepted_ms: Option<u64>,
}

impl InterruptLatch {
    pub fn new(debounce_ms: u64, active_low: bool) -> Self {
        Self {
            flag: EdgeFlag::new(),
            debounce_ms,
            active_low,
            last_accepted_ms: None,
        }
    }

    pub fn flag(&self) -> EdgeFlag {
        self.flag.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.flag.is_raised()
    }

    /// The flag is cleared whether or not the edge is accepted.
    pub fn poll<P: DigitalInput>(&mut self, pin: &mut P, now_ms: u64) -> Option<ToggleEvent> {
        if !self.flag.take() {
            return None;
        }

        let asserted = pin.read_level() != self.active_low;
        pin.rearm();
        if !asserted {
            return None;
        }

        if let Some(last) = self.last_accepted_ms {
            if now_ms.saturating_sub(last) <= self.debounce_ms {
                return None;
            }
        }

        self.last_accepted_ms = Some(now_ms);
        Some(ToggleEvent { at_ms: now_ms })
    }
}

#[derive(Debug)]
pub struct PolledDebouncer {
    debounce_ms: u64,
    active_low: bool,
    /// `None` until the first poll samples the power-on level.
    last_raw: Option<bool>,
    changed_at_ms: u64,
    accepted: bool,
}

impl PolledDebouncer {
    pub fn new(debounce_ms: u64, active_low: bool) -> Self {
        Self {
            debounce_ms,
            active_low,
            last_raw: None,
            changed_at_ms: 0,
            accepted: false,
        }
    }

    fn asserted<P: DigitalInput>(&self, pin: &mut P) -> bool {
        pin.read_level() != self.active_low
    }

    /// A press is pending while the pin is asserted but not yet accepted.
    pub fn is_pending<P: DigitalInput>(&self, pin: &mut P) -> bool {
        self.last_raw.is_some() && self.asserted(pin) && !self.accepted
    }

    pub fn poll<P: DigitalInput>(&mut self, pin: &mut P, now_ms: u64) -> Option<ToggleEvent> {
        let asserted = self.asserted(pin);
        let Some(last_raw) = self.last_raw else {
            // A button held or stuck at power-on is the baseline, not a press.
            self.last_raw = Some(asserted);
            self.accepted = asserted;
            self.changed_at_ms = now_ms;
            return None;
        };

        if asserted != last_raw {
            self.last_raw = Some(asserted);
            self.changed_at_ms = now_ms;
            return None;
        }

        if now_ms.saturating_sub(self.changed_at_ms) > self.debounce_ms && asserted != self.accepted
        {
            self.accepted = asserted;
            // Only the press half of a press/release pair toggles.
            if asserted {
                return Some(ToggleEvent { at_ms: now_ms });
            }
        }

        None
    }
}

#[derive(Debug)]
pub enum EdgeSource {
    Interrupt(InterruptLatch),
    Polled(PolledDebouncer),
}

impl EdgeSource {
    pub fn from_config(config: &MonitorConfig) -> Self {
        let debounce_ms = config.debounce_ms();
        match config.input_mode {
            InputMode::Interrupt => {
                Self::Interrupt(InterruptLatch::new(debounce_ms, config.active_low))
            }
            InputMode::Polled => Self::Polled(PolledDebouncer::new(debounce_ms, config.active_low)),
        }
    }

    /// ISR handle, present only for the interrupt source.
    pub fn edge_flag(&self) -> Option<EdgeFlag> {
        match self {
            Self::Interrupt(latch) => Some(latch.flag()),
            Self::Polled(_) => None,
        }
    }

    pub fn poll_or_handle_edge<P: DigitalInput>(
        &mut self,
        pin: &mut P,
        now_ms: u64,
    ) -> Option<ToggleEvent> {
        match self {
            Self::Interrupt(latch) => latch.poll(pin, now_ms),
            Self::Polled(debouncer) => debouncer.poll(pin, now_ms),
        }
    }

    pub fn edge_pending<P: DigitalInput>(&self, pin: &mut P) -> bool {
        match self {
            Self::Interrupt(latch) => latch.is_pending(),
            Self::Polled(debouncer) => debouncer.is_pending(pin),
        }
    }
}
