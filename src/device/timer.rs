//! Performance counters (spec.md §3, §4.7): 4 event-select registers each
//! paired with a free-running value register. The cycle counter itself
//! lives directly on [`crate::device::DeviceBus`]; this struct only tracks
//! the 4 software-selectable events.

const NUM_COUNTERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfEvent {
    None,
    InstructionRetired,
    L1DMiss,
    StoreRollback,
}

impl PerfEvent {
    fn from_select(select: u32) -> Self {
        match select {
            1 => PerfEvent::InstructionRetired,
            2 => PerfEvent::L1DMiss,
            3 => PerfEvent::StoreRollback,
            _ => PerfEvent::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerfCounters {
    select: [u32; NUM_COUNTERS],
    value: [u64; NUM_COUNTERS],
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            select: [0; NUM_COUNTERS],
            value: [0; NUM_COUNTERS],
        }
    }

    pub fn read_select(&self, index: usize) -> u32 {
        self.select.get(index).copied().unwrap_or(0)
    }

    pub fn set_select(&mut self, index: usize, value: u32) {
        if let Some(slot) = self.select.get_mut(index) {
            *slot = value;
        }
    }

    pub fn read_value(&self, index: usize) -> u32 {
        self.value.get(index).copied().unwrap_or(0) as u32
    }

    /// Called by the thread core's retirement path with the event that just
    /// occurred; counters whose select matches increment.
    pub fn record(&mut self, event: PerfEvent) {
        for i in 0..NUM_COUNTERS {
            if PerfEvent::from_select(self.select[i]) == event {
                self.value[i] = self.value[i].wrapping_add(1);
            }
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}
