//! Software-managed MMU / TLB (spec.md §4.5, C4).
//!
//! Two independent TLBs (instruction and data) are instantiated by the
//! thread core; this module only defines the entry shape and the lookup
//! table itself. Page size is 4 KiB (12-bit offset).

use crate::fault::FaultCause;

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;
const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct TlbEntry {
    pub vpn: u32,
    pub ppn: u32,
    pub asid: u8,
    pub present: bool,
    pub writable: bool,
    pub executable: bool,
    pub supervisor: bool,
    pub global: bool,
    pub dirty: bool,
}

pub struct Translation {
    pub physical_addr: u32,
    pub writable: bool,
    pub dirty: bool,
}

/// A fully-associative, FIFO-replaced TLB.
///
/// Real hardware TLBs are set-associative; a flat `Vec` scanned linearly is
/// the faithful-enough functional model spec.md §9 calls for ("no cycle-exact
/// timing... modeling cache state beyond cosimulation's needs" is explicitly
/// out of scope, and the same rationale applies to TLB replacement policy).
pub struct Tlb {
    entries: Vec<TlbEntry>,
    capacity: usize,
    next_victim: usize,
}

impl Tlb {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_victim: 0,
        }
    }

    fn matches(entry: &TlbEntry, vpn: u32, asid: u8) -> bool {
        entry.vpn == vpn && (entry.global || entry.asid == asid)
    }

    pub fn lookup(&self, vaddr: u32, asid: u8) -> Option<TlbEntry> {
        let vpn = vaddr >> PAGE_SHIFT;
        self.entries
            .iter()
            .find(|e| Self::matches(e, vpn, asid))
            .copied()
    }

    /// Insert or replace an entry, evicting FIFO-oldest when full (spec.md
    /// §3 invariant (c): entries never overlap for the same ASID/space).
    pub fn insert(&mut self, entry: TlbEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.vpn == entry.vpn && e.asid == entry.asid)
        {
            *existing = entry;
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            self.entries[self.next_victim] = entry;
            self.next_victim = (self.next_victim + 1) % self.capacity;
        }
    }

    /// Invalidate the entry matching `vaddr`, any ASID (per `tlbinval`).
    pub fn invalidate(&mut self, vaddr: u32) {
        let vpn = vaddr >> PAGE_SHIFT;
        self.entries.retain(|e| e.vpn != vpn);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.next_victim = 0;
    }

    /// Translate `vaddr`, returning the fault that should be raised on a
    /// miss or permission violation. `is_fetch` selects between the
    /// ITLB-miss and data-TLB-miss causes; `is_write` additionally checks
    /// the dirty-bit subcase (spec.md §4.5). `is_supervisor` is the
    /// requesting thread's current privilege; a user-mode access to a
    /// `supervisor`-only page raises `SUPERVISOR_ACCESS` (spec.md §4.2, §7).
    pub fn translate(
        &self,
        vaddr: u32,
        asid: u8,
        is_fetch: bool,
        is_write: bool,
        is_supervisor: bool,
    ) -> Result<Translation, FaultCause> {
        let Some(entry) = self.lookup(vaddr, asid) else {
            return Err(if is_fetch {
                FaultCause::ItlbMiss
            } else {
                FaultCause::TlbMiss
            });
        };
        if !entry.present {
            return Err(if is_fetch {
                FaultCause::IfetchPageFault
            } else {
                FaultCause::PageFault { write: is_write }
            });
        }
        if entry.supervisor && !is_supervisor {
            return Err(FaultCause::SupervisorAccess);
        }
        if is_fetch && !entry.executable {
            return Err(FaultCause::NotExecutable);
        }
        if is_write && !entry.writable {
            return Err(FaultCause::NotWritable);
        }
        if is_write && entry.writable && !entry.dirty {
            // Clean, writable page: OS must set the dirty bit before the
            // store is allowed to proceed (spec.md §4.5 subcause).
            return Err(FaultCause::PageFault { write: true });
        }
        let offset = vaddr & (PAGE_SIZE - 1);
        Ok(Translation {
            physical_addr: (entry.ppn << PAGE_SHIFT) | offset,
            writable: entry.writable,
            dirty: entry.dirty,
        })
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vpn: u32, ppn: u32, asid: u8) -> TlbEntry {
        TlbEntry {
            vpn,
            ppn,
            asid,
            present: true,
            writable: true,
            executable: true,
            supervisor: false,
            global: false,
            dirty: true,
        }
    }

    #[test]
    fn miss_on_empty_tlb() {
        let tlb = Tlb::new();
        let result = tlb.translate(0x1000, 0, false, false, true);
        assert_eq!(result.unwrap_err(), FaultCause::TlbMiss);
    }

    #[test]
    fn hit_translates_page_offset() {
        let mut tlb = Tlb::new();
        tlb.insert(entry(1, 5, 0));
        let t = tlb.translate(0x1004, 0, false, false, true).unwrap();
        assert_eq!(t.physical_addr, (5 << PAGE_SHIFT) | 4);
    }

    #[test]
    fn invalidate_then_access_misses() {
        let mut tlb = Tlb::new();
        tlb.insert(entry(1, 5, 0));
        tlb.invalidate(0x1000);
        let result = tlb.translate(0x1004, 0, false, false, true);
        assert_eq!(result.unwrap_err(), FaultCause::TlbMiss);
    }

    #[test]
    fn write_to_clean_page_faults_with_write_subflag() {
        let mut tlb = Tlb::new();
        let mut e = entry(1, 5, 0);
        e.dirty = false;
        tlb.insert(e);
        let result = tlb.translate(0x1000, 0, false, true, true);
        assert_eq!(result.unwrap_err(), FaultCause::PageFault { write: true });
    }

    #[test]
    fn global_entry_matches_any_asid() {
        let mut tlb = Tlb::new();
        let mut e = entry(1, 5, 0);
        e.global = true;
        tlb.insert(e);
        assert!(tlb.translate(0x1000, 99, false, false, true).is_ok());
    }

    #[test]
    fn user_mode_access_to_supervisor_page_faults() {
        let mut tlb = Tlb::new();
        let mut e = entry(1, 5, 0);
        e.supervisor = true;
        tlb.insert(e);
        let result = tlb.translate(0x1000, 0, false, false, false);
        assert_eq!(result.unwrap_err(), FaultCause::SupervisorAccess);
    }

    #[test]
    fn supervisor_mode_access_to_supervisor_page_succeeds() {
        let mut tlb = Tlb::new();
        let mut e = entry(1, 5, 0);
        e.supervisor = true;
        tlb.insert(e);
        assert!(tlb.translate(0x1000, 0, false, false, true).is_ok());
    }

    #[test]
    fn fifo_eviction_when_full() {
        let mut tlb = Tlb::with_capacity(2);
        tlb.insert(entry(1, 1, 0));
        tlb.insert(entry(2, 2, 0));
        tlb.insert(entry(3, 3, 0));
        assert!(tlb.lookup(1 << PAGE_SHIFT, 0).is_none());
        assert!(tlb.lookup(3 << PAGE_SHIFT, 0).is_some());
    }
}
