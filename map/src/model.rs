// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Storage, paging and access-permission enforcement for module memory maps.

use crate::page::cmis;
use crate::page::sff8636;
use crate::page::PageRef;
use crate::page::MAP_SIZE;
use crate::page::PAGE_SIZE;
use crate::Error;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// The access permission of a single byte of a memory map.
///
/// Permissions constrain the host only. The module itself maintains its
/// read-only registers through [`MemoryMap::store`] and friends, which do not
/// consult the mask.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    /// The host may read the byte, but writes are rejected.
    ReadOnly,
    /// The host may read and write the byte.
    ReadWrite,
    /// The byte is unallocated: it reads as zero and rejects writes.
    Reserved,
}

/// What a map does with a host write that hits a non-writable byte.
///
/// SFF modules discard such writes without complaint; CMIS modules report
/// them. Either way the write is all-or-nothing: no byte of a rejected write
/// is stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WritePolicy {
    /// Discard the entire write and report success (SFF-8472, SFF-8636).
    SilentDrop,
    /// Discard the entire write and return an error (CMIS).
    Report,
}

// How offsets 128..=255 are mapped onto installed pages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Paging {
    // A single upper page, no page-select register (SFF-8472 A0h).
    Flat,
    // Page-select byte at offset 127 (SFF-8636).
    Paged,
    // Bank-select byte at 126 and page-select at 127 (CMIS).
    Banked,
}

#[derive(Clone, Debug)]
struct Window {
    bytes: [u8; PAGE_SIZE],
    access: [Access; PAGE_SIZE],
}

impl Window {
    fn new() -> Self {
        Self {
            bytes: [0; PAGE_SIZE],
            access: [Access::Reserved; PAGE_SIZE],
        }
    }

    // A host read: reserved bytes read as zero.
    fn read(&self, index: usize) -> u8 {
        match self.access[index] {
            Access::Reserved => 0,
            _ => self.bytes[index],
        }
    }
}

#[derive(Clone, Debug)]
struct PageEntry {
    // Banked entries resolve through the bank-select byte; unbanked entries
    // ignore it, as real modules do.
    banked: bool,
    windows: Vec<Window>,
}

/// A module memory map at a single two-wire device address.
///
/// The map owns a fixed 128-byte lower page and any number of installed
/// 128-byte upper pages, of which one is visible at byte offsets 128..=255
/// at a time. Host accesses go through [`read`](Self::read) and
/// [`write`](Self::write), which resolve the current page selection and
/// enforce the per-byte access mask. Module-side accesses go through
/// [`fetch`](Self::fetch) and [`store`](Self::store), which address any
/// installed page directly and bypass the mask.
#[derive(Clone, Debug)]
pub struct MemoryMap {
    lower: Window,
    upper: BTreeMap<u8, PageEntry>,
    selected_page: u8,
    selected_bank: u8,
    paging: Paging,
    policy: WritePolicy,
}

impl MemoryMap {
    /// Build a flat map: a lower page and a single fixed upper page, with no
    /// page-select register.
    pub fn flat(policy: WritePolicy) -> Self {
        let mut map = Self::with_paging(Paging::Flat, policy);
        map.upper.insert(
            0,
            PageEntry {
                banked: false,
                windows: vec![Window::new()],
            },
        );
        map
    }

    /// Build a paged map with the page-select register at offset 127.
    pub fn paged(policy: WritePolicy) -> Self {
        Self::with_paging(Paging::Paged, policy)
    }

    /// Build a banked map with the bank-select register at offset 126 and
    /// the page-select register at offset 127.
    pub fn banked(policy: WritePolicy) -> Self {
        Self::with_paging(Paging::Banked, policy)
    }

    fn with_paging(paging: Paging, policy: WritePolicy) -> Self {
        Self {
            lower: Window::new(),
            upper: BTreeMap::new(),
            selected_page: 0,
            selected_bank: 0,
            paging,
            policy,
        }
    }

    /// Install an unbanked upper page.
    ///
    /// The page number is checked against the table of pages the map's
    /// standard allows. Installing a page that already exists resets it to
    /// empty, reserved storage. Flat maps cannot install additional pages.
    pub fn install_page(&mut self, page: u8) -> Result<(), Error> {
        if self.paging == Paging::Flat {
            return Err(Error::InvalidPage(page));
        }
        self.check_page_number(page)?;
        self.upper.insert(
            page,
            PageEntry {
                banked: false,
                windows: vec![Window::new()],
            },
        );
        Ok(())
    }

    /// Install a banked upper page with banks `0..n_banks`.
    ///
    /// The page must be one CMIS replicates across banks, and the bank
    /// count within the CMIS limit.
    pub fn install_banked_page(&mut self, page: u8, n_banks: u8) -> Result<(), Error> {
        if self.paging != Paging::Banked {
            return Err(Error::PageIsUnbanked(page));
        }
        if n_banks == 0 {
            return Err(Error::InvalidBank(n_banks));
        }
        cmis::check_banked_page(n_banks - 1, page)?;
        self.upper.insert(
            page,
            PageEntry {
                banked: true,
                windows: (0..n_banks).map(|_| Window::new()).collect(),
            },
        );
        Ok(())
    }

    /// The write policy of this map.
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// True if the map has no page-select register.
    pub fn is_flat(&self) -> bool {
        self.paging == Paging::Flat
    }

    /// The currently-selected upper page number.
    pub fn selected_page(&self) -> u8 {
        self.selected_page
    }

    /// The currently-selected bank number.
    pub fn selected_bank(&self) -> u8 {
        self.selected_bank
    }

    /// Every installed page, one entry per bank for banked pages.
    pub fn installed_pages(&self) -> Vec<PageRef> {
        let mut out = Vec::new();
        for (page, entry) in &self.upper {
            if entry.banked {
                for bank in 0..entry.windows.len() as u8 {
                    out.push(PageRef::banked(bank, *page));
                }
            } else {
                out.push(PageRef::upper(*page));
            }
        }
        out
    }

    /// Select the upper page visible at offsets 128..=255.
    ///
    /// A page number outside the standard's allowed table is rejected with
    /// [`Error::InvalidPage`]; a legal but uninstalled page with
    /// [`Error::PageNotInstalled`] (for banked maps, resolved against the
    /// currently-selected bank). The selection is left unchanged on error.
    pub fn select_page(&mut self, page: u8) -> Result<(), Error> {
        match self.paging {
            Paging::Flat if page == 0 => return Ok(()),
            Paging::Flat => {
                return Err(Error::PageNotInstalled { bank: 0, page });
            }
            _ => {}
        }
        self.check_page_number(page)?;
        let bank = self.selected_bank;
        self.lookup(bank, page)?;
        self.selected_page = page;
        Ok(())
    }

    /// Select the bank used to resolve banked upper pages.
    ///
    /// The bank/page combination is checked when the page is selected or
    /// accessed, not here, since hosts program the two bytes in either
    /// order.
    pub fn select_bank(&mut self, bank: u8) -> Result<(), Error> {
        if self.paging != Paging::Banked || bank > cmis::MAX_BANK {
            return Err(Error::InvalidBank(bank));
        }
        self.selected_bank = bank;
        Ok(())
    }

    /// A host read of `len` bytes starting at `offset`.
    ///
    /// Reads resolve the current page selection for offsets 128..=255,
    /// return 0x00 for reserved bytes, and reflect the live selection at the
    /// page-select and bank-select offsets. A read may not straddle the
    /// lower/upper boundary.
    pub fn read(&self, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        check_span(offset, len)?;
        let mut out = Vec::with_capacity(len);
        if usize::from(offset) < PAGE_SIZE {
            for i in 0..len {
                out.push(self.read_lower_byte(offset + i as u8));
            }
        } else {
            let window = self.lookup(self.selected_bank, self.selected_page)?;
            for i in 0..len {
                out.push(window.read(usize::from(offset) + i - PAGE_SIZE));
            }
        }
        Ok(out)
    }

    /// A host write of `data` starting at `offset`.
    ///
    /// The write is all-or-nothing: if any targeted byte is not writable,
    /// nothing is stored and the outcome is dictated by the map's
    /// [`WritePolicy`]. Bytes landing on the page-select or bank-select
    /// registers update the selection instead of storage; the selection
    /// bytes are applied after the data bytes.
    pub fn write(&mut self, offset: u8, data: &[u8]) -> Result<(), Error> {
        check_span(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        if usize::from(offset) < PAGE_SIZE {
            self.write_lower(offset, data)
        } else {
            self.write_upper(offset, data)
        }
    }

    fn write_lower(&mut self, offset: u8, data: &[u8]) -> Result<(), Error> {
        for i in 0..data.len() {
            let o = offset + i as u8;
            if self.is_select_byte(o) {
                continue;
            }
            if self.lower.access[usize::from(o)] != Access::ReadWrite {
                return self.reject(o);
            }
        }
        let mut bank_select = None;
        let mut page_select = None;
        for (i, byte) in data.iter().enumerate() {
            let o = offset + i as u8;
            if self.paging == Paging::Banked && o == BANK_SELECT {
                bank_select = Some(*byte);
            } else if self.is_select_byte(o) {
                page_select = Some(*byte);
            } else {
                self.lower.bytes[usize::from(o)] = *byte;
            }
        }
        if let Some(bank) = bank_select {
            self.apply_selection(Self::select_bank, bank)?;
        }
        if let Some(page) = page_select {
            self.apply_selection(Self::select_page, page)?;
        }
        Ok(())
    }

    fn write_upper(&mut self, offset: u8, data: &[u8]) -> Result<(), Error> {
        let policy = self.policy;
        let window = self.lookup_mut(self.selected_bank, self.selected_page)?;
        let base = usize::from(offset) - PAGE_SIZE;
        for i in 0..data.len() {
            if window.access[base + i] != Access::ReadWrite {
                return match policy {
                    WritePolicy::SilentDrop => Ok(()),
                    WritePolicy::Report => Err(Error::AccessDenied(offset + i as u8)),
                };
            }
        }
        window.bytes[base..base + data.len()].copy_from_slice(data);
        Ok(())
    }

    // Apply a host-written selection byte, translating failures per the
    // write policy: real modules keep their previous, valid selection when
    // asked for a page they do not implement.
    fn apply_selection(
        &mut self,
        select: fn(&mut Self, u8) -> Result<(), Error>,
        value: u8,
    ) -> Result<(), Error> {
        match select(self, value) {
            Ok(()) => Ok(()),
            Err(_) if self.policy == WritePolicy::SilentDrop => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn reject(&self, offset: u8) -> Result<(), Error> {
        match self.policy {
            WritePolicy::SilentDrop => Ok(()),
            WritePolicy::Report => Err(Error::AccessDenied(offset)),
        }
    }

    // Page numbers the map accepts, per the standard its paging mode
    // models: SFF-8636 section 6.1 for paged maps, CMIS Figure 8-1 for
    // banked ones.
    fn check_page_number(&self, page: u8) -> Result<(), Error> {
        match self.paging {
            Paging::Flat => Ok(()),
            Paging::Paged => sff8636::check_page(page),
            Paging::Banked => cmis::check_page(page),
        }
    }

    fn is_select_byte(&self, offset: u8) -> bool {
        match self.paging {
            Paging::Flat => false,
            Paging::Paged => offset == PAGE_SELECT,
            Paging::Banked => offset == PAGE_SELECT || offset == BANK_SELECT,
        }
    }

    fn read_lower_byte(&self, offset: u8) -> u8 {
        match (self.paging, offset) {
            (Paging::Paged | Paging::Banked, PAGE_SELECT) => self.selected_page,
            (Paging::Banked, BANK_SELECT) => self.selected_bank,
            _ => self.lower.read(usize::from(offset)),
        }
    }

    /// A module-side read of raw storage, ignoring the access mask and the
    /// current page selection.
    pub fn fetch(&self, page: PageRef, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        check_window_span(page, offset, len)?;
        let window = self.window(page)?;
        let base = usize::from(offset - page.min_offset());
        Ok(window.bytes[base..base + len].to_vec())
    }

    /// Fetch a single byte of raw storage.
    pub fn fetch_byte(&self, page: PageRef, offset: u8) -> Result<u8, Error> {
        Ok(self.fetch(page, offset, 1)?[0])
    }

    /// A module-side write of raw storage, ignoring the access mask and the
    /// current page selection.
    pub fn store(&mut self, page: PageRef, offset: u8, data: &[u8]) -> Result<(), Error> {
        check_window_span(page, offset, data.len())?;
        let window = self.window_mut(page)?;
        let base = usize::from(offset - page.min_offset());
        window.bytes[base..base + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Store a single byte of raw storage.
    pub fn store_byte(&mut self, page: PageRef, offset: u8, byte: u8) -> Result<(), Error> {
        self.store(page, offset, &[byte])
    }

    /// Read-modify-write a single byte of raw storage.
    pub fn update_byte(
        &mut self,
        page: PageRef,
        offset: u8,
        f: impl FnOnce(u8) -> u8,
    ) -> Result<(), Error> {
        let byte = self.fetch_byte(page, offset)?;
        self.store_byte(page, offset, f(byte))
    }

    /// Set the access permission for a range of bytes.
    pub fn set_access(
        &mut self,
        page: PageRef,
        range: RangeInclusive<u8>,
        access: Access,
    ) -> Result<(), Error> {
        let (start, end) = (*range.start(), *range.end());
        check_window_span(page, start, usize::from(end - start) + 1)?;
        let window = self.window_mut(page)?;
        let base = usize::from(page.min_offset());
        for o in range {
            window.access[usize::from(o) - base] = access;
        }
        Ok(())
    }

    /// The modulo-256 sum of a span of raw storage, as used by the CC_BASE
    /// and CC_EXT checksum registers.
    pub fn checksum(&self, page: PageRef, span: RangeInclusive<u8>) -> Result<u8, Error> {
        let (start, end) = (*span.start(), *span.end());
        let bytes = self.fetch(page, start, usize::from(end - start) + 1)?;
        Ok(bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)))
    }

    fn entry(&self, page: u8) -> Result<&PageEntry, Error> {
        self.upper.get(&page).ok_or(Error::PageNotInstalled {
            bank: self.selected_bank,
            page,
        })
    }

    fn lookup(&self, bank: u8, page: u8) -> Result<&Window, Error> {
        let entry = self.entry(page)?;
        let index = if entry.banked { usize::from(bank) } else { 0 };
        entry
            .windows
            .get(index)
            .ok_or(Error::PageNotInstalled { bank, page })
    }

    fn lookup_mut(&mut self, bank: u8, page: u8) -> Result<&mut Window, Error> {
        // Repeat the lookup by hand: a helper borrowing `&mut self.upper`
        // cannot also consult `self.selected_bank`.
        let entry = self
            .upper
            .get_mut(&page)
            .ok_or(Error::PageNotInstalled { bank, page })?;
        let index = if entry.banked { usize::from(bank) } else { 0 };
        entry
            .windows
            .get_mut(index)
            .ok_or(Error::PageNotInstalled { bank, page })
    }

    fn window(&self, page: PageRef) -> Result<&Window, Error> {
        match page {
            PageRef::Lower => Ok(&self.lower),
            PageRef::Upper { bank, page } => self.lookup(bank, page),
        }
    }

    fn window_mut(&mut self, page: PageRef) -> Result<&mut Window, Error> {
        match page {
            PageRef::Lower => Ok(&mut self.lower),
            PageRef::Upper { bank, page } => self.lookup_mut(bank, page),
        }
    }
}

/// The offset of the page-select register on paged maps.
pub const PAGE_SELECT: u8 = 127;

/// The offset of the bank-select register on banked maps.
pub const BANK_SELECT: u8 = 126;

// Validate a host access against the 256-byte map and the lower/upper
// boundary.
fn check_span(offset: u8, len: usize) -> Result<(), Error> {
    let end = usize::from(offset) + len;
    if end > MAP_SIZE {
        return Err(Error::OutOfRange { offset, len });
    }
    if usize::from(offset) < PAGE_SIZE && end > PAGE_SIZE {
        return Err(Error::CrossPage { offset, len });
    }
    Ok(())
}

// Validate a module-side access against one 128-byte window.
fn check_window_span(page: PageRef, offset: u8, len: usize) -> Result<(), Error> {
    if offset < page.min_offset() {
        return Err(Error::OutOfRange { offset, len });
    }
    if usize::from(offset) + len > usize::from(page.max_offset()) + 1 {
        return Err(Error::OutOfRange { offset, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Access;
    use super::Error;
    use super::MemoryMap;
    use super::PageRef;
    use super::WritePolicy;

    fn paged_map() -> MemoryMap {
        let mut map = MemoryMap::paged(WritePolicy::SilentDrop);
        map.install_page(0x00).unwrap();
        map.install_page(0x03).unwrap();
        map.set_access(PageRef::Lower, 0..=127, Access::ReadWrite)
            .unwrap();
        map.set_access(PageRef::upper(0x00), 128..=255, Access::ReadOnly)
            .unwrap();
        map.set_access(PageRef::upper(0x03), 128..=255, Access::ReadWrite)
            .unwrap();
        map
    }

    #[test]
    fn test_read_write_round_trip() {
        let mut map = paged_map();
        map.write(10, &[0xaa, 0xbb]).unwrap();
        assert_eq!(map.read(10, 2).unwrap(), vec![0xaa, 0xbb]);
    }

    #[test]
    fn test_reserved_reads_zero() {
        let mut map = paged_map();
        map.set_access(PageRef::Lower, 5..=5, Access::Reserved)
            .unwrap();
        map.store_byte(PageRef::Lower, 5, 0x55).unwrap();
        assert_eq!(map.read(5, 1).unwrap(), vec![0]);
        // The raw storage is still visible module-side.
        assert_eq!(map.fetch_byte(PageRef::Lower, 5).unwrap(), 0x55);
    }

    #[test]
    fn test_silent_drop_is_all_or_nothing() {
        let mut map = paged_map();
        map.set_access(PageRef::Lower, 21..=21, Access::ReadOnly)
            .unwrap();
        // A write spanning a read-only byte succeeds but stores nothing.
        map.write(20, &[1, 2, 3]).unwrap();
        assert_eq!(map.read(20, 3).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_report_policy_rejects() {
        let mut map = MemoryMap::paged(WritePolicy::Report);
        map.install_page(0x00).unwrap();
        map.set_access(PageRef::Lower, 0..=9, Access::ReadWrite)
            .unwrap();
        map.set_access(PageRef::Lower, 10..=10, Access::ReadOnly)
            .unwrap();
        assert_eq!(map.write(9, &[1, 2]).unwrap_err(), Error::AccessDenied(10));
        assert_eq!(map.read(9, 1).unwrap(), vec![0]);
    }

    #[test]
    fn test_cross_page_rejected() {
        let map = paged_map();
        assert_eq!(
            map.read(120, 16).unwrap_err(),
            Error::CrossPage {
                offset: 120,
                len: 16
            }
        );
        let mut map = paged_map();
        assert!(matches!(
            map.write(127, &[0, 0]).unwrap_err(),
            Error::CrossPage { .. }
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let map = paged_map();
        assert_eq!(
            map.read(250, 10).unwrap_err(),
            Error::OutOfRange {
                offset: 250,
                len: 10
            }
        );
    }

    #[test]
    fn test_page_select() {
        let mut map = paged_map();
        map.store_byte(PageRef::upper(0x03), 200, 0x33).unwrap();
        map.store_byte(PageRef::upper(0x00), 200, 0x11).unwrap();

        assert_eq!(map.read(200, 1).unwrap(), vec![0x11]);
        map.write(127, &[0x03]).unwrap();
        assert_eq!(map.selected_page(), 0x03);
        assert_eq!(map.read(127, 1).unwrap(), vec![0x03]);
        assert_eq!(map.read(200, 1).unwrap(), vec![0x33]);
    }

    #[test]
    fn test_select_uninstalled_page_silently_kept() {
        let mut map = paged_map();
        map.write(127, &[0x40]).unwrap();
        assert_eq!(map.selected_page(), 0);
    }

    #[test]
    fn test_invalid_page_numbers_rejected() {
        // 0x22 is reserved under SFF-8636.
        let mut map = MemoryMap::paged(WritePolicy::SilentDrop);
        assert_eq!(map.install_page(0x22).unwrap_err(), Error::InvalidPage(0x22));

        // 0x05 is reserved under CMIS, and unbanked pages cannot be
        // installed banked.
        let mut map = MemoryMap::banked(WritePolicy::Report);
        assert_eq!(map.install_page(0x05).unwrap_err(), Error::InvalidPage(0x05));
        assert_eq!(
            map.install_banked_page(0x00, 2).unwrap_err(),
            Error::PageIsUnbanked(0x00)
        );
        assert_eq!(
            map.install_banked_page(0x10, 0).unwrap_err(),
            Error::InvalidBank(0)
        );

        // An out-of-range page select is rejected distinctly from a legal
        // but uninstalled one.
        map.install_page(0x00).unwrap();
        assert_eq!(map.write(127, &[0x05]).unwrap_err(), Error::InvalidPage(0x05));
        assert_eq!(
            map.write(127, &[0x10]).unwrap_err(),
            Error::PageNotInstalled {
                bank: 0,
                page: 0x10
            }
        );
    }

    #[test]
    fn test_select_uninstalled_page_reported() {
        let mut map = MemoryMap::banked(WritePolicy::Report);
        map.install_page(0x00).unwrap();
        assert_eq!(
            map.write(127, &[0x10]).unwrap_err(),
            Error::PageNotInstalled {
                bank: 0,
                page: 0x10
            }
        );
    }

    #[test]
    fn test_banked_pages_resolve_through_bank_select() {
        let mut map = MemoryMap::banked(WritePolicy::Report);
        map.install_page(0x00).unwrap();
        map.install_banked_page(0x11, 2).unwrap();
        map.set_access(PageRef::banked(0, 0x11), 128..=255, Access::ReadOnly)
            .unwrap();
        map.set_access(PageRef::banked(1, 0x11), 128..=255, Access::ReadOnly)
            .unwrap();
        map.store_byte(PageRef::banked(0, 0x11), 130, 0xb0).unwrap();
        map.store_byte(PageRef::banked(1, 0x11), 130, 0xb1).unwrap();

        map.write(127, &[0x11]).unwrap();
        assert_eq!(map.read(130, 1).unwrap(), vec![0xb0]);
        map.write(126, &[0x01]).unwrap();
        assert_eq!(map.read(126, 1).unwrap(), vec![0x01]);
        assert_eq!(map.read(130, 1).unwrap(), vec![0xb1]);

        // Bank 2 is not installed for this page.
        map.write(126, &[0x02]).unwrap();
        assert_eq!(
            map.read(130, 1).unwrap_err(),
            Error::PageNotInstalled {
                bank: 2,
                page: 0x11
            }
        );
    }

    #[test]
    fn test_lower_page_shared_across_selections() {
        let mut map = paged_map();
        map.write(42, &[0x42]).unwrap();
        let before = map.read(0, 127).unwrap();
        map.write(127, &[0x03]).unwrap();
        assert_eq!(map.read(0, 127).unwrap(), before);
    }

    #[test]
    fn test_checksum() {
        let mut map = paged_map();
        map.store(PageRef::Lower, 0, &[1, 2, 3, 0xff]).unwrap();
        assert_eq!(map.checksum(PageRef::Lower, 0..=3).unwrap(), 5);
    }

    #[test]
    fn test_flat_map_has_no_page_select() {
        let mut map = MemoryMap::flat(WritePolicy::SilentDrop);
        map.set_access(PageRef::Lower, 0..=127, Access::ReadWrite)
            .unwrap();
        map.set_access(PageRef::upper(0), 128..=255, Access::ReadWrite)
            .unwrap();
        // Offset 127 is plain storage.
        map.write(127, &[0x7f]).unwrap();
        assert_eq!(map.read(127, 1).unwrap(), vec![0x7f]);
        assert_eq!(map.selected_page(), 0);
        // The single upper page is always visible.
        map.write(200, &[0xaa]).unwrap();
        assert_eq!(map.read(200, 1).unwrap(), vec![0xaa]);
    }
}
