/*++

Licensed under the Apache-2.0 license.

File Name:

    cmem.rs

Abstract:

    File contains the context memory allocator. A caller supplied buffer is
    carved into tagged slices; the bookkeeping descriptor lives at the head
    of the buffer itself.

--*/

use crate::memory_layout::CmemLayout;
use crate::{cwarn, SeError, SeResult};
use core::mem::size_of;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroize;

/// Allocation quantum. Every slice offset and length is a multiple of it.
pub const CMEM_ALIGN: usize = 64;
pub const CMEM_MAX_SLICES: usize = 7;
pub const CMEM_MAX_SIZE: usize = 4096;
pub const CMEM_HEADER_SIZE: usize = round_up(size_of::<CmemDescriptor>(), CMEM_ALIGN);

const CMEM_MAGIC: u32 = 0x4d45_4d43;

pub(crate) const fn round_up(val: usize, quantum: usize) -> usize {
    val.div_ceil(quantum) * quantum
}

/// What a slice is used for.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmemTag {
    ApiState = 1,
    Key = 2,
    DmaBuf = 3,
    AlignedBuf = 4,
    Scratch = 5,
}

impl CmemTag {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(CmemTag::ApiState),
            2 => Some(CmemTag::Key),
            3 => Some(CmemTag::DmaBuf),
            4 => Some(CmemTag::AlignedBuf),
            5 => Some(CmemTag::Scratch),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Zeroize)]
struct SliceRecord {
    tag: u32,
    offset: u32,
    len: u32,
}

#[repr(C)]
#[derive(Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Zeroize)]
struct CmemDescriptor {
    magic: u32,
    used_size: u32,
    max_size: u32,
    free_space: u32,
    entries: u32,
    slices: [SliceRecord; CMEM_MAX_SLICES],
}

impl CmemDescriptor {
    /// Whether the header may be adopted as is. Every live record has to
    /// lie inside the managed region, in address order without overlap, and
    /// the accounting has to add up.
    fn is_valid(&self, capacity: usize) -> bool {
        if self.magic != CMEM_MAGIC
            || self.max_size as usize != capacity
            || self.entries as usize > CMEM_MAX_SLICES
            || self.used_size.checked_add(self.free_space) != Some(self.max_size)
        {
            return false;
        }
        let mut cursor = CMEM_HEADER_SIZE as u32;
        let mut used = CMEM_HEADER_SIZE as u32;
        for rec in self.live() {
            let Some(end) = rec.offset.checked_add(rec.len) else {
                return false;
            };
            if CmemTag::from_raw(rec.tag).is_none()
                || rec.len == 0
                || rec.len as usize % CMEM_ALIGN != 0
                || rec.offset as usize % CMEM_ALIGN != 0
                || rec.offset < cursor
                || end > self.max_size
            {
                return false;
            }
            cursor = end;
            used += rec.len;
        }
        used == self.used_size
    }

    fn live(&self) -> &[SliceRecord] {
        &self.slices[..self.entries as usize]
    }
}

/// Handle to a live slice: an offset and length into the context memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmemSlice {
    tag: CmemTag,
    offset: u32,
    len: u32,
}

impl CmemSlice {
    pub fn tag(&self) -> CmemTag {
        self.tag
    }

    /// Requested length. The reserved length is rounded up to `CMEM_ALIGN`.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Context memory object.
pub struct Cmem<'a> {
    desc: &'a mut CmemDescriptor,
    arena: &'a mut [u8],
    base_addr: usize,
}

impl<'a> Cmem<'a> {
    /// Initialize the descriptor in `buf`, or adopt it if `buf` already
    /// holds one.
    ///
    /// The descriptor starts at the first `CMEM_ALIGN` boundary of `buf` and
    /// at most `CMEM_MAX_SIZE` bytes are managed.
    pub fn get_init(buf: &'a mut [u8], layout: &CmemLayout) -> SeResult<Self> {
        let base = buf.as_ptr().align_offset(CMEM_ALIGN);
        if base >= buf.len() {
            Err(SeError::DRIVER_CMEM_BUFFER_TOO_SMALL)?;
        }
        let capacity = (buf.len() - base).min(CMEM_MAX_SIZE) & !(CMEM_ALIGN - 1);
        if capacity < layout.required_size() {
            Err(SeError::DRIVER_CMEM_BUFFER_TOO_SMALL)?;
        }

        let region = &mut buf[base..base + capacity];
        let base_addr = region.as_ptr() as usize;
        let (head, arena) = region.split_at_mut(CMEM_HEADER_SIZE);
        let (desc, _) = CmemDescriptor::mut_from_prefix(head)
            .map_err(|_| SeError::DRIVER_CMEM_INVALID_ARGS)?;

        if !desc.is_valid(capacity) {
            arena.zeroize();
            *desc = CmemDescriptor {
                magic: CMEM_MAGIC,
                used_size: CMEM_HEADER_SIZE as u32,
                max_size: capacity as u32,
                free_space: (capacity - CMEM_HEADER_SIZE) as u32,
                entries: 0,
                slices: Default::default(),
            };
        }

        Ok(Self {
            desc,
            arena,
            base_addr,
        })
    }

    pub fn used_size(&self) -> usize {
        self.desc.used_size as usize
    }

    pub fn max_size(&self) -> usize {
        self.desc.max_size as usize
    }

    pub fn free_space(&self) -> usize {
        self.desc.free_space as usize
    }

    pub fn entries(&self) -> usize {
        self.desc.entries as usize
    }

    pub fn satisfies(&self, layout: &CmemLayout) -> bool {
        self.max_size() >= layout.required_size()
    }

    /// Reserve `size` bytes aligned to `align` (absolute address).
    ///
    /// The slice is zero filled. Placement is first fit over the gaps
    /// between live slices.
    pub fn allocate(&mut self, tag: CmemTag, align: usize, size: usize) -> SeResult<CmemSlice> {
        if size == 0 || !align.is_power_of_two() || align > CMEM_MAX_SIZE {
            Err(SeError::DRIVER_CMEM_INVALID_ARGS)?;
        }
        let entries = self.entries();
        if entries >= CMEM_MAX_SLICES {
            Err(SeError::DRIVER_CMEM_NO_FREE_SLOT)?;
        }
        let len = round_up(size, CMEM_ALIGN);
        if len > self.free_space() {
            Err(SeError::DRIVER_CMEM_NO_SPACE)?;
        }

        let mut cursor = CMEM_HEADER_SIZE;
        let mut placement = None;
        for i in 0..=entries {
            let gap_end = match self.desc.slices.get(i) {
                Some(rec) if i < entries => rec.offset as usize,
                _ => self.max_size(),
            };
            let start = round_up(self.base_addr + cursor, align) - self.base_addr;
            if start + len <= gap_end {
                placement = Some((i, start));
                break;
            }
            if let Some(rec) = self.desc.live().get(i) {
                cursor = (rec.offset + rec.len) as usize;
            }
        }
        let (index, offset) = placement.ok_or(SeError::DRIVER_CMEM_NO_SPACE)?;

        self.desc.slices.copy_within(index..entries, index + 1);
        self.desc.slices[index] = SliceRecord {
            tag: tag as u32,
            offset: offset as u32,
            len: len as u32,
        };
        self.desc.entries += 1;
        self.desc.used_size += len as u32;
        self.desc.free_space -= len as u32;

        let start = offset - CMEM_HEADER_SIZE;
        self.arena[start..start + len].zeroize();

        Ok(CmemSlice {
            tag,
            offset: offset as u32,
            len: size as u32,
        })
    }

    /// Zero and return a slice to the free space.
    ///
    /// Releasing a slice that is not live is logged and otherwise ignored.
    pub fn release(&mut self, tag: CmemTag, slice: CmemSlice) {
        let entries = self.entries();
        let Some(pos) = self
            .desc
            .live()
            .iter()
            .position(|r| r.offset == slice.offset && r.tag == tag as u32)
        else {
            cwarn!("[cmem] release of unknown slice at offset {}", slice.offset);
            return;
        };

        let rec = self.desc.slices[pos];
        let start = rec.offset as usize - CMEM_HEADER_SIZE;
        self.arena[start..start + rec.len as usize].zeroize();

        self.desc.slices.copy_within(pos + 1..entries, pos);
        self.desc.slices[entries - 1] = SliceRecord::default();
        self.desc.entries -= 1;
        self.desc.used_size -= rec.len;
        self.desc.free_space += rec.len;
    }

    fn range(&self, slice: &CmemSlice) -> SeResult<core::ops::Range<usize>> {
        let live = self.desc.live().iter().any(|r| {
            r.offset == slice.offset && r.tag == slice.tag as u32 && r.len >= slice.len
        });
        if !live {
            Err(SeError::DRIVER_CMEM_INVALID_SLICE)?;
        }
        let start = slice.offset as usize - CMEM_HEADER_SIZE;
        Ok(start..start + slice.len as usize)
    }

    pub fn slice(&self, slice: &CmemSlice) -> SeResult<&[u8]> {
        let range = self.range(slice)?;
        Ok(&self.arena[range])
    }

    pub fn slice_mut(&mut self, slice: &CmemSlice) -> SeResult<&mut [u8]> {
        let range = self.range(slice)?;
        Ok(&mut self.arena[range])
    }

    /// Tear down the descriptor. All slices must have been released.
    pub fn destroy(self) -> SeResult<()> {
        if self.entries() != 0 {
            Err(SeError::DRIVER_CMEM_SLICES_LIVE)?;
        }
        self.desc.zeroize();
        Ok(())
    }
}
