use std::alloc;
use std::alloc::Layout;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use crate::throw;
use crate::vm::exception::Exception;

pub const WORD_SIZE: u64 = 8;

/// Word-addressed area holding data segments and code of compiled methods. Space is handed out
/// bump-pointer style and never reused.
#[derive(Debug)]
pub struct CodeMemory {
    area: *mut AtomicU64,
    layout: Layout,
    capacity: usize,
    top: Mutex<usize>,
}

unsafe impl Sync for CodeMemory {}
unsafe impl Send for CodeMemory {}

impl CodeMemory {
    pub fn with_capacity(words: usize) -> Result<CodeMemory, Exception> {
        let capacity = words.max(1);
        let layout = Layout::array::<AtomicU64>(capacity)
            .map_err(|_| throw!(OutOfMemory, "Code area of {} words is too large", words))?;

        // All-zero bytes are a valid AtomicU64
        let area = unsafe { alloc::alloc_zeroed(layout) } as *mut AtomicU64;
        if area.is_null() {
            alloc::handle_alloc_error(layout);
        }

        Ok(CodeMemory { area, layout, capacity, top: Mutex::new(0) })
    }

    /// Reserves `words` consecutive words and returns the address of the first one.
    pub fn allocate(&self, words: usize) -> Result<u64, Exception> {
        let mut top = self.top.lock();
        if self.capacity - *top < words {
            return Err(throw!(OutOfMemory, "Code area exhausted ({} of {} words used)", *top,
                self.capacity));
        }

        let start = self.base() + *top as u64 * WORD_SIZE;
        *top += words;

        Ok(start)
    }

    pub fn used(&self) -> usize {
        *self.top.lock()
    }

    pub fn contains(&self, address: u64) -> bool {
        self.slot(address).is_some()
    }

    pub fn read(&self, address: u64) -> Option<u64> {
        self.slot(address).map(|word| word.load(Ordering::Acquire))
    }

    /// Initial contents of a freshly allocated, not yet published range.
    pub(super) fn write_word(&self, address: u64, value: u64) -> Result<(), Exception> {
        self.word(address)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Rewrites a word of published code or data. Only the patch protocol calls this, while it
    /// holds the lock of the site being patched.
    pub(super) fn patch_word(&self, address: u64, value: u64) -> Result<(), Exception> {
        let word = self.word(address)?;
        let old = word.swap(value, Ordering::AcqRel);
        log::trace!("Patched {:#x}: {:#018x} -> {:#018x}", address, old, value);

        Ok(())
    }

    fn base(&self) -> u64 {
        self.area as usize as u64
    }

    fn word(&self, address: u64) -> Result<&AtomicU64, Exception> {
        self.slot(address)
            .ok_or_else(|| throw!(LinkageError, "{:#x} is not a word of the code area", address))
    }

    fn slot(&self, address: u64) -> Option<&AtomicU64> {
        let offset = address.checked_sub(self.base())?;
        if offset % WORD_SIZE != 0 {
            return None;
        }

        let index = (offset / WORD_SIZE) as usize;
        if index >= self.capacity {
            return None;
        }

        // Bounds and alignment checked above; the area lives as long as `self`
        Some(unsafe { &*self.area.add(index) })
    }
}

impl Drop for CodeMemory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.area as *mut u8, self.layout) }
    }
}
