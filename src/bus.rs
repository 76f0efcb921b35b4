//! System bus: flat little-endian memory plus memory-mapped devices
//!
//! The bus owns a contiguous byte array and an ordered list of device
//! windows. Word accesses are delegated to the first window containing
//! the address; everything else hits backing memory. Windows may not
//! overlap, and may sit above the top of backing memory (device
//! addresses are not bounds-checked against it).

use std::cell::RefCell;
use std::rc::Rc;

use queues::{IsQueue, Queue};
use thiserror::Error;
use tracing::debug;

/// Default backing memory size (16 MiB)
pub const DEFAULT_MEM_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("word access at 0x{addr:08x} is outside backing memory")]
    OutOfBounds { addr: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("memory size {0} is not a multiple of 4")]
    MisalignedSize(usize),
    #[error("device window 0x{start:08x}..=0x{end:08x} overlaps an existing window")]
    OverlappingWindow { start: u32, end: u32 },
}

/// A memory-mapped device. Reads and writes may have arbitrary side
/// effects; the bus does not assume idempotence.
pub trait Device {
    fn read32(&mut self, addr: u32) -> u32;
    fn write32(&mut self, addr: u32, value: u32);
}

struct Window {
    start: u32,
    end: u32,
    dev: Box<dyn Device>,
}

pub struct Bus {
    mem: Vec<u8>,
    windows: Vec<Window>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            mem: vec![0; DEFAULT_MEM_SIZE],
            windows: Vec::new(),
        }
    }
}

impl Bus {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size % 4 != 0 {
            return Err(ConfigError::MisalignedSize(size));
        }
        Ok(Self {
            mem: vec![0; size],
            windows: Vec::new(),
        })
    }

    pub fn mem_size(&self) -> usize {
        self.mem.len()
    }

    /// Map a device over `[start, start + size - 1]`
    pub fn map_device(
        &mut self,
        start: u32,
        size: u32,
        dev: Box<dyn Device>,
    ) -> Result<(), ConfigError> {
        let end = start + size - 1;
        for w in &self.windows {
            if start <= w.end && w.start <= end {
                return Err(ConfigError::OverlappingWindow { start, end });
            }
        }
        debug!(start, end, "mapping device window");
        self.windows.push(Window { start, end, dev });
        Ok(())
    }

    fn window_at(&mut self, addr: u32) -> Option<&mut Window> {
        self.windows
            .iter_mut()
            .find(|w| w.start <= addr && addr <= w.end)
    }

    pub fn read32(&mut self, addr: u32) -> Result<u32, BusError> {
        if let Some(w) = self.window_at(addr) {
            return Ok(w.dev.read32(addr));
        }
        let at = addr as usize;
        let bytes = self
            .mem
            .get(at..at + 4)
            .ok_or(BusError::OutOfBounds { addr })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write32(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        if let Some(w) = self.window_at(addr) {
            w.dev.write32(addr, value);
            return Ok(());
        }
        let at = addr as usize;
        let bytes = self
            .mem
            .get_mut(at..at + 4)
            .ok_or(BusError::OutOfBounds { addr })?;
        bytes.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Load a contiguous block of words little-endian, starting at addr
    pub fn load_words(&mut self, addr: u32, words: &[u32]) -> Result<(), BusError> {
        for (i, w) in words.iter().enumerate() {
            self.write32(addr + 4 * i as u32, *w)?;
        }
        Ok(())
    }

    /// Load a raw byte image directly into backing memory
    pub fn load_blob(&mut self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        let at = addr as usize;
        let dst = self
            .mem
            .get_mut(at..at + data.len())
            .ok_or(BusError::OutOfBounds { addr })?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

/// A write-only character console. Each word written buffers its low
/// byte; the owner drains the buffer with [`CharConsole::flush`].
/// Cloning shares the buffer, so a clone kept by the caller observes
/// output produced through the bus.
#[derive(Clone)]
pub struct CharConsole {
    buf: Rc<RefCell<Queue<char>>>,
}

impl CharConsole {
    pub fn new() -> Self {
        Self {
            buf: Rc::new(RefCell::new(Queue::new())),
        }
    }

    /// Return the buffered output and clear the buffer
    pub fn flush(&self) -> String {
        let mut out = String::new();
        let mut buf = self.buf.borrow_mut();
        while let Ok(ch) = buf.remove() {
            out.push(ch);
        }
        out
    }
}

impl Default for CharConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for CharConsole {
    fn read32(&mut self, _addr: u32) -> u32 {
        0
    }

    fn write32(&mut self, _addr: u32, value: u32) {
        self.buf
            .borrow_mut()
            .add((value & 0xff) as u8 as char)
            .expect("push onto console queue should work");
    }
}
