//! Named shared-memory frame channel for Windows.
//!
//! Attaches to a producer that publishes its frames through three named
//! kernel objects:
//!
//! 1. A file mapping holding a [`SharedHeader`] followed by the pixel
//!    payload window.
//! 2. An auto-reset event raised once per completed frame.
//! 3. A semaphore with a maximum count of one used as the exclusion
//!    token. It is created with an initial count of zero, so the relay
//!    can only take it after the producer has released it once.
//!
//! # Platform
//!
//! This module is **Windows-only**. On other platforms the types are
//! still defined but [`SharedMemoryChannel::open`] always fails.

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelOpener, FrameChannel, ProducerHeader, WaitStatus};
use crate::error::RelayError;

#[cfg(target_os = "windows")]
use crate::channel::layout::{HEADER_SIZE, SharedHeader};

// ── ChannelNames ─────────────────────────────────────────────────

/// Kernel object names published by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    /// File mapping holding header + payload.
    pub map: String,
    /// Event raised after every frame.
    pub event: String,
    /// Semaphore guarding the payload.
    pub lock: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            map: "svmem_frame".into(),
            event: "svmem_frame_ready".into(),
            lock: "svmem_frame_lock".into(),
        }
    }
}

impl ChannelOpener for ChannelNames {
    type Channel = SharedMemoryChannel;

    fn open(&mut self) -> Result<SharedMemoryChannel, RelayError> {
        SharedMemoryChannel::open(self)
    }
}

// ── SharedMemoryChannel ──────────────────────────────────────────

/// A producer's frame buffer mapped into this process.
///
/// # Safety
///
/// All unsafe FFI calls and raw pointer access are confined to this
/// struct. The view pointer stays valid until [`close`](FrameChannel::close).
pub struct SharedMemoryChannel {
    /// Bytes mapped, header included.
    view_len: usize,
    /// Whether this process currently holds the exclusion token.
    held: bool,

    // ── Platform handles (Windows only) ──────────────────────
    #[cfg(target_os = "windows")]
    mapping: Option<windows::Win32::Foundation::HANDLE>,
    #[cfg(target_os = "windows")]
    view: Option<windows::Win32::System::Memory::MEMORY_MAPPED_VIEW_ADDRESS>,
    #[cfg(target_os = "windows")]
    update_event: Option<windows::Win32::Foundation::HANDLE>,
    #[cfg(target_os = "windows")]
    data_lock: Option<windows::Win32::Foundation::HANDLE>,
}

/// Clamp a wait duration to a finite Win32 timeout.
#[cfg(target_os = "windows")]
fn wait_millis(timeout: std::time::Duration) -> u32 {
    // u32::MAX is INFINITE.
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1).min(u32::MAX - 1)
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use std::mem::size_of;
    use std::ptr::{addr_of_mut, read_volatile, write_volatile};
    use std::time::Duration;

    use tracing::{debug, warn};
    use windows::Win32::Foundation::{CloseHandle, FALSE, WAIT_OBJECT_0, WAIT_TIMEOUT};
    use windows::Win32::System::Memory::{
        FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MapViewOfFile, OpenFileMappingW,
        UnmapViewOfFile, VirtualQuery,
    };
    use windows::Win32::System::Threading::{
        CreateEventW, CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject,
    };
    use windows::core::PCWSTR;

    use super::*;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    impl SharedMemoryChannel {
        /// Attach to an existing producer region. Never creates it.
        pub fn open(names: &ChannelNames) -> Result<Self, RelayError> {
            let mut channel = Self {
                view_len: 0,
                held: false,
                mapping: None,
                view: None,
                update_event: None,
                data_lock: None,
            };
            // On early return `channel` is dropped, which closes whatever
            // was opened so far.
            channel.attach(names)?;
            Ok(channel)
        }

        fn attach(&mut self, names: &ChannelNames) -> Result<(), RelayError> {
            // 1. Mapping + view.
            let map_name = wide(&names.map);
            let mapping = unsafe {
                OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, FALSE, PCWSTR(map_name.as_ptr()))
            }
            .map_err(|e| {
                RelayError::ChannelUnavailable(format!("OpenFileMapping({}) failed: {e}", names.map))
            })?;
            self.mapping = Some(mapping);

            let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
            if view.Value.is_null() {
                return Err(RelayError::ChannelUnavailable(format!(
                    "MapViewOfFile({}) failed: {}",
                    names.map,
                    windows::core::Error::from_win32()
                )));
            }
            self.view = Some(view);

            // 2. Size of the view bounds every payload access.
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let n = unsafe {
                VirtualQuery(
                    Some(view.Value as *const _),
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if n == 0 || info.RegionSize < HEADER_SIZE {
                return Err(RelayError::ChannelUnavailable(format!(
                    "mapping {} is smaller than the frame header",
                    names.map
                )));
            }
            self.view_len = info.RegionSize;

            // 3. Update signal (auto-reset, initially clear).
            let event_name = wide(&names.event);
            let event =
                unsafe { CreateEventW(None, FALSE, FALSE, PCWSTR(event_name.as_ptr())) }
                    .map_err(|e| {
                        RelayError::Sync(format!("CreateEvent({}) failed: {e}", names.event))
                    })?;
            self.update_event = Some(event);

            // 4. Exclusion token (initial 0, max 1).
            let lock_name = wide(&names.lock);
            let lock = unsafe { CreateSemaphoreW(None, 0, 1, PCWSTR(lock_name.as_ptr())) }
                .map_err(|e| {
                    RelayError::Sync(format!("CreateSemaphore({}) failed: {e}", names.lock))
                })?;
            self.data_lock = Some(lock);

            debug!("attached to {} ({} byte view)", names.map, self.view_len);
            Ok(())
        }

        fn header_ptr(&self) -> Option<*mut SharedHeader> {
            self.view.map(|v| v.Value as *mut SharedHeader)
        }
    }

    impl FrameChannel for SharedMemoryChannel {
        fn wait_for_frame(&mut self, timeout: Duration) -> Result<WaitStatus, RelayError> {
            let event = self
                .update_event
                .ok_or_else(|| RelayError::Sync("channel closed".into()))?;
            let status = unsafe { WaitForSingleObject(event, wait_millis(timeout)) };
            if status == WAIT_OBJECT_0 {
                Ok(WaitStatus::Signaled)
            } else if status == WAIT_TIMEOUT {
                Ok(WaitStatus::TimedOut)
            } else {
                Err(RelayError::Sync(format!(
                    "wait on update event returned {:#x}",
                    status.0
                )))
            }
        }

        fn try_acquire(&mut self, timeout: Duration) -> Result<bool, RelayError> {
            let lock = self
                .data_lock
                .ok_or_else(|| RelayError::Sync("channel closed".into()))?;
            let status = unsafe { WaitForSingleObject(lock, wait_millis(timeout)) };
            if status == WAIT_OBJECT_0 {
                self.held = true;
                Ok(true)
            } else if status == WAIT_TIMEOUT {
                Ok(false)
            } else {
                Err(RelayError::Sync(format!(
                    "wait on frame lock returned {:#x}",
                    status.0
                )))
            }
        }

        fn release(&mut self) -> Result<(), RelayError> {
            let lock = self
                .data_lock
                .ok_or_else(|| RelayError::Sync("channel closed".into()))?;
            self.held = false;
            unsafe { ReleaseSemaphore(lock, 1, None) }
                .map_err(|e| RelayError::Sync(format!("ReleaseSemaphore failed: {e}")))
        }

        fn header(&self) -> ProducerHeader {
            match self.header_ptr() {
                Some(ptr) => unsafe { read_volatile(ptr) }.into(),
                None => ProducerHeader::default(),
            }
        }

        fn payload_mut(&mut self) -> &mut [u8] {
            match self.view {
                Some(view) => unsafe {
                    std::slice::from_raw_parts_mut(
                        (view.Value as *mut u8).add(HEADER_SIZE),
                        self.view_len - HEADER_SIZE,
                    )
                },
                None => &mut [],
            }
        }

        fn request_resolution(&mut self, width: u32, height: u32) {
            let Some(ptr) = self.header_ptr() else {
                return;
            };
            let w = i32::try_from(width).unwrap_or(i32::MAX);
            let h = i32::try_from(height).unwrap_or(i32::MAX);
            unsafe {
                write_volatile(addr_of_mut!((*ptr).rwidth), w);
                write_volatile(addr_of_mut!((*ptr).rheight), h);
            }
        }

        fn close(&mut self) {
            if self.held {
                if let Err(e) = self.release() {
                    warn!("releasing frame lock on close: {e}");
                }
            }
            unsafe {
                if let Some(h) = self.update_event.take() {
                    let _ = CloseHandle(h);
                }
                if let Some(h) = self.data_lock.take() {
                    let _ = CloseHandle(h);
                }
                if let Some(view) = self.view.take() {
                    let _ = UnmapViewOfFile(view);
                }
                if let Some(h) = self.mapping.take() {
                    let _ = CloseHandle(h);
                }
            }
            self.view_len = 0;
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl SharedMemoryChannel {
    /// Named shared memory is only available on Windows.
    pub fn open(names: &ChannelNames) -> Result<Self, RelayError> {
        Err(RelayError::ChannelUnavailable(format!(
            "named shared memory ({}) is only available on Windows",
            names.map
        )))
    }
}

#[cfg(not(target_os = "windows"))]
impl FrameChannel for SharedMemoryChannel {
    fn wait_for_frame(&mut self, _timeout: std::time::Duration) -> Result<WaitStatus, RelayError> {
        Err(RelayError::Sync("Not supported on this platform".into()))
    }

    fn try_acquire(&mut self, _timeout: std::time::Duration) -> Result<bool, RelayError> {
        Err(RelayError::Sync("Not supported on this platform".into()))
    }

    fn release(&mut self) -> Result<(), RelayError> {
        self.held = false;
        Ok(())
    }

    fn header(&self) -> ProducerHeader {
        ProducerHeader::default()
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        &mut []
    }

    fn request_resolution(&mut self, _width: u32, _height: u32) {}

    fn close(&mut self) {
        self.view_len = 0;
    }
}

impl Drop for SharedMemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}
