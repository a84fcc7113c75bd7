//! Realtime platform capabilities backed by the Win32 API.

use windows::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE};
use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

use crate::platform::{PerfCounter, ProcessTracker, TrackedProcess};
use crate::timestamp::Qpc;

pub struct WindowsPerfCounter {
    frequency: u64,
}

impl WindowsPerfCounter {
    pub fn new() -> Self {
        let mut frequency = 0i64;
        // Cannot fail on XP and later.
        let _ = unsafe { QueryPerformanceFrequency(&mut frequency) };
        Self {
            frequency: frequency as u64,
        }
    }
}

impl Default for WindowsPerfCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PerfCounter for WindowsPerfCounter {
    fn frequency(&self) -> u64 {
        self.frequency
    }

    fn now(&self) -> Qpc {
        let mut counter = 0i64;
        let _ = unsafe { QueryPerformanceCounter(&mut counter) };
        counter as u64
    }
}

pub struct WindowsProcessTracker;

impl ProcessTracker for WindowsProcessTracker {
    fn open(&self, process_id: u32) -> Option<Box<dyn TrackedProcess>> {
        let handle =
            unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) }.ok()?;
        Some(Box::new(WindowsProcess { handle }))
    }
}

struct WindowsProcess {
    handle: HANDLE,
}

// HANDLE is a raw pointer wrapper; the process handle itself is thread-safe.
unsafe impl Send for WindowsProcess {}

impl TrackedProcess for WindowsProcess {
    fn image_name(&self) -> Option<String> {
        let mut buffer = [0u16; 1024];
        let mut len = buffer.len() as u32;
        unsafe {
            QueryFullProcessImageNameW(
                self.handle,
                PROCESS_NAME_WIN32,
                windows::core::PWSTR(buffer.as_mut_ptr()),
                &mut len,
            )
        }
        .ok()?;
        Some(String::from_utf16_lossy(&buffer[..len as usize]))
    }

    fn has_exited(&self) -> bool {
        let mut exit_code = 0u32;
        match unsafe { GetExitCodeProcess(self.handle, &mut exit_code) } {
            Ok(()) => exit_code != STILL_ACTIVE.0 as u32,
            Err(_) => false,
        }
    }
}

impl Drop for WindowsProcess {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.handle) };
    }
}
