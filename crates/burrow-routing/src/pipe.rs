//! Named pipe client opened for overlapped I/O.
//!
//! Every read and write is issued with its own `OVERLAPPED` record and
//! event, so a reader blocked on the pipe never holds up a writer sharing
//! the same handle. [`NamedPipe::close`] cancels outstanding operations and
//! fails later ones; the handle itself is released with the last clone.

use std::ffi::OsStr;
use std::io;
use std::iter;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    ERROR_BROKEN_PIPE, ERROR_IO_PENDING, ERROR_MORE_DATA, ERROR_OPERATION_ABORTED,
    ERROR_PIPE_BUSY, ERROR_PIPE_NOT_CONNECTED, GENERIC_READ, GENERIC_WRITE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_OVERLAPPED, OPEN_EXISTING, ReadFile, WriteFile,
};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Pipes::WaitNamedPipeW;
use windows_sys::Win32::System::Threading::CreateEventW;

/// Client end of a named pipe.
#[derive(Debug)]
pub struct NamedPipe {
    handle: OwnedHandle,
    closed: AtomicBool,
}

impl NamedPipe {
    /// Opens `path`, waiting up to `timeout` for a busy server instance.
    pub fn connect(path: &str, timeout: Duration) -> io::Result<Self> {
        let name = wide(path);
        match open(&name) {
            Err(error) if os_code(&error) == Some(ERROR_PIPE_BUSY) => {
                let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
                // SAFETY: `name` is a NUL-terminated UTF-16 string.
                if unsafe { WaitNamedPipeW(name.as_ptr(), millis) } == 0 {
                    return Err(io::Error::last_os_error());
                }
                open(&name)
            }
            other => other,
        }
    }

    /// Reads into `buf`; a broken or closed pipe reads as end of stream.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Ok(0);
        }
        let len = transfer_len(buf.len());
        let target = buf.as_mut_ptr();
        let outcome = self.transfer(|handle, overlapped| {
            // SAFETY: `target` points at `len` writable bytes that outlive the
            // operation, which `transfer` waits for.
            unsafe { ReadFile(handle, target, len, ptr::null_mut(), overlapped) != 0 }
        });
        match outcome {
            Err(error) if is_end_of_pipe(&error) => Ok(0),
            Err(error) if self.is_closed() && os_code(&error) == Some(ERROR_OPERATION_ABORTED) => {
                Ok(0)
            }
            other => other,
        }
    }

    /// Writes from `buf`.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let len = transfer_len(buf.len());
        let source = buf.as_ptr();
        self.transfer(|handle, overlapped| {
            // SAFETY: `source` points at `len` readable bytes that outlive the
            // operation, which `transfer` waits for.
            unsafe { WriteFile(handle, source, len, ptr::null_mut(), overlapped) != 0 }
        })
    }

    /// Cancels pending operations and fails any issued afterwards.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn raw(&self) -> RawHandle {
        self.handle.as_raw_handle()
    }

    fn cancel(&self) {
        // SAFETY: the handle is open for the lifetime of `self`. A failure only
        // means nothing was pending.
        unsafe { CancelIoEx(self.raw(), ptr::null()) };
    }

    /// Issues one overlapped operation and waits for its completion.
    fn transfer(
        &self,
        issue: impl FnOnce(RawHandle, *mut OVERLAPPED) -> bool,
    ) -> io::Result<usize> {
        let event = manual_reset_event()?;
        // SAFETY: an all-zero OVERLAPPED is the documented initial state.
        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = event.as_raw_handle();

        if !issue(self.raw(), &mut overlapped) {
            let error = io::Error::last_os_error();
            if os_code(&error) != Some(ERROR_IO_PENDING) {
                return Err(error);
            }
            // A close racing the issue may have missed this operation.
            if self.is_closed() {
                self.cancel();
            }
        }

        let mut transferred = 0_u32;
        // SAFETY: `overlapped` and the caller's buffer stay alive until this
        // blocking wait returns.
        if unsafe { GetOverlappedResult(self.raw(), &overlapped, &mut transferred, 1) } == 0 {
            let error = io::Error::last_os_error();
            if os_code(&error) != Some(ERROR_MORE_DATA) {
                return Err(error);
            }
        }
        Ok(transferred as usize)
    }
}

fn open(name: &[u16]) -> io::Result<NamedPipe> {
    // SAFETY: `name` is NUL-terminated and the remaining arguments are plain
    // flags or null pointers.
    let handle = unsafe {
        CreateFileW(
            name.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            0,
            ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_OVERLAPPED,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    Ok(NamedPipe {
        // SAFETY: `handle` is a freshly opened handle owned by nobody else.
        handle: unsafe { OwnedHandle::from_raw_handle(handle) },
        closed: AtomicBool::new(false),
    })
}

fn manual_reset_event() -> io::Result<OwnedHandle> {
    // SAFETY: unnamed event with default security.
    let event = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
    if event.is_null() {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `event` is a freshly created handle owned by nobody else.
    Ok(unsafe { OwnedHandle::from_raw_handle(event) })
}

fn wide(path: &str) -> Vec<u16> {
    OsStr::new(path).encode_wide().chain(iter::once(0)).collect()
}

fn transfer_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn os_code(error: &io::Error) -> Option<u32> {
    error.raw_os_error().and_then(|code| u32::try_from(code).ok())
}

fn is_end_of_pipe(error: &io::Error) -> bool {
    matches!(
        os_code(error),
        Some(ERROR_BROKEN_PIPE | ERROR_PIPE_NOT_CONNECTED)
    )
}
