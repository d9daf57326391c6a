//! Forcing the overlay to the foreground.
//!
//! Windows refuses `SetForegroundWindow` to a process that does not own the
//! current foreground window. Attaching the target window's input queue to the
//! foreground thread's queue lifts that restriction for the duration of the
//! attachment. An attachment that is never undone leaves the two threads
//! sharing focus and key state, so the detach lives in a guard that runs on
//! every exit path, unwinding included. Nothing outside this module can attach
//! or detach input queues.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub fn from_raw(raw: isize) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn as_raw(self) -> isize {
        self.0
    }
}

/// The window-manager calls the activation protocol is written against.
pub trait WindowApi {
    /// Shows the window, undoing a minimized state.
    fn restore(&self, window: WindowHandle) -> bool;
    fn set_foreground(&self, window: WindowHandle) -> bool;
    fn foreground_window(&self) -> Option<WindowHandle>;
    fn window_thread(&self, window: WindowHandle) -> Option<u32>;
    fn attach_input(&self, thread: u32, to_thread: u32, attach: bool) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Foreground,
    /// The OS focus-stealing policy won; the window is shown but not active.
    Degraded,
}

pub struct ForegroundActivator<A: WindowApi> {
    api: A,
}

impl<A: WindowApi> ForegroundActivator<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn force_activate(&self, target: WindowHandle) -> ActivationOutcome {
        self.restore_and_focus(target);

        let foreground_thread = self
            .api
            .foreground_window()
            .and_then(|window| self.api.window_thread(window));
        let target_thread = self.api.window_thread(target);

        if let (Some(target_thread), Some(foreground_thread)) = (target_thread, foreground_thread) {
            if target_thread != foreground_thread {
                match InputAttachment::attach(&self.api, target_thread, foreground_thread) {
                    Some(_attachment) => self.restore_and_focus(target),
                    None => {
                        tracing::debug!(
                            target_thread,
                            foreground_thread,
                            "thread input attach refused; retrying without it"
                        );
                        self.restore_and_focus(target);
                    }
                }
            }
        }

        if self.api.foreground_window() == Some(target) {
            ActivationOutcome::Foreground
        } else {
            tracing::debug!(window = target.as_raw(), "foreground request denied by the OS");
            ActivationOutcome::Degraded
        }
    }

    fn restore_and_focus(&self, target: WindowHandle) {
        self.api.restore(target);
        self.api.set_foreground(target);
    }
}

struct InputAttachment<'a, A: WindowApi> {
    api: &'a A,
    thread: u32,
    to_thread: u32,
}

impl<'a, A: WindowApi> InputAttachment<'a, A> {
    fn attach(api: &'a A, thread: u32, to_thread: u32) -> Option<Self> {
        api.attach_input(thread, to_thread, true).then_some(Self {
            api,
            thread,
            to_thread,
        })
    }
}

impl<A: WindowApi> Drop for InputAttachment<'_, A> {
    fn drop(&mut self) {
        if !self.api.attach_input(self.thread, self.to_thread, false) {
            tracing::warn!(
                thread = self.thread,
                to_thread = self.to_thread,
                "failed to detach thread input"
            );
        }
    }
}

#[cfg(target_os = "windows")]
mod win {
    use windows_sys::Win32::System::Threading::AttachThreadInput;
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, GetWindowThreadProcessId, SetForegroundWindow, ShowWindow, SW_RESTORE,
    };

    use super::{WindowApi, WindowHandle};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct Win32WindowApi;

    impl WindowApi for Win32WindowApi {
        fn restore(&self, window: WindowHandle) -> bool {
            // The return value reports prior visibility, not success.
            unsafe {
                ShowWindow(window.as_raw() as _, SW_RESTORE);
            }
            true
        }

        fn set_foreground(&self, window: WindowHandle) -> bool {
            unsafe { SetForegroundWindow(window.as_raw() as _) != 0 }
        }

        fn foreground_window(&self) -> Option<WindowHandle> {
            WindowHandle::from_raw(unsafe { GetForegroundWindow() } as isize)
        }

        fn window_thread(&self, window: WindowHandle) -> Option<u32> {
            let thread = unsafe { GetWindowThreadProcessId(window.as_raw() as _, std::ptr::null_mut()) };
            (thread != 0).then_some(thread)
        }

        fn attach_input(&self, thread: u32, to_thread: u32, attach: bool) -> bool {
            unsafe { AttachThreadInput(thread, to_thread, attach as i32) != 0 }
        }
    }
}

#[cfg(target_os = "windows")]
pub use win::Win32WindowApi;
