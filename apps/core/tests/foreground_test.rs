use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use searchything_core::foreground::{ActivationOutcome, ForegroundActivator, WindowApi, WindowHandle};

const OTHER_WINDOW: isize = 0x100;
const OVERLAY_WINDOW: isize = 0x200;
const OTHER_THREAD: u32 = 11;
const OVERLAY_THREAD: u32 = 22;

#[derive(Default, Clone, Copy)]
struct Faults {
    refuse_attach: bool,
    refuse_detach: bool,
    deny_foreground: bool,
    unknown_foreground_thread: bool,
    panic_while_attached: bool,
}

/// Window manager stand-in that grants the foreground only while the
/// overlay's input queue is attached to the foreground thread.
struct FaultyWindows {
    faults: Faults,
    foreground: Cell<isize>,
    attached: Cell<bool>,
    attaches: Cell<usize>,
    detaches: Cell<usize>,
    log: RefCell<Vec<&'static str>>,
}

impl FaultyWindows {
    fn new(faults: Faults) -> Self {
        Self {
            faults,
            foreground: Cell::new(OTHER_WINDOW),
            attached: Cell::new(false),
            attaches: Cell::new(0),
            detaches: Cell::new(0),
            log: RefCell::new(Vec::new()),
        }
    }
}

impl WindowApi for FaultyWindows {
    fn restore(&self, _window: WindowHandle) -> bool {
        self.log.borrow_mut().push("restore");
        true
    }

    fn set_foreground(&self, window: WindowHandle) -> bool {
        self.log.borrow_mut().push("set_foreground");
        if self.attached.get() && self.faults.panic_while_attached {
            panic!("window manager blew up");
        }
        if self.attached.get() && !self.faults.deny_foreground {
            self.foreground.set(window.as_raw());
            return true;
        }
        false
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        WindowHandle::from_raw(self.foreground.get())
    }

    fn window_thread(&self, window: WindowHandle) -> Option<u32> {
        match window.as_raw() {
            OVERLAY_WINDOW => Some(OVERLAY_THREAD),
            OTHER_WINDOW if !self.faults.unknown_foreground_thread => Some(OTHER_THREAD),
            _ => None,
        }
    }

    fn attach_input(&self, thread: u32, to_thread: u32, attach: bool) -> bool {
        assert_eq!((thread, to_thread), (OVERLAY_THREAD, OTHER_THREAD));
        if attach {
            self.log.borrow_mut().push("attach");
            if self.faults.refuse_attach {
                return false;
            }
            self.attaches.set(self.attaches.get() + 1);
            self.attached.set(true);
            true
        } else {
            self.log.borrow_mut().push("detach");
            self.detaches.set(self.detaches.get() + 1);
            self.attached.set(false);
            !self.faults.refuse_detach
        }
    }
}

fn overlay() -> WindowHandle {
    WindowHandle::from_raw(OVERLAY_WINDOW).unwrap()
}

#[test]
fn attached_retry_wins_the_foreground_and_detaches() {
    let activator = ForegroundActivator::new(FaultyWindows::new(Faults::default()));
    assert_eq!(activator.force_activate(overlay()), ActivationOutcome::Foreground);

    let api = activator.api();
    assert_eq!(api.attaches.get(), 1);
    assert_eq!(api.detaches.get(), 1);
    assert_eq!(
        *api.log.borrow(),
        vec![
            "restore",
            "set_foreground",
            "attach",
            "restore",
            "set_foreground",
            "detach"
        ]
    );
}

#[test]
fn every_attach_is_paired_with_a_detach_across_faults() {
    let cases = [
        Faults::default(),
        Faults {
            refuse_attach: true,
            ..Faults::default()
        },
        Faults {
            refuse_detach: true,
            ..Faults::default()
        },
        Faults {
            deny_foreground: true,
            ..Faults::default()
        },
        Faults {
            unknown_foreground_thread: true,
            ..Faults::default()
        },
    ];

    for faults in cases {
        let activator = ForegroundActivator::new(FaultyWindows::new(faults));
        let _ = activator.force_activate(overlay());
        let api = activator.api();
        assert_eq!(api.attaches.get(), api.detaches.get());
        assert!(!api.attached.get());
    }
}

#[test]
fn refused_attach_degrades_without_detaching() {
    let activator = ForegroundActivator::new(FaultyWindows::new(Faults {
        refuse_attach: true,
        ..Faults::default()
    }));
    assert_eq!(activator.force_activate(overlay()), ActivationOutcome::Degraded);
    assert!(!activator.api().log.borrow().contains(&"detach"));
}

#[test]
fn denied_foreground_is_degraded_not_an_error() {
    let activator = ForegroundActivator::new(FaultyWindows::new(Faults {
        deny_foreground: true,
        ..Faults::default()
    }));
    assert_eq!(activator.force_activate(overlay()), ActivationOutcome::Degraded);
}

#[test]
fn unknown_foreground_thread_skips_the_attach() {
    let activator = ForegroundActivator::new(FaultyWindows::new(Faults {
        unknown_foreground_thread: true,
        ..Faults::default()
    }));
    assert_eq!(activator.force_activate(overlay()), ActivationOutcome::Degraded);
    assert_eq!(activator.api().attaches.get(), 0);
}

#[test]
fn panic_while_attached_still_detaches() {
    let activator = ForegroundActivator::new(FaultyWindows::new(Faults {
        panic_while_attached: true,
        ..Faults::default()
    }));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| activator.force_activate(overlay())));
    assert!(outcome.is_err());

    let api = activator.api();
    assert_eq!(api.attaches.get(), 1);
    assert_eq!(api.detaches.get(), 1);
    assert!(!api.attached.get());
}
