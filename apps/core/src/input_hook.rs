//! Process-wide low-level keyboard interception.
//!
//! The OS calls the hook procedure for every keystroke in the session and
//! silently drops hooks that take too long to return. The procedure therefore
//! only decodes the event, records modifier state, enqueues one notification
//! per subscriber and pokes the UI loop through the waker. Everything else
//! happens on the UI loop when it drains its [`Subscription`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::hotkey::{
    Modifiers, VK_LCONTROL, VK_LMENU, VK_LSHIFT, VK_LWIN, VK_RCONTROL, VK_RMENU, VK_RSHIFT,
    VK_RWIN,
};

pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;

const CTRL_BIT: u8 = 0b0001;
const ALT_BIT: u8 = 0b0010;
const SHIFT_BIT: u8 = 0b0100;
const WIN_BIT: u8 = 0b1000;

static HOOK_CLAIMED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    KeyDown,
    KeyUp,
    SystemKeyDown,
    SystemKeyUp,
}

impl KeyTransition {
    pub fn from_message(message: u32) -> Option<Self> {
        match message {
            WM_KEYDOWN => Some(Self::KeyDown),
            WM_KEYUP => Some(Self::KeyUp),
            WM_SYSKEYDOWN => Some(Self::SystemKeyDown),
            WM_SYSKEYUP => Some(Self::SystemKeyUp),
            _ => None,
        }
    }

    pub fn is_press(self) -> bool {
        matches!(self, Self::KeyDown | Self::SystemKeyDown)
    }
}

/// `KBDLLHOOKSTRUCT.flags` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags(pub u32);

impl KeyFlags {
    pub const EXTENDED: u32 = 0x01;
    pub const INJECTED: u32 = 0x10;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn is_extended(self) -> bool {
        self.contains(Self::EXTENDED)
    }

    pub fn is_injected(self) -> bool {
        self.contains(Self::INJECTED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk_code: u32,
    pub scan_code: u32,
    pub flags: KeyFlags,
    pub timestamp: u32,
    pub transition: KeyTransition,
}

/// The fields of `KBDLLHOOKSTRUCT` the hook reads, copied out of OS memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawKeyboardInput {
    pub vk_code: u32,
    pub scan_code: u32,
    pub flags: u32,
    pub time: u32,
}

pub fn decode(message: u32, raw: &RawKeyboardInput) -> Option<KeyEvent> {
    let transition = KeyTransition::from_message(message)?;
    Some(KeyEvent {
        vk_code: raw.vk_code,
        scan_code: raw.scan_code,
        flags: KeyFlags(raw.flags),
        timestamp: raw.time,
        transition,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNotification {
    pub event: KeyEvent,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    Forward,
    Consume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Subscription {
    id: SubscriptionId,
    receiver: Receiver<KeyNotification>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Takes every notification queued so far without waiting.
    pub fn drain(&self) -> Vec<KeyNotification> {
        self.receiver.try_iter().collect()
    }
}

type ConsumeFilter = Box<dyn Fn(&KeyNotification) -> bool + Send + Sync>;
type Waker = Box<dyn Fn() + Send + Sync>;
type LiveModifiers = Box<dyn Fn() -> Option<Modifiers> + Send + Sync>;

/// Fans decoded key events out to subscribers. Shared between the OS hook
/// procedure and the [`InputHook`] that owns the registration.
pub struct KeyDispatcher {
    subscribers: Mutex<Vec<(SubscriptionId, Sender<KeyNotification>)>>,
    next_id: AtomicU64,
    modifiers: AtomicU8,
    consume: Option<ConsumeFilter>,
    waker: Option<Waker>,
    live: Option<LiveModifiers>,
}

impl Default for KeyDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            modifiers: AtomicU8::new(0),
            consume: None,
            waker: None,
            live: None,
        }
    }

    /// Called after each accepted notification so the UI loop knows to drain.
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Box::new(waker));
        self
    }

    /// Decides synchronously, inside the hook, whether an event is swallowed.
    /// Must be a pure, non-blocking predicate.
    pub fn with_consume_filter(
        mut self,
        filter: impl Fn(&KeyNotification) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.consume = Some(Box::new(filter));
        self
    }

    /// Source of the real modifier state, read on every non-modifier key
    /// press. Corrects modifiers whose release the hook never saw (secure
    /// desktop, keys held before install). Must not block.
    pub fn with_live_modifiers(
        mut self,
        source: impl Fn() -> Option<Modifiers> + Send + Sync + 'static,
    ) -> Self {
        self.live = Some(Box::new(source));
        self
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel();
        self.lock_subscribers().push((id, sender));
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    pub fn modifiers(&self) -> Modifiers {
        bits_to_modifiers(self.modifiers.load(Ordering::Acquire))
    }

    /// Entry point for the OS hook procedure: unrecognized message codes are
    /// forwarded without any notification.
    pub fn on_raw(&self, message: u32, raw: &RawKeyboardInput) -> HookVerdict {
        match decode(message, raw) {
            Some(event) if self.on_key(event) => HookVerdict::Consume,
            _ => HookVerdict::Forward,
        }
    }

    /// Publishes one event and reports whether it is consumed.
    pub fn on_key(&self, event: KeyEvent) -> bool {
        let modifiers = self.track_modifiers(&event);
        let notification = KeyNotification { event, modifiers };

        {
            let mut subscribers = self.lock_subscribers();
            subscribers.retain(|(_, sender)| sender.send(notification).is_ok());
        }

        if let Some(waker) = &self.waker {
            waker();
        }

        self.consume
            .as_ref()
            .map(|filter| filter(&notification))
            .unwrap_or(false)
    }

    fn track_modifiers(&self, event: &KeyEvent) -> Modifiers {
        let Some(bit) = modifier_bit(event.vk_code) else {
            if event.transition.is_press() {
                if let Some(live) = self.live.as_ref().and_then(|read| read()) {
                    self.modifiers.store(modifiers_to_bits(live), Ordering::Release);
                    return live;
                }
            }
            return self.modifiers();
        };

        let bits = if event.transition.is_press() {
            self.modifiers.fetch_or(bit, Ordering::AcqRel) | bit
        } else {
            self.modifiers.fetch_and(!bit, Ordering::AcqRel) & !bit
        };
        bits_to_modifiers(bits)
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Sender<KeyNotification>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn modifier_bit(vk_code: u32) -> Option<u8> {
    match vk_code {
        0x11 | VK_LCONTROL | VK_RCONTROL => Some(CTRL_BIT),
        0x12 | VK_LMENU | VK_RMENU => Some(ALT_BIT),
        0x10 | VK_LSHIFT | VK_RSHIFT => Some(SHIFT_BIT),
        VK_LWIN | VK_RWIN => Some(WIN_BIT),
        _ => None,
    }
}

fn modifiers_to_bits(modifiers: Modifiers) -> u8 {
    let mut bits = 0;
    if modifiers.ctrl {
        bits |= CTRL_BIT;
    }
    if modifiers.alt {
        bits |= ALT_BIT;
    }
    if modifiers.shift {
        bits |= SHIFT_BIT;
    }
    if modifiers.win {
        bits |= WIN_BIT;
    }
    bits
}

/// Modifier keys currently held according to the OS, or `None` where the
/// platform cannot tell.
pub fn live_modifiers() -> Option<Modifiers> {
    #[cfg(target_os = "windows")]
    {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

        let held = |vk: u32| unsafe { GetAsyncKeyState(vk as i32) } < 0;
        Some(Modifiers {
            ctrl: held(0x11),
            alt: held(0x12),
            shift: held(0x10),
            win: held(VK_LWIN) || held(VK_RWIN),
        })
    }

    #[cfg(not(target_os = "windows"))]
    {
        None
    }
}

fn bits_to_modifiers(bits: u8) -> Modifiers {
    Modifiers {
        ctrl: bits & CTRL_BIT != 0,
        alt: bits & ALT_BIT != 0,
        shift: bits & SHIFT_BIT != 0,
        win: bits & WIN_BIT != 0,
    }
}

/// Runs the dispatcher for one raw event, containing any panic so that it never
/// unwinds into the OS.
pub fn guarded_dispatch(dispatcher: &KeyDispatcher, message: u32, raw: &RawKeyboardInput) -> HookVerdict {
    panic::catch_unwind(AssertUnwindSafe(|| dispatcher.on_raw(message, raw)))
        .unwrap_or(HookVerdict::Forward)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookInstallError {
    #[error("failed to load '{library}' (error {code})")]
    LibraryUnavailable { library: &'static str, code: u32 },
    #[error("keyboard hook registration was rejected (error {code})")]
    RegistrationRejected { code: u32 },
    #[error("a keyboard hook is already installed in this process")]
    AlreadyInstalled,
    #[error("low-level keyboard hooks are not supported on this platform")]
    UnsupportedPlatform,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookRemoveError {
    #[error("failed to remove keyboard hook (error {code})")]
    UnhookFailed { code: u32 },
    #[error("failed to release '{library}' (error {code})")]
    LibraryRelease { library: &'static str, code: u32 },
}

pub trait HookBackend: Send {
    fn install(&mut self, dispatcher: Arc<KeyDispatcher>) -> Result<(), HookInstallError>;
    fn uninstall(&mut self) -> Result<(), HookRemoveError>;
}

/// Exclusive claim on the process-wide hook slot, released on drop.
#[derive(Debug)]
pub struct HookHandle {
    _private: (),
}

impl HookHandle {
    fn acquire() -> Result<Self, HookInstallError> {
        HOOK_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| HookInstallError::AlreadyInstalled)
    }
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        HOOK_CLAIMED.store(false, Ordering::Release);
    }
}

pub fn is_hook_active() -> bool {
    HOOK_CLAIMED.load(Ordering::Acquire)
}

pub struct InputHook {
    dispatcher: Arc<KeyDispatcher>,
    backend: Box<dyn HookBackend>,
    handle: Option<HookHandle>,
}

impl InputHook {
    pub fn install(
        dispatcher: KeyDispatcher,
        mut backend: Box<dyn HookBackend>,
    ) -> Result<Self, HookInstallError> {
        let handle = HookHandle::acquire()?;
        let dispatcher = Arc::new(dispatcher);
        backend.install(Arc::clone(&dispatcher))?;
        tracing::info!("low-level keyboard hook installed");

        Ok(Self {
            dispatcher,
            backend,
            handle: Some(handle),
        })
    }

    pub fn is_installed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Removes the OS registration. Repeated calls are no-ops; a removal
    /// failure is logged and the claim is released regardless.
    pub fn uninstall(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match self.backend.uninstall() {
            Ok(()) => tracing::info!("low-level keyboard hook removed"),
            Err(error) => tracing::warn!(%error, "keyboard hook removal failed; continuing"),
        }
        drop(handle);
    }
}

impl Drop for InputHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockHookCalls {
    pub installs: usize,
    pub uninstalls: usize,
}

/// Test backend: records lifecycle calls and can be told to fail.
#[derive(Default)]
pub struct MockHookBackend {
    calls: Arc<Mutex<MockHookCalls>>,
    fail_install: Option<HookInstallError>,
    fail_uninstall: Option<HookRemoveError>,
    dispatcher: Arc<Mutex<Option<Arc<KeyDispatcher>>>>,
}

impl MockHookBackend {
    pub fn failing_install(error: HookInstallError) -> Self {
        Self {
            fail_install: Some(error),
            ..Self::default()
        }
    }

    pub fn failing_uninstall(error: HookRemoveError) -> Self {
        Self {
            fail_uninstall: Some(error),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Arc<Mutex<MockHookCalls>> {
        Arc::clone(&self.calls)
    }

    /// Handle standing in for the OS: lets tests inject raw events.
    pub fn injector(&self) -> MockInjector {
        MockInjector {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl HookBackend for MockHookBackend {
    fn install(&mut self, dispatcher: Arc<KeyDispatcher>) -> Result<(), HookInstallError> {
        if let Some(error) = self.fail_install.clone() {
            return Err(error);
        }
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).installs += 1;
        *self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookRemoveError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).uninstalls += 1;
        *self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = None;
        match self.fail_uninstall.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct MockInjector {
    dispatcher: Arc<Mutex<Option<Arc<KeyDispatcher>>>>,
}

impl MockInjector {
    /// Behaves like the OS calling the hook: returns `None` once the hook is gone.
    pub fn inject(&self, message: u32, raw: RawKeyboardInput) -> Option<HookVerdict> {
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some(guarded_dispatch(&dispatcher, message, &raw))
    }
}

#[cfg(not(target_os = "windows"))]
#[derive(Default)]
pub struct UnsupportedHookBackend;

#[cfg(not(target_os = "windows"))]
impl HookBackend for UnsupportedHookBackend {
    fn install(&mut self, _dispatcher: Arc<KeyDispatcher>) -> Result<(), HookInstallError> {
        Err(HookInstallError::UnsupportedPlatform)
    }

    fn uninstall(&mut self) -> Result<(), HookRemoveError> {
        Ok(())
    }
}

#[cfg(target_os = "windows")]
mod win {
    use std::sync::{Arc, Mutex, PoisonError};

    use windows_sys::Win32::Foundation::{FreeLibrary, GetLastError, HMODULE, LPARAM, LRESULT, WPARAM};
    use windows_sys::Win32::System::LibraryLoader::LoadLibraryW;
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT,
        WH_KEYBOARD_LL,
    };

    use super::{
        guarded_dispatch, HookBackend, HookInstallError, HookRemoveError, HookVerdict,
        KeyDispatcher, RawKeyboardInput,
    };

    const SUPPORT_LIBRARY: &str = "user32.dll";

    static ACTIVE_DISPATCHER: Mutex<Option<Arc<KeyDispatcher>>> = Mutex::new(None);

    pub struct WindowsHookBackend {
        hook: HHOOK,
        library: HMODULE,
    }

    // The handles are plain OS identifiers; they are only used from the
    // thread that installed the hook.
    unsafe impl Send for WindowsHookBackend {}

    impl Default for WindowsHookBackend {
        fn default() -> Self {
            Self {
                hook: std::ptr::null_mut(),
                library: std::ptr::null_mut(),
            }
        }
    }

    impl HookBackend for WindowsHookBackend {
        fn install(&mut self, dispatcher: Arc<KeyDispatcher>) -> Result<(), HookInstallError> {
            let library_name = to_wide(SUPPORT_LIBRARY);
            let library = unsafe { LoadLibraryW(library_name.as_ptr()) };
            if library.is_null() {
                let code = unsafe { GetLastError() };
                return Err(HookInstallError::LibraryUnavailable {
                    library: SUPPORT_LIBRARY,
                    code,
                });
            }

            *ACTIVE_DISPATCHER.lock().unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);

            let hook = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), library, 0) };
            if hook.is_null() {
                let code = unsafe { GetLastError() };
                *ACTIVE_DISPATCHER.lock().unwrap_or_else(PoisonError::into_inner) = None;
                unsafe {
                    FreeLibrary(library);
                }
                return Err(HookInstallError::RegistrationRejected { code });
            }

            self.hook = hook;
            self.library = library;
            Ok(())
        }

        fn uninstall(&mut self) -> Result<(), HookRemoveError> {
            let mut result = Ok(());

            if !self.hook.is_null() {
                if unsafe { UnhookWindowsHookEx(self.hook) } == 0 {
                    let code = unsafe { GetLastError() };
                    result = Err(HookRemoveError::UnhookFailed { code });
                }
                self.hook = std::ptr::null_mut();
            }
            *ACTIVE_DISPATCHER.lock().unwrap_or_else(PoisonError::into_inner) = None;

            if !self.library.is_null() {
                if unsafe { FreeLibrary(self.library) } == 0 && result.is_ok() {
                    let code = unsafe { GetLastError() };
                    result = Err(HookRemoveError::LibraryRelease {
                        library: SUPPORT_LIBRARY,
                        code,
                    });
                }
                self.library = std::ptr::null_mut();
            }

            result
        }
    }

    /// Must return well inside the OS low-level hook timeout.
    unsafe extern "system" fn keyboard_hook_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        if n_code == HC_ACTION as i32 && l_param != 0 {
            // SAFETY: for HC_ACTION, l_param points to a KBDLLHOOKSTRUCT owned by the OS.
            let info = unsafe { &*(l_param as *const KBDLLHOOKSTRUCT) };
            let raw = RawKeyboardInput {
                vk_code: info.vkCode,
                scan_code: info.scanCode,
                flags: info.flags,
                time: info.time,
            };

            let dispatcher = ACTIVE_DISPATCHER
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(dispatcher) = dispatcher {
                if guarded_dispatch(&dispatcher, w_param as u32, &raw) == HookVerdict::Consume {
                    return 1;
                }
            }
        }

        unsafe { CallNextHookEx(std::ptr::null_mut(), n_code, w_param, l_param) }
    }

    fn to_wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }
}

#[cfg(target_os = "windows")]
pub use win::WindowsHookBackend;

pub fn default_hook_backend() -> Box<dyn HookBackend> {
    #[cfg(target_os = "windows")]
    {
        Box::new(WindowsHookBackend::default())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(UnsupportedHookBackend)
    }
}
