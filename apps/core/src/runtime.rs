use std::sync::Arc;

use crate::action_executor::{LaunchError, Launcher};
use crate::config::{self, Config, ConfigError};
use crate::discovery::{build_catalog, default_shortcut_roots, IconResolver, ShortcutSource, StartMenuSource};
use crate::foreground::{ActivationOutcome, ForegroundActivator, WindowApi};
use crate::hotkey::{parse_hotkey, Hotkey, HotkeyParseError};
use crate::input_hook::{HookInstallError, Subscription};
use crate::logging::{self, LoggingError};
use crate::model::ShortcutItem;
use crate::overlay_state::{ActivationController, OverlayCommand, OverlayState};
use crate::query_pipeline::QueryPipeline;
use crate::search::SearchIndex;
use crate::windows_overlay::{OverlayError, OverlayEvent, OverlaySurface};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("hotkey error: {0}")]
    Hotkey(#[from] HotkeyParseError),
    #[error("keyboard hook error: {0}")]
    Hook(#[from] HookInstallError),
    #[error("overlay error: {0}")]
    Overlay(#[from] OverlayError),
    #[error("single-instance mutex failed with error {0}")]
    SingleInstance(u32),
}

pub fn run() -> Result<(), RuntimeError> {
    let config = config::load(None)?;
    let _log_guard = logging::init(&config.log_level)?;
    if !config.config_path.exists() {
        config::save(&config)?;
        tracing::info!(path = %config.config_path.display(), "wrote default config");
    }

    let hotkey = parse_hotkey(&config.hotkey)?;
    #[cfg(target_os = "windows")]
    let _com = crate::discovery::ComApartment::enter();
    let index = Arc::new(SearchIndex::with_cap(config.max_results as usize));
    let report = build_catalog(&catalog_sources(&config), icon_resolver().as_ref());
    index.load(report.items);
    tracing::info!(
        mode = runtime_mode(),
        hotkey = %config.hotkey,
        items = index.len(),
        skipped = report.skipped,
        config_path = %config.config_path.display(),
        "startup"
    );

    #[cfg(target_os = "windows")]
    {
        run_overlay(hotkey, index)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let _ = (hotkey, index);
        tracing::info!("non-windows runtime mode: no keyboard hook or overlay");
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn run_overlay(hotkey: Hotkey, index: Arc<SearchIndex>) -> Result<(), RuntimeError> {
    use crate::action_executor::ShellLauncher;
    use crate::foreground::Win32WindowApi;
    use crate::input_hook::{default_hook_backend, live_modifiers, InputHook, KeyDispatcher};
    use crate::windows_overlay::NativeOverlayShell;

    let Some(_single_instance) = acquire_single_instance_guard()? else {
        tracing::info!("runtime already active; exiting duplicate process");
        return Ok(());
    };

    let overlay = NativeOverlayShell::create()?;
    tracing::info!("native overlay shell initialized (hidden)");

    let dispatcher = KeyDispatcher::new()
        .with_waker(overlay.key_input_waker())
        .with_live_modifiers(live_modifiers);
    let mut hook = InputHook::install(dispatcher, default_hook_backend()).map_err(|error| {
        tracing::error!(%error, "keyboard hook installation failed");
        error
    })?;

    let pipeline = QueryPipeline::new(index).with_waker(overlay.filter_ready_waker());
    let mut session = LauncherSession::new(
        &overlay,
        hotkey,
        hook.subscribe(),
        pipeline,
        ForegroundActivator::new(Win32WindowApi),
        ShellLauncher,
    );
    session.start();
    tracing::info!("event loop running");

    let result = overlay.run_message_loop_with_events(|event| session.handle(event));
    hook.uninstall();
    Ok(result?)
}

fn runtime_mode() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows-overlay"
    } else {
        "headless"
    }
}

fn catalog_sources(config: &Config) -> Vec<Box<dyn ShortcutSource>> {
    let roots = if config.shortcut_roots.is_empty() {
        default_shortcut_roots()
    } else {
        config.shortcut_roots.clone()
    };
    vec![Box::new(StartMenuSource::new(roots))]
}

fn icon_resolver() -> Box<dyn IconResolver> {
    #[cfg(target_os = "windows")]
    {
        Box::new(crate::discovery::ShellIconResolver::default())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(crate::discovery::NoIcons)
    }
}

/// Everything the UI loop does in response to an [`OverlayEvent`].
pub struct LauncherSession<'a, S: OverlaySurface, A: WindowApi, L: Launcher> {
    surface: &'a S,
    hotkey: Hotkey,
    keys: Subscription,
    pipeline: QueryPipeline,
    controller: ActivationController,
    activator: ForegroundActivator<A>,
    launcher: L,
    results: Vec<ShortcutItem>,
    selected_index: usize,
}

impl<'a, S: OverlaySurface, A: WindowApi, L: Launcher> LauncherSession<'a, S, A, L> {
    pub fn new(
        surface: &'a S,
        hotkey: Hotkey,
        keys: Subscription,
        pipeline: QueryPipeline,
        activator: ForegroundActivator<A>,
        launcher: L,
    ) -> Self {
        Self {
            surface,
            hotkey,
            keys,
            pipeline,
            controller: ActivationController::default(),
            activator,
            launcher,
            results: Vec::new(),
            selected_index: 0,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.controller.state()
    }

    pub fn results(&self) -> &[ShortcutItem] {
        &self.results
    }

    /// Fills the idle list and replays a show requested before the window existed.
    pub fn start(&mut self) {
        self.surface.set_status_text("");
        self.pipeline.request("");
        if let Some(window) = self.surface.window_handle() {
            let command = self.controller.on_window_realized(window);
            self.apply(command);
        }
    }

    pub fn handle(&mut self, event: OverlayEvent) {
        match event {
            OverlayEvent::KeyInput => {
                for notification in self.keys.drain() {
                    if self.hotkey.is_triggered_by(&notification) {
                        tracing::debug!("hotkey pressed");
                        let command = self.controller.on_hotkey(self.surface.window_handle());
                        self.apply(command);
                    }
                }
            }
            OverlayEvent::FilterReady => {
                if let Some(result) = self.pipeline.take_latest() {
                    self.show_results(&result.query, result.items);
                }
            }
            OverlayEvent::QueryChanged(query) => {
                self.pipeline.request(&query);
            }
            OverlayEvent::MoveSelection(direction) => {
                if self.results.is_empty() {
                    return;
                }
                self.selected_index = next_selection_index(self.selected_index, self.results.len(), direction);
                self.surface.set_selected_index(self.selected_index);
            }
            OverlayEvent::Submit => self.launch_selection(),
            OverlayEvent::Escape => {
                let command = self.controller.on_dismiss();
                self.apply(command);
            }
            OverlayEvent::FocusLost => {
                let command = self.controller.on_focus_lost();
                self.apply(command);
            }
            OverlayEvent::AnimationComplete => {
                let state = self.controller.on_animation_complete();
                tracing::trace!(?state, "overlay animation finished");
            }
        }
    }

    fn apply(&mut self, command: OverlayCommand) {
        match command {
            OverlayCommand::None => {}
            OverlayCommand::Deferred => tracing::debug!("overlay window not realized; show deferred"),
            OverlayCommand::Show(window) => {
                self.surface.begin_show();
                if self.activator.force_activate(window) == ActivationOutcome::Degraded {
                    tracing::info!("overlay shown without keyboard focus");
                }
                self.surface.focus_input_and_select_all();
            }
            OverlayCommand::Hide(reason) => {
                tracing::debug!(?reason, "hiding overlay");
                self.surface.begin_hide();
                self.surface.clear_query_text();
            }
        }
    }

    fn show_results(&mut self, query: &str, items: Vec<ShortcutItem>) {
        self.results = items;
        self.selected_index = 0;
        self.surface.set_results(&self.results, self.selected_index);

        let trimmed = query.trim();
        if self.results.is_empty() && !trimmed.is_empty() {
            self.surface.set_status_text(&format!("No matches for '{trimmed}'."));
        } else {
            self.surface.set_status_text("");
        }
    }

    fn launch_selection(&mut self) {
        if self.results.is_empty() {
            self.surface.set_status_text("No launchable result selected.");
            return;
        }

        if let Some(list_selection) = self.surface.selected_index() {
            self.selected_index = list_selection.min(self.results.len() - 1);
        }

        match launch_overlay_selection(&self.launcher, &self.results, self.selected_index) {
            Ok(()) => {
                self.surface.set_status_text("");
                let command = self.controller.on_launched();
                self.apply(command);
            }
            Err(error) => {
                tracing::warn!(%error, "launch failed");
                self.surface.set_status_text(&format!("Launch error: {error}"));
            }
        }
    }
}

fn launch_overlay_selection<L: Launcher>(
    launcher: &L,
    results: &[ShortcutItem],
    selected_index: usize,
) -> Result<(), LaunchError> {
    match results.get(selected_index) {
        Some(item) => launcher.launch(item),
        None => Err(LaunchError::EmptyPath),
    }
}

/// Up and Down wrap around the ends of the list.
fn next_selection_index(current: usize, len: usize, direction: i32) -> usize {
    if len == 0 {
        return 0;
    }

    let current = current.min(len - 1);
    match direction.signum() {
        -1 => (current + len - 1) % len,
        1 => (current + 1) % len,
        _ => current,
    }
}

#[cfg(target_os = "windows")]
struct SingleInstanceGuard {
    handle: windows_sys::Win32::Foundation::HANDLE,
}

#[cfg(target_os = "windows")]
impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        unsafe {
            windows_sys::Win32::Foundation::CloseHandle(self.handle);
        }
    }
}

#[cfg(target_os = "windows")]
fn acquire_single_instance_guard() -> Result<Option<SingleInstanceGuard>, RuntimeError> {
    use windows_sys::Win32::Foundation::GetLastError;
    use windows_sys::Win32::System::Threading::CreateMutexW;

    let mutex_name: Vec<u16> = "Local\\SearchythingRuntimeSingleton"
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let handle = unsafe { CreateMutexW(std::ptr::null(), 0, mutex_name.as_ptr()) };
    if handle.is_null() {
        let error = unsafe { GetLastError() };
        return Err(RuntimeError::SingleInstance(error));
    }

    // ERROR_ALREADY_EXISTS
    let error = unsafe { GetLastError() };
    if error == 183 {
        unsafe {
            windows_sys::Win32::Foundation::CloseHandle(handle);
        }
        return Ok(None);
    }

    Ok(Some(SingleInstanceGuard { handle }))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::foreground::WindowHandle;
    use crate::input_hook::{KeyDispatcher, KeyEvent, KeyFlags, KeyTransition};

    const WINDOW: isize = 0x42;

    #[derive(Default)]
    struct FakeSurface {
        calls: RefCell<Vec<String>>,
        shown: RefCell<Vec<String>>,
        status: RefCell<String>,
        selected: Cell<Option<usize>>,
    }

    impl FakeSurface {
        fn record(&self, call: &str) {
            self.calls.borrow_mut().push(call.to_string());
        }

        fn count(&self, call: &str) -> usize {
            self.calls.borrow().iter().filter(|c| *c == call).count()
        }
    }

    impl OverlaySurface for FakeSurface {
        fn window_handle(&self) -> Option<WindowHandle> {
            WindowHandle::from_raw(WINDOW)
        }
        fn begin_show(&self) {
            self.record("begin_show");
        }
        fn begin_hide(&self) {
            self.record("begin_hide");
        }
        fn focus_input_and_select_all(&self) {
            self.record("focus");
        }
        fn clear_query_text(&self) {
            self.record("clear");
        }
        fn set_results(&self, items: &[ShortcutItem], selected_index: usize) {
            *self.shown.borrow_mut() = items.iter().map(|i| i.name().to_string()).collect();
            self.selected.set((!items.is_empty()).then_some(selected_index));
        }
        fn set_selected_index(&self, selected_index: usize) {
            self.selected.set(Some(selected_index));
        }
        fn selected_index(&self) -> Option<usize> {
            self.selected.get()
        }
        fn set_status_text(&self, message: &str) {
            *self.status.borrow_mut() = message.to_string();
        }
    }

    struct FocusedWindow;

    impl WindowApi for FocusedWindow {
        fn restore(&self, _window: WindowHandle) -> bool {
            true
        }
        fn set_foreground(&self, _window: WindowHandle) -> bool {
            true
        }
        fn foreground_window(&self) -> Option<WindowHandle> {
            WindowHandle::from_raw(WINDOW)
        }
        fn window_thread(&self, _window: WindowHandle) -> Option<u32> {
            Some(1)
        }
        fn attach_input(&self, _thread: u32, _to_thread: u32, _attach: bool) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        launched: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, item: &ShortcutItem) -> Result<(), LaunchError> {
            if self.fail {
                return Err(LaunchError::MissingPath(item.target_path().into()));
            }
            self.launched.borrow_mut().push(item.name().to_string());
            Ok(())
        }
    }

    fn catalog() -> Arc<SearchIndex> {
        let index = Arc::new(SearchIndex::default());
        index.load(vec![
            ShortcutItem::new("Calculator", "calc.lnk"),
            ShortcutItem::new("Calendar", "cal.lnk"),
            ShortcutItem::new("Notepad", "notepad.lnk"),
        ]);
        index
    }

    fn ctrl_space(transition: KeyTransition) -> KeyEvent {
        KeyEvent {
            vk_code: crate::hotkey::VK_SPACE,
            scan_code: 0x39,
            flags: KeyFlags(0),
            timestamp: 0,
            transition,
        }
    }

    fn press_hotkey(dispatcher: &KeyDispatcher) {
        let ctrl = KeyEvent {
            vk_code: crate::hotkey::VK_LCONTROL,
            scan_code: 0x1D,
            flags: KeyFlags(0),
            timestamp: 0,
            transition: KeyTransition::KeyDown,
        };
        dispatcher.on_key(ctrl);
        dispatcher.on_key(ctrl_space(KeyTransition::KeyDown));
        dispatcher.on_key(ctrl_space(KeyTransition::KeyUp));
        dispatcher.on_key(KeyEvent {
            transition: KeyTransition::KeyUp,
            ..ctrl
        });
    }

    fn wait_for_results<S, A, L>(session: &mut LauncherSession<'_, S, A, L>, surface: &FakeSurface, expected: &[&str])
    where
        S: OverlaySurface,
        A: WindowApi,
        L: Launcher,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            session.handle(OverlayEvent::FilterReady);
            if *surface.shown.borrow() == expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("results never became {expected:?}; got {:?}", surface.shown.borrow());
    }

    #[test]
    fn hotkey_then_launch_runs_full_show_hide_cycle() {
        let surface = FakeSurface::default();
        let dispatcher = KeyDispatcher::new();
        let keys = dispatcher.subscribe();
        let mut session = LauncherSession::new(
            &surface,
            Hotkey::default(),
            keys,
            QueryPipeline::new(catalog()),
            ForegroundActivator::new(FocusedWindow),
            RecordingLauncher::default(),
        );
        session.start();
        wait_for_results(&mut session, &surface, &["Calculator", "Calendar", "Notepad"]);

        press_hotkey(&dispatcher);
        session.handle(OverlayEvent::KeyInput);
        assert_eq!(session.state(), OverlayState::Showing);
        assert_eq!(surface.count("begin_show"), 1);
        assert_eq!(surface.count("focus"), 1);
        session.handle(OverlayEvent::AnimationComplete);
        assert_eq!(session.state(), OverlayState::Visible);

        session.handle(OverlayEvent::QueryChanged("calen".to_string()));
        wait_for_results(&mut session, &surface, &["Calendar"]);
        session.handle(OverlayEvent::Submit);

        assert_eq!(*session.launcher.launched.borrow(), vec!["Calendar".to_string()]);
        assert_eq!(session.state(), OverlayState::Hiding);
        assert_eq!(surface.count("begin_hide"), 1);
        assert_eq!(surface.count("clear"), 1);
        session.handle(OverlayEvent::AnimationComplete);
        assert_eq!(session.state(), OverlayState::Hidden);
    }

    #[test]
    fn failed_launch_reports_and_keeps_overlay_visible() {
        let surface = FakeSurface::default();
        let dispatcher = KeyDispatcher::new();
        let mut session = LauncherSession::new(
            &surface,
            Hotkey::default(),
            dispatcher.subscribe(),
            QueryPipeline::new(catalog()),
            ForegroundActivator::new(FocusedWindow),
            RecordingLauncher {
                fail: true,
                ..RecordingLauncher::default()
            },
        );
        session.start();
        wait_for_results(&mut session, &surface, &["Calculator", "Calendar", "Notepad"]);
        press_hotkey(&dispatcher);
        session.handle(OverlayEvent::KeyInput);
        session.handle(OverlayEvent::AnimationComplete);

        session.handle(OverlayEvent::Submit);

        assert!(surface.status.borrow().starts_with("Launch error:"));
        assert_eq!(session.state(), OverlayState::Visible);
        assert_eq!(surface.count("begin_hide"), 0);
    }

    #[test]
    fn no_match_query_shows_hint() {
        let surface = FakeSurface::default();
        let dispatcher = KeyDispatcher::new();
        let mut session = LauncherSession::new(
            &surface,
            Hotkey::default(),
            dispatcher.subscribe(),
            QueryPipeline::new(catalog()),
            ForegroundActivator::new(FocusedWindow),
            RecordingLauncher::default(),
        );

        session.handle(OverlayEvent::QueryChanged("zzz".to_string()));
        let deadline = Instant::now() + Duration::from_secs(5);
        while surface.status.borrow().is_empty() && Instant::now() < deadline {
            session.handle(OverlayEvent::FilterReady);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*surface.status.borrow(), "No matches for 'zzz'.");
        assert!(session.results().is_empty());

        session.handle(OverlayEvent::Submit);
        assert_eq!(*surface.status.borrow(), "No launchable result selected.");
    }

    #[test]
    fn focus_loss_and_escape_hide_only_visible_overlay() {
        let surface = FakeSurface::default();
        let dispatcher = KeyDispatcher::new();
        let mut session = LauncherSession::new(
            &surface,
            Hotkey::default(),
            dispatcher.subscribe(),
            QueryPipeline::new(catalog()),
            ForegroundActivator::new(FocusedWindow),
            RecordingLauncher::default(),
        );

        session.handle(OverlayEvent::Escape);
        session.handle(OverlayEvent::FocusLost);
        assert_eq!(surface.count("begin_hide"), 0);

        press_hotkey(&dispatcher);
        session.handle(OverlayEvent::KeyInput);
        session.handle(OverlayEvent::AnimationComplete);
        session.handle(OverlayEvent::FocusLost);
        session.handle(OverlayEvent::Escape);
        assert_eq!(surface.count("begin_hide"), 1);
    }

    #[test]
    fn selection_wraps_around_both_ends() {
        assert_eq!(next_selection_index(0, 0, 1), 0);
        assert_eq!(next_selection_index(0, 3, -1), 2);
        assert_eq!(next_selection_index(1, 3, -1), 0);
        assert_eq!(next_selection_index(1, 3, 1), 2);
        assert_eq!(next_selection_index(2, 3, 1), 0);
        assert_eq!(next_selection_index(1, 3, 0), 1);
        assert_eq!(next_selection_index(5, 3, 0), 2);
        assert_eq!(next_selection_index(0, 1, 1), 0);
    }

    #[test]
    fn moving_selection_wraps_on_the_surface() {
        let surface = FakeSurface::default();
        let dispatcher = KeyDispatcher::new();
        let mut session = LauncherSession::new(
            &surface,
            Hotkey::default(),
            dispatcher.subscribe(),
            QueryPipeline::new(catalog()),
            ForegroundActivator::new(FocusedWindow),
            RecordingLauncher::default(),
        );
        session.start();
        wait_for_results(&mut session, &surface, &["Calculator", "Calendar", "Notepad"]);

        session.handle(OverlayEvent::MoveSelection(-1));
        assert_eq!(surface.selected.get(), Some(2));
        session.handle(OverlayEvent::MoveSelection(1));
        assert_eq!(surface.selected.get(), Some(0));
    }
}
