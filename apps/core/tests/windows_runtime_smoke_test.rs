use searchything_core::input_hook::{default_hook_backend, HookInstallError, InputHook, KeyDispatcher};

#[cfg(not(target_os = "windows"))]
#[test]
fn non_windows_hook_install_reports_unsupported() {
    let result = InputHook::install(KeyDispatcher::new(), default_hook_backend());
    assert!(matches!(result, Err(HookInstallError::UnsupportedPlatform)));
    assert!(!searchything_core::input_hook::is_hook_active());
}

#[cfg(target_os = "windows")]
#[test]
fn windows_runtime_smoke_installs_hook_and_activates_overlay() {
    use searchything_core::foreground::{ForegroundActivator, Win32WindowApi};
    use searchything_core::windows_overlay::{NativeOverlayShell, OverlaySurface};

    if std::env::var("SEARCHYTHING_WINDOWS_RUNTIME_SMOKE").as_deref() != Ok("1") {
        eprintln!("skipping windows runtime smoke (set SEARCHYTHING_WINDOWS_RUNTIME_SMOKE=1 to enable)");
        return;
    }

    let overlay = NativeOverlayShell::create().expect("overlay window should be created");
    let mut hook = InputHook::install(KeyDispatcher::new(), default_hook_backend())
        .unwrap_or_else(|error: HookInstallError| panic!("hook install failed: {error}"));
    assert!(hook.is_installed());

    let window = overlay.window_handle().expect("overlay has a handle");
    let activator = ForegroundActivator::new(Win32WindowApi);
    let _ = activator.force_activate(window);

    hook.uninstall();
    assert!(!hook.is_installed());
}
