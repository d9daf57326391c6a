use searchything_core::action_executor::{validate_launch_path, LaunchError, Launcher, ShellLauncher};
use searchything_core::model::ShortcutItem;

#[test]
fn rejects_empty_path() {
    assert!(matches!(validate_launch_path(""), Err(LaunchError::EmptyPath)));
}

#[test]
fn rejects_missing_path() {
    let missing = std::env::temp_dir().join("searchything-definitely-missing.lnk");
    assert!(matches!(
        validate_launch_path(missing.to_str().unwrap()),
        Err(LaunchError::MissingPath(path)) if path == missing
    ));
}

#[test]
fn accepts_existing_path() {
    let dir = std::env::temp_dir();
    assert_eq!(validate_launch_path(dir.to_str().unwrap()).unwrap(), dir);
}

#[test]
fn shell_launcher_refuses_dangling_shortcuts_before_spawning() {
    let item = ShortcutItem::new("Gone", "C:\\nowhere\\searchything\\Gone.lnk");
    assert!(matches!(
        ShellLauncher.launch(&item),
        Err(LaunchError::MissingPath(_))
    ));
}
