use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::model::{IconHandle, ShortcutItem};

const START_MENU_PROGRAMS: &str = "Microsoft\\Windows\\Start Menu\\Programs";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("shortcut root is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("shortcut source '{source_name}' failed: {message}")]
    Source { source_name: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredShortcut {
    pub name: String,
    pub target_path: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub shortcuts: Vec<DiscoveredShortcut>,
    /// Entries that could not be read and were left out.
    pub skipped: usize,
}

pub trait ShortcutSource: Send + Sync {
    fn source_name(&self) -> &str;
    fn discover(&self) -> Result<Discovery, DiscoveryError>;
}

/// Walks Start Menu style folders for `.lnk` files.
pub struct StartMenuSource {
    roots: Vec<PathBuf>,
}

impl StartMenuSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn walk_root(&self, root: &Path, discovery: &mut Discovery) -> Result<(), DiscoveryError> {
        if !root.exists() {
            tracing::debug!(root = %root.display(), "shortcut root missing; skipping");
            return Ok(());
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(root = %root.display(), %error, "skipping unreadable shortcut entry");
                    discovery.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_link_file(entry.path()) {
                continue;
            }
            match entry.path().file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if !stem.trim().is_empty() => {
                    discovery.shortcuts.push(DiscoveredShortcut {
                        name: stem.trim().to_string(),
                        target_path: entry.path().to_path_buf(),
                    });
                }
                _ => {
                    tracing::warn!(path = %entry.path().display(), "shortcut has no usable name");
                    discovery.skipped += 1;
                }
            }
        }
        Ok(())
    }
}

impl ShortcutSource for StartMenuSource {
    fn source_name(&self) -> &str {
        "start-menu"
    }

    fn discover(&self) -> Result<Discovery, DiscoveryError> {
        let mut discovery = Discovery::default();
        for root in &self.roots {
            if let Err(error) = self.walk_root(root, &mut discovery) {
                tracing::warn!(%error, "skipping shortcut root");
                discovery.skipped += 1;
            }
        }
        Ok(discovery)
    }
}

/// A source that returns a fixed list.
pub struct FixedSource {
    shortcuts: Vec<DiscoveredShortcut>,
}

impl FixedSource {
    pub fn from_shortcuts(shortcuts: Vec<DiscoveredShortcut>) -> Self {
        Self { shortcuts }
    }
}

impl ShortcutSource for FixedSource {
    fn source_name(&self) -> &str {
        "fixed"
    }

    fn discover(&self) -> Result<Discovery, DiscoveryError> {
        Ok(Discovery {
            shortcuts: self.shortcuts.clone(),
            skipped: 0,
        })
    }
}

pub fn is_link_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lnk"))
}

/// The machine-wide and per-user Start Menu program folders.
pub fn default_shortcut_roots() -> Vec<PathBuf> {
    ["ProgramData", "APPDATA"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|base| PathBuf::from(base).join(START_MENU_PROGRAMS))
        .collect()
}

pub trait IconResolver {
    fn resolve(&self, path: &Path) -> Option<IconHandle>;
}

pub struct NoIcons;

impl IconResolver for NoIcons {
    fn resolve(&self, _path: &Path) -> Option<IconHandle> {
        None
    }
}

/// Reads the target a shortcut file points at.
pub trait LinkResolver {
    fn link_target(&self, link: &Path) -> Option<PathBuf>;
}

/// The file whose icon represents `path`: a link's target when it resolves
/// to a non-empty path, otherwise `path` itself.
pub fn icon_source(path: &Path, links: &dyn LinkResolver) -> PathBuf {
    if !is_link_file(path) {
        return path.to_path_buf();
    }
    match links.link_target(path) {
        Some(target) if !target.as_os_str().is_empty() => target,
        _ => path.to_path_buf(),
    }
}

#[cfg(target_os = "windows")]
mod shell_icons {
    use std::os::windows::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use windows::core::{Interface, PCWSTR};
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CoUninitialize, IPersistFile, CLSCTX_INPROC_SERVER,
        COINIT_APARTMENTTHREADED, STGM_READ,
    };
    use windows::Win32::UI::Shell::{IShellLinkW, ShellLink};
    use windows_sys::Win32::UI::Shell::{SHGetFileInfoW, SHFILEINFOW, SHGFI_ICON, SHGFI_SMALLICON};

    use super::{icon_source, IconResolver, LinkResolver};
    use crate::model::IconHandle;

    const MAX_LINK_TARGET: usize = 32_768;

    /// Single-threaded COM apartment for the calling thread, left on drop.
    /// The shell icon and link calls below need one.
    pub struct ComApartment {
        _not_send: std::marker::PhantomData<*const ()>,
    }

    impl ComApartment {
        pub fn enter() -> Option<Self> {
            let result = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
            if result.is_ok() {
                Some(Self {
                    _not_send: std::marker::PhantomData,
                })
            } else {
                tracing::warn!(code = result.0, "COM initialization failed; icons may be missing");
                None
            }
        }
    }

    impl Drop for ComApartment {
        fn drop(&mut self) {
            unsafe { CoUninitialize() };
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct ShellLinkResolver;

    impl LinkResolver for ShellLinkResolver {
        fn link_target(&self, link: &Path) -> Option<PathBuf> {
            let wide: Vec<u16> = link.as_os_str().encode_wide().chain(Some(0)).collect();
            let mut buffer = vec![0u16; MAX_LINK_TARGET];
            unsafe {
                let shell_link: IShellLinkW = CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER).ok()?;
                let persist: IPersistFile = shell_link.cast().ok()?;
                persist.Load(PCWSTR(wide.as_ptr()), STGM_READ).ok()?;
                shell_link.GetPath(&mut buffer, std::ptr::null_mut(), 0).ok()?;
            }
            let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
            (len > 0).then(|| PathBuf::from(String::from_utf16_lossy(&buffer[..len])))
        }
    }

    /// Small shell icons for the target of each shortcut.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ShellIconResolver {
        links: ShellLinkResolver,
    }

    impl IconResolver for ShellIconResolver {
        fn resolve(&self, path: &Path) -> Option<IconHandle> {
            let source = icon_source(path, &self.links);
            let wide: Vec<u16> = source.as_os_str().encode_wide().chain(Some(0)).collect();
            let mut sfi: SHFILEINFOW = unsafe { std::mem::zeroed() };
            let result = unsafe {
                SHGetFileInfoW(
                    wide.as_ptr(),
                    0,
                    &mut sfi,
                    std::mem::size_of::<SHFILEINFOW>() as u32,
                    SHGFI_ICON | SHGFI_SMALLICON,
                )
            };
            if result == 0 || sfi.hIcon.is_null() {
                None
            } else {
                Some(IconHandle::from_raw(sfi.hIcon as isize))
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use shell_icons::{ComApartment, ShellIconResolver, ShellLinkResolver};

#[derive(Debug, Default)]
pub struct CatalogReport {
    pub items: Vec<ShortcutItem>,
    pub skipped: usize,
}

/// Concatenates every source in order. Shortcuts sharing a display name are
/// all kept; only a link path seen twice (case-insensitive) is dropped. A
/// failing source is logged and counted; it never aborts the catalog.
pub fn build_catalog(sources: &[Box<dyn ShortcutSource>], icons: &dyn IconResolver) -> CatalogReport {
    let mut report = CatalogReport::default();
    let mut seen = HashSet::new();

    for source in sources {
        let discovery = match source.discover() {
            Ok(discovery) => discovery,
            Err(error) => {
                tracing::warn!(source = source.source_name(), %error, "shortcut source failed");
                report.skipped += 1;
                continue;
            }
        };
        report.skipped += discovery.skipped;

        for shortcut in discovery.shortcuts {
            let Some(target) = shortcut.target_path.to_str().map(str::to_string) else {
                tracing::warn!(path = %shortcut.target_path.display(), "shortcut path is not valid unicode");
                report.skipped += 1;
                continue;
            };
            if !seen.insert(target.to_lowercase()) {
                continue;
            }
            let icon = icons.resolve(&shortcut.target_path);
            report
                .items
                .push(ShortcutItem::from_owned(shortcut.name, target, icon));
        }
    }

    tracing::info!(
        items = report.items.len(),
        skipped = report.skipped,
        "shortcut catalog built"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_extension_match_ignores_case() {
        assert!(is_link_file(Path::new("C:\\x\\Notepad.LNK")));
        assert!(is_link_file(Path::new("a/b.lnk")));
        assert!(!is_link_file(Path::new("a/b.exe")));
        assert!(!is_link_file(Path::new("a/lnk")));
    }

    #[test]
    fn missing_root_yields_empty_discovery() {
        let source = StartMenuSource::new(vec![PathBuf::from("/definitely/not/here/searchything")]);
        let discovery = source.discover().unwrap();
        assert!(discovery.shortcuts.is_empty());
        assert_eq!(discovery.skipped, 0);
    }
}
