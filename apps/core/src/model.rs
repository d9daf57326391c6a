use std::sync::Arc;

/// Shell icon owned by the catalog; destroyed when the last item using it goes.
#[derive(Debug, PartialEq, Eq)]
pub struct IconHandle(isize);

impl IconHandle {
    pub fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> isize {
        self.0
    }
}

#[cfg(target_os = "windows")]
impl Drop for IconHandle {
    fn drop(&mut self) {
        if self.0 != 0 {
            unsafe {
                windows_sys::Win32::UI::WindowsAndMessaging::DestroyIcon(self.0 as _);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutItem {
    name: String,
    target_path: String,
    icon: Option<Arc<IconHandle>>,
    normalized_name: String,
}

impl ShortcutItem {
    pub fn new(name: &str, target_path: &str) -> Self {
        Self::from_owned(name.to_string(), target_path.to_string(), None)
    }

    pub fn from_owned(name: String, target_path: String, icon: Option<IconHandle>) -> Self {
        let normalized_name = name.to_lowercase();
        Self {
            name,
            target_path,
            icon: icon.map(Arc::new),
            normalized_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    pub fn icon(&self) -> Option<&IconHandle> {
        self.icon.as_deref()
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }
}

/// Lowercases the query and collapses runs of whitespace to single spaces.
pub fn normalize_query(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
