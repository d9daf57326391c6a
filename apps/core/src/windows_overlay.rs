use crate::foreground::WindowHandle;
use crate::model::ShortcutItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    /// The keyboard hook queued notifications.
    KeyInput,
    /// A filter worker finished.
    FilterReady,
    QueryChanged(String),
    MoveSelection(i32),
    Submit,
    Escape,
    FocusLost,
    AnimationComplete,
}

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("RegisterClassW failed with error {0}")]
    RegisterClass(u32),
    #[error("CreateWindowExW failed with error {0}")]
    CreateWindow(u32),
    #[error("GetMessageW failed with error {0}")]
    MessageLoop(u32),
}

/// What the launcher session drives on the panel.
pub trait OverlaySurface {
    fn window_handle(&self) -> Option<WindowHandle>;
    /// Starts the slide-in. Completion arrives as `AnimationComplete`.
    fn begin_show(&self);
    /// Starts the slide-out. Completion arrives as `AnimationComplete`.
    fn begin_hide(&self);
    fn focus_input_and_select_all(&self);
    fn clear_query_text(&self);
    fn set_results(&self, items: &[ShortcutItem], selected_index: usize);
    fn set_selected_index(&self, selected_index: usize);
    fn selected_index(&self) -> Option<usize>;
    fn set_status_text(&self, message: &str);
}

#[cfg(target_os = "windows")]
mod imp {
    use std::ffi::c_void;
    use std::sync::OnceLock;
    use std::time::Instant;

    use windows_sys::Win32::Foundation::{GetLastError, HWND, LPARAM, LRESULT, RECT, WPARAM};
    use windows_sys::Win32::Graphics::Gdi::{
        BeginPaint, CreateFontW, CreateSolidBrush, DeleteObject, DrawTextW, EndPaint, FillRect,
        InvalidateRect, SelectObject, SetBkColor, SetBkMode, SetTextColor, DEFAULT_CHARSET,
        DEFAULT_QUALITY, DT_END_ELLIPSIS, DT_LEFT, DT_SINGLELINE, DT_VCENTER, FF_DONTCARE,
        FW_MEDIUM, OPAQUE, OUT_DEFAULT_PRECIS, PAINTSTRUCT, TRANSPARENT,
    };
    use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows_sys::Win32::UI::Controls::{DRAWITEMSTRUCT, EM_SETSEL, MEASUREITEMSTRUCT, ODS_SELECTED};
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{SetFocus, VK_DOWN, VK_ESCAPE, VK_RETURN, VK_UP};
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        CallWindowProcW, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, DrawIconEx,
        GetClientRect, GetMessageW, GetParent, GetSystemMetrics, GetWindowLongPtrW,
        GetWindowTextLengthW, GetWindowTextW, IsWindowVisible, KillTimer, LoadCursorW, MoveWindow,
        PostMessageW, PostQuitMessage, RegisterClassW, SendMessageW, SetLayeredWindowAttributes,
        SetTimer, SetWindowLongPtrW, SetWindowPos, SetWindowTextW, ShowWindow, TranslateMessage,
        CREATESTRUCTW, CS_HREDRAW, CS_VREDRAW, DI_NORMAL, EN_CHANGE, ES_AUTOHSCROLL, GWLP_USERDATA,
        GWLP_WNDPROC, HMENU, HWND_TOPMOST, IDC_ARROW, LBN_DBLCLK, LBS_HASSTRINGS,
        LBS_NOINTEGRALHEIGHT, LBS_NOTIFY, LBS_OWNERDRAWFIXED, LB_ADDSTRING, LB_GETCOUNT,
        LB_GETCURSEL, LB_RESETCONTENT, LB_SETCURSEL, LWA_ALPHA, MSG, SM_CXSCREEN, SM_CYSCREEN,
        SWP_NOACTIVATE, SW_HIDE, SW_SHOWNA, WM_ACTIVATE, WM_APP, WM_CLOSE, WM_COMMAND, WM_CREATE,
        WM_CTLCOLOREDIT, WM_CTLCOLORLISTBOX, WM_CTLCOLORSTATIC, WM_DESTROY, WM_DRAWITEM, WM_KEYDOWN,
        WM_MEASUREITEM, WM_NCCREATE, WM_NCDESTROY, WM_PAINT, WM_SETFONT, WM_SIZE, WM_TIMER,
        WNDCLASSW, WS_CHILD, WS_CLIPCHILDREN, WS_EX_LAYERED, WS_EX_TOOLWINDOW, WS_EX_TOPMOST,
        WS_POPUP, WS_TABSTOP, WS_VISIBLE, WS_VSCROLL,
    };

    use super::{OverlayError, OverlayEvent, OverlaySurface};
    use crate::foreground::WindowHandle;
    use crate::model::ShortcutItem;

    const CLASS_NAME: &str = "SearchythingOverlayWindowClass";
    const WINDOW_TITLE: &str = "Searchything";
    const INPUT_CLASS: &str = "EDIT";
    const LIST_CLASS: &str = "LISTBOX";
    const STATUS_CLASS: &str = "STATIC";

    const PANEL_WIDTH: i32 = 350;
    const PANEL_MARGIN: i32 = 12;
    const INPUT_HEIGHT: i32 = 32;
    const STATUS_HEIGHT: i32 = 20;
    const ROW_HEIGHT: i32 = 36;
    const ROW_INSET_X: i32 = 10;
    const ROW_ICON_SIZE: i32 = 16;
    const ROW_ICON_GAP: i32 = 10;

    const CONTROL_ID_INPUT: usize = 1001;
    const CONTROL_ID_LIST: usize = 1002;
    const CONTROL_ID_STATUS: usize = 1003;

    const SEARCHYTHING_WM_ESCAPE: u32 = WM_APP + 1;
    const SEARCHYTHING_WM_QUERY_CHANGED: u32 = WM_APP + 2;
    const SEARCHYTHING_WM_MOVE_UP: u32 = WM_APP + 3;
    const SEARCHYTHING_WM_MOVE_DOWN: u32 = WM_APP + 4;
    const SEARCHYTHING_WM_SUBMIT: u32 = WM_APP + 5;
    const SEARCHYTHING_WM_KEY_INPUT: u32 = WM_APP + 6;
    const SEARCHYTHING_WM_FILTER_READY: u32 = WM_APP + 7;
    const SEARCHYTHING_WM_FOCUS_LOST: u32 = WM_APP + 8;
    const SEARCHYTHING_WM_ANIMATION_COMPLETE: u32 = WM_APP + 9;

    const TIMER_WINDOW_ANIM: usize = 0xBEF1;
    const SLIDE_IN_MS: u32 = 180;
    const SLIDE_OUT_MS: u32 = 140;
    const ANIM_FRAME_MS: u32 = 8;

    const FONT_INPUT_HEIGHT: i32 = -18;
    const FONT_ROW_HEIGHT: i32 = -15;
    const FONT_STATUS_HEIGHT: i32 = -13;
    const FONT_FAMILY: &str = "Segoe UI";

    const COLOR_PANEL_BG: u32 = 0x00202020;
    const COLOR_INPUT_BG: u32 = 0x00303030;
    const COLOR_RESULTS_BG: u32 = COLOR_PANEL_BG;
    const COLOR_SELECTION: u32 = 0x00404040;
    const COLOR_TEXT_PRIMARY: u32 = 0x00F4F4F4;
    const COLOR_TEXT_HINT: u32 = 0x009B9B9B;
    const FOOTER_HINT_TEXT: &str = "Enter open | Up/Down move | Esc close";

    pub struct NativeOverlayShell {
        hwnd: HWND,
    }

    struct OverlayShellState {
        edit_hwnd: HWND,
        list_hwnd: HWND,
        status_hwnd: HWND,

        edit_prev_proc: isize,
        list_prev_proc: isize,

        input_font: isize,
        row_font: isize,
        status_font: isize,

        panel_brush: isize,
        input_brush: isize,
        selection_brush: isize,

        window_anim: Option<WindowAnimation>,
        rows: Vec<ShortcutItem>,
    }

    impl Default for OverlayShellState {
        fn default() -> Self {
            Self {
                edit_hwnd: std::ptr::null_mut(),
                list_hwnd: std::ptr::null_mut(),
                status_hwnd: std::ptr::null_mut(),
                edit_prev_proc: 0,
                list_prev_proc: 0,
                input_font: 0,
                row_font: 0,
                status_font: 0,
                panel_brush: 0,
                input_brush: 0,
                selection_brush: 0,
                window_anim: None,
                rows: Vec::new(),
            }
        }
    }

    struct WindowAnimation {
        start: Instant,
        duration_ms: u32,
        from_left: i32,
        to_left: i32,
        from_alpha: u8,
        to_alpha: u8,
        hide_on_complete: bool,
    }

    impl NativeOverlayShell {
        pub fn create() -> Result<Self, OverlayError> {
            let instance = unsafe { GetModuleHandleW(std::ptr::null()) };
            let class_name = class_name_wide();

            let mut class: WNDCLASSW = unsafe { std::mem::zeroed() };
            class.style = CS_HREDRAW | CS_VREDRAW;
            class.lpfnWndProc = Some(overlay_wnd_proc);
            class.hInstance = instance;
            class.hCursor = unsafe { LoadCursorW(std::ptr::null_mut(), IDC_ARROW) };
            class.hbrBackground = std::ptr::null_mut();
            class.lpszClassName = class_name.as_ptr();

            let atom = unsafe { RegisterClassW(&class) };
            if atom == 0 {
                let error = unsafe { GetLastError() };
                // ERROR_CLASS_ALREADY_EXISTS
                if error != 1410 {
                    return Err(OverlayError::RegisterClass(error));
                }
            }

            let state_ptr = Box::into_raw(Box::new(OverlayShellState::default()));
            let (screen_width, screen_height) = screen_size();

            let hwnd = unsafe {
                CreateWindowExW(
                    WS_EX_TOOLWINDOW | WS_EX_LAYERED | WS_EX_TOPMOST,
                    class_name.as_ptr(),
                    to_wide(WINDOW_TITLE).as_ptr(),
                    WS_POPUP | WS_CLIPCHILDREN,
                    screen_width,
                    0,
                    PANEL_WIDTH,
                    screen_height,
                    std::ptr::null_mut(),
                    0 as HMENU,
                    instance,
                    state_ptr as *mut c_void,
                )
            };

            if hwnd.is_null() {
                unsafe {
                    let _ = Box::from_raw(state_ptr);
                }
                let error = unsafe { GetLastError() };
                return Err(OverlayError::CreateWindow(error));
            }

            let shell = Self { hwnd };
            hide_overlay_immediate(hwnd);
            Ok(shell)
        }

        pub fn is_visible(&self) -> bool {
            unsafe { IsWindowVisible(self.hwnd) != 0 }
        }

        /// Wakes the message loop with `OverlayEvent::KeyInput`. Safe to call
        /// from any thread, including inside the hook callback.
        pub fn key_input_waker(&self) -> impl Fn() + Send + Sync + 'static {
            post_waker(self.hwnd, SEARCHYTHING_WM_KEY_INPUT)
        }

        pub fn filter_ready_waker(&self) -> impl Fn() + Send + Sync + 'static {
            post_waker(self.hwnd, SEARCHYTHING_WM_FILTER_READY)
        }

        pub fn query_text(&self) -> String {
            let Some(state) = state_for(self.hwnd) else {
                return String::new();
            };

            let length = unsafe { GetWindowTextLengthW(state.edit_hwnd) };
            if length <= 0 {
                return String::new();
            }

            let mut buffer = vec![0_u16; (length as usize) + 1];
            let copied = unsafe {
                GetWindowTextW(state.edit_hwnd, buffer.as_mut_ptr(), buffer.len() as i32)
            };
            String::from_utf16_lossy(&buffer[..(copied.max(0) as usize)])
        }

        pub fn run_message_loop_with_events<F>(&self, mut on_event: F) -> Result<(), OverlayError>
        where
            F: FnMut(OverlayEvent),
        {
            let mut msg: MSG = unsafe { std::mem::zeroed() };
            loop {
                let status = unsafe { GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) };
                if status == -1 {
                    let err = unsafe { GetLastError() };
                    return Err(OverlayError::MessageLoop(err));
                }
                if status == 0 {
                    return Ok(());
                }

                match msg.message {
                    SEARCHYTHING_WM_KEY_INPUT => on_event(OverlayEvent::KeyInput),
                    SEARCHYTHING_WM_FILTER_READY => on_event(OverlayEvent::FilterReady),
                    SEARCHYTHING_WM_QUERY_CHANGED => on_event(OverlayEvent::QueryChanged(self.query_text())),
                    SEARCHYTHING_WM_MOVE_UP => on_event(OverlayEvent::MoveSelection(-1)),
                    SEARCHYTHING_WM_MOVE_DOWN => on_event(OverlayEvent::MoveSelection(1)),
                    SEARCHYTHING_WM_SUBMIT => on_event(OverlayEvent::Submit),
                    SEARCHYTHING_WM_ESCAPE => on_event(OverlayEvent::Escape),
                    SEARCHYTHING_WM_FOCUS_LOST => on_event(OverlayEvent::FocusLost),
                    SEARCHYTHING_WM_ANIMATION_COMPLETE => on_event(OverlayEvent::AnimationComplete),
                    _ => {}
                }

                unsafe {
                    TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
        }
    }

    impl OverlaySurface for NativeOverlayShell {
        fn window_handle(&self) -> Option<WindowHandle> {
            WindowHandle::from_raw(self.hwnd as isize)
        }

        fn begin_show(&self) {
            let (screen_width, screen_height) = screen_size();
            let shown_left = screen_width - PANEL_WIDTH;
            apply_window_state(self.hwnd, screen_width, screen_height, 0);
            unsafe {
                ShowWindow(self.hwnd, SW_SHOWNA);
            }
            start_window_animation(self.hwnd, screen_width, shown_left, 0, 255, SLIDE_IN_MS, false);
        }

        fn begin_hide(&self) {
            if !self.is_visible() {
                unsafe {
                    PostMessageW(self.hwnd, SEARCHYTHING_WM_ANIMATION_COMPLETE, 0, 0);
                }
                return;
            }
            let (screen_width, _) = screen_size();
            start_window_animation(
                self.hwnd,
                screen_width - PANEL_WIDTH,
                screen_width,
                255,
                0,
                SLIDE_OUT_MS,
                true,
            );
        }

        fn focus_input_and_select_all(&self) {
            if let Some(state) = state_for(self.hwnd) {
                unsafe {
                    SetFocus(state.edit_hwnd);
                    SendMessageW(state.edit_hwnd, EM_SETSEL, 0, -1);
                }
            }
        }

        fn clear_query_text(&self) {
            if let Some(state) = state_for(self.hwnd) {
                unsafe {
                    SetWindowTextW(state.edit_hwnd, to_wide("").as_ptr());
                }
            }
        }

        fn set_results(&self, items: &[ShortcutItem], selected_index: usize) {
            let Some(state) = state_for(self.hwnd) else {
                return;
            };

            state.rows.clear();
            state.rows.extend_from_slice(items);
            unsafe {
                SendMessageW(state.list_hwnd, LB_RESETCONTENT, 0, 0);
            }
            for item in items {
                // Owner-draw reads state.rows; the string only feeds keyboard search.
                let wide = to_wide(item.name());
                unsafe {
                    SendMessageW(state.list_hwnd, LB_ADDSTRING, 0, wide.as_ptr() as LPARAM);
                }
            }
            self.set_selected_index(selected_index);
        }

        fn set_selected_index(&self, selected_index: usize) {
            let Some(state) = state_for(self.hwnd) else {
                return;
            };

            let count = unsafe { SendMessageW(state.list_hwnd, LB_GETCOUNT, 0, 0) };
            if count <= 0 {
                return;
            }

            let clamped = selected_index.min((count as usize).saturating_sub(1));
            unsafe {
                SendMessageW(state.list_hwnd, LB_SETCURSEL, clamped, 0);
                InvalidateRect(state.list_hwnd, std::ptr::null(), 0);
            }
        }

        fn selected_index(&self) -> Option<usize> {
            let state = state_for(self.hwnd)?;
            let index = unsafe { SendMessageW(state.list_hwnd, LB_GETCURSEL, 0, 0) };
            if index < 0 {
                None
            } else {
                Some(index as usize)
            }
        }

        fn set_status_text(&self, message: &str) {
            if let Some(state) = state_for(self.hwnd) {
                let trimmed = message.trim();
                let status_text = if trimmed.is_empty() {
                    FOOTER_HINT_TEXT
                } else {
                    trimmed
                };
                let wide = to_wide(status_text);
                unsafe {
                    SetWindowTextW(state.status_hwnd, wide.as_ptr());
                    InvalidateRect(state.status_hwnd, std::ptr::null(), 1);
                }
            }
        }
    }

    extern "system" fn overlay_wnd_proc(
        hwnd: HWND,
        message: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match message {
            WM_NCCREATE => {
                let create = lparam as *const CREATESTRUCTW;
                if create.is_null() {
                    return 0;
                }
                let state_ptr = unsafe { (*create).lpCreateParams as *mut OverlayShellState };
                unsafe {
                    SetWindowLongPtrW(hwnd, GWLP_USERDATA, state_ptr as isize);
                }
                1
            }
            WM_CREATE => {
                if let Some(state) = state_for(hwnd) {
                    create_children(hwnd, state);
                    layout_children(hwnd, state);
                }
                0
            }
            WM_MEASUREITEM => {
                let measure = lparam as *mut MEASUREITEMSTRUCT;
                if !measure.is_null() {
                    unsafe {
                        if (*measure).CtlID as usize == CONTROL_ID_LIST {
                            (*measure).itemHeight = ROW_HEIGHT as u32;
                            return 1;
                        }
                    }
                }
                unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
            }
            WM_DRAWITEM => {
                let draw = lparam as *mut DRAWITEMSTRUCT;
                if draw.is_null() {
                    return unsafe { DefWindowProcW(hwnd, message, wparam, lparam) };
                }

                let dis = unsafe { &mut *draw };
                if dis.CtlID as usize != CONTROL_ID_LIST {
                    return unsafe { DefWindowProcW(hwnd, message, wparam, lparam) };
                }

                draw_list_row(hwnd, dis);
                1
            }
            WM_COMMAND => {
                let control_id = wparam & 0xffff;
                let notification = (wparam >> 16) & 0xffff;
                if control_id == CONTROL_ID_INPUT && notification as u32 == EN_CHANGE as u32 {
                    unsafe {
                        PostMessageW(hwnd, SEARCHYTHING_WM_QUERY_CHANGED, 0, 0);
                    }
                    return 0;
                }
                if control_id == CONTROL_ID_LIST && notification as u32 == LBN_DBLCLK as u32 {
                    unsafe {
                        PostMessageW(hwnd, SEARCHYTHING_WM_SUBMIT, 0, 0);
                    }
                    return 0;
                }
                unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
            }
            WM_CTLCOLORSTATIC => {
                if let Some(state) = state_for(hwnd) {
                    if lparam as HWND == state.status_hwnd {
                        unsafe {
                            SetTextColor(wparam as _, COLOR_TEXT_HINT);
                            SetBkMode(wparam as _, TRANSPARENT as i32);
                        }
                        return state.panel_brush;
                    }
                }
                unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
            }
            WM_CTLCOLOREDIT => {
                if let Some(state) = state_for(hwnd) {
                    if lparam as HWND == state.edit_hwnd {
                        unsafe {
                            SetTextColor(wparam as _, COLOR_TEXT_PRIMARY);
                            SetBkColor(wparam as _, COLOR_INPUT_BG);
                            SetBkMode(wparam as _, OPAQUE as i32);
                        }
                        return state.input_brush;
                    }
                }
                unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
            }
            WM_CTLCOLORLISTBOX => {
                if let Some(state) = state_for(hwnd) {
                    if lparam as HWND == state.list_hwnd {
                        unsafe {
                            SetTextColor(wparam as _, COLOR_TEXT_PRIMARY);
                            SetBkColor(wparam as _, COLOR_RESULTS_BG);
                        }
                        return state.panel_brush;
                    }
                }
                unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
            }
            WM_SIZE => {
                if let Some(state) = state_for(hwnd) {
                    layout_children(hwnd, state);
                }
                0
            }
            WM_ACTIVATE => {
                // WA_INACTIVE
                if (wparam & 0xFFFF) == 0 {
                    unsafe {
                        PostMessageW(hwnd, SEARCHYTHING_WM_FOCUS_LOST, 0, 0);
                    }
                }
                0
            }
            WM_PAINT => {
                draw_panel_background(hwnd);
                0
            }
            WM_TIMER => {
                if wparam == TIMER_WINDOW_ANIM {
                    if let Some(state) = state_for(hwnd) {
                        if !window_animation_tick(hwnd, state) {
                            unsafe {
                                KillTimer(hwnd, TIMER_WINDOW_ANIM);
                            }
                        }
                    }
                }
                0
            }
            WM_CLOSE => {
                unsafe {
                    DestroyWindow(hwnd);
                }
                0
            }
            WM_DESTROY => {
                unsafe {
                    PostQuitMessage(0);
                }
                0
            }
            WM_NCDESTROY => {
                let state_ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut OverlayShellState };
                if !state_ptr.is_null() {
                    unsafe {
                        cleanup_state_resources(&mut *state_ptr);
                        let _ = Box::from_raw(state_ptr);
                        SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
                    }
                }
                0
            }
            SEARCHYTHING_WM_ESCAPE
            | SEARCHYTHING_WM_QUERY_CHANGED
            | SEARCHYTHING_WM_MOVE_UP
            | SEARCHYTHING_WM_MOVE_DOWN
            | SEARCHYTHING_WM_SUBMIT
            | SEARCHYTHING_WM_KEY_INPUT
            | SEARCHYTHING_WM_FILTER_READY
            | SEARCHYTHING_WM_FOCUS_LOST
            | SEARCHYTHING_WM_ANIMATION_COMPLETE => 0,
            _ => unsafe { DefWindowProcW(hwnd, message, wparam, lparam) },
        }
    }

    extern "system" fn control_subclass_proc(
        hwnd: HWND,
        message: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        let parent = unsafe { GetParent(hwnd) };
        if parent.is_null() {
            return unsafe { DefWindowProcW(hwnd, message, wparam, lparam) };
        }

        if message == WM_KEYDOWN {
            let posted = match wparam as u16 {
                VK_ESCAPE => Some(SEARCHYTHING_WM_ESCAPE),
                VK_UP => Some(SEARCHYTHING_WM_MOVE_UP),
                VK_DOWN => Some(SEARCHYTHING_WM_MOVE_DOWN),
                VK_RETURN => Some(SEARCHYTHING_WM_SUBMIT),
                _ => None,
            };
            if let Some(posted) = posted {
                unsafe {
                    PostMessageW(parent, posted, 0, 0);
                }
                return 0;
            }
        }

        let Some(state) = state_for(parent) else {
            return unsafe { DefWindowProcW(hwnd, message, wparam, lparam) };
        };

        let prev_ptr = if hwnd == state.edit_hwnd {
            state.edit_prev_proc
        } else if hwnd == state.list_hwnd {
            state.list_prev_proc
        } else {
            0
        };

        if prev_ptr == 0 {
            return unsafe { DefWindowProcW(hwnd, message, wparam, lparam) };
        }

        let prev_proc = unsafe {
            std::mem::transmute::<isize, windows_sys::Win32::UI::WindowsAndMessaging::WNDPROC>(prev_ptr)
        };
        unsafe { CallWindowProcW(prev_proc, hwnd, message, wparam, lparam) }
    }

    fn create_children(hwnd: HWND, state: &mut OverlayShellState) {
        state.panel_brush = unsafe { CreateSolidBrush(COLOR_PANEL_BG) } as isize;
        state.input_brush = unsafe { CreateSolidBrush(COLOR_INPUT_BG) } as isize;
        state.selection_brush = unsafe { CreateSolidBrush(COLOR_SELECTION) } as isize;

        state.input_font = create_font(FONT_INPUT_HEIGHT);
        state.row_font = create_font(FONT_ROW_HEIGHT);
        state.status_font = create_font(FONT_STATUS_HEIGHT);

        state.edit_hwnd = create_child(
            hwnd,
            INPUT_CLASS,
            "",
            WS_CHILD | WS_VISIBLE | WS_TABSTOP | ES_AUTOHSCROLL as u32,
            CONTROL_ID_INPUT,
        );
        state.list_hwnd = create_child(
            hwnd,
            LIST_CLASS,
            "",
            WS_CHILD
                | WS_VISIBLE
                | WS_VSCROLL
                | LBS_NOTIFY as u32
                | LBS_OWNERDRAWFIXED as u32
                | LBS_HASSTRINGS as u32
                | LBS_NOINTEGRALHEIGHT as u32,
            CONTROL_ID_LIST,
        );
        state.status_hwnd = create_child(
            hwnd,
            STATUS_CLASS,
            FOOTER_HINT_TEXT,
            WS_CHILD | WS_VISIBLE,
            CONTROL_ID_STATUS,
        );

        unsafe {
            SendMessageW(state.edit_hwnd, WM_SETFONT, state.input_font as usize, 1);
            SendMessageW(state.list_hwnd, WM_SETFONT, state.row_font as usize, 1);
            SendMessageW(state.status_hwnd, WM_SETFONT, state.status_font as usize, 1);
            state.edit_prev_proc = SetWindowLongPtrW(
                state.edit_hwnd,
                GWLP_WNDPROC,
                control_subclass_proc as *const () as isize,
            );
            state.list_prev_proc = SetWindowLongPtrW(
                state.list_hwnd,
                GWLP_WNDPROC,
                control_subclass_proc as *const () as isize,
            );
        }
    }

    fn create_child(parent: HWND, class: &str, text: &str, style: u32, id: usize) -> HWND {
        unsafe {
            CreateWindowExW(
                0,
                to_wide(class).as_ptr(),
                to_wide(text).as_ptr(),
                style,
                0,
                0,
                0,
                0,
                parent,
                id as HMENU,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        }
    }

    fn layout_children(hwnd: HWND, state: &mut OverlayShellState) {
        let mut rect: RECT = unsafe { std::mem::zeroed() };
        unsafe {
            GetClientRect(hwnd, &mut rect);
        }
        let width = (rect.right - rect.left - PANEL_MARGIN * 2).max(1);
        let height = rect.bottom - rect.top;
        let list_top = PANEL_MARGIN + INPUT_HEIGHT + PANEL_MARGIN;
        let status_top = height - PANEL_MARGIN - STATUS_HEIGHT;

        unsafe {
            MoveWindow(state.edit_hwnd, PANEL_MARGIN, PANEL_MARGIN, width, INPUT_HEIGHT, 1);
            MoveWindow(
                state.list_hwnd,
                PANEL_MARGIN,
                list_top,
                width,
                (status_top - PANEL_MARGIN - list_top).max(ROW_HEIGHT),
                1,
            );
            MoveWindow(state.status_hwnd, PANEL_MARGIN, status_top, width, STATUS_HEIGHT, 1);
        }
    }

    fn draw_list_row(hwnd: HWND, dis: &mut DRAWITEMSTRUCT) {
        if dis.itemID == u32::MAX {
            return;
        }

        let Some(state) = state_for(hwnd) else {
            return;
        };
        let Some(row) = state.rows.get(dis.itemID as usize) else {
            return;
        };

        let selected = (dis.itemState & ODS_SELECTED as u32) != 0;
        let background = if selected {
            state.selection_brush
        } else {
            state.panel_brush
        };

        unsafe {
            FillRect(dis.hDC, &dis.rcItem, background as _);

            let icon_left = dis.rcItem.left + ROW_INSET_X;
            let icon_top = dis.rcItem.top + (ROW_HEIGHT - ROW_ICON_SIZE) / 2;
            if let Some(icon) = row.icon() {
                DrawIconEx(
                    dis.hDC,
                    icon_left,
                    icon_top,
                    icon.as_raw() as _,
                    ROW_ICON_SIZE,
                    ROW_ICON_SIZE,
                    0,
                    std::ptr::null_mut(),
                    DI_NORMAL,
                );
            }

            let old_font = SelectObject(dis.hDC, state.row_font as _);
            SetBkMode(dis.hDC, TRANSPARENT as i32);
            SetTextColor(dis.hDC, COLOR_TEXT_PRIMARY);
            let mut text_rect = RECT {
                left: icon_left + ROW_ICON_SIZE + ROW_ICON_GAP,
                top: dis.rcItem.top,
                right: dis.rcItem.right - ROW_INSET_X,
                bottom: dis.rcItem.bottom,
            };
            DrawTextW(
                dis.hDC,
                to_wide(row.name()).as_ptr(),
                -1,
                &mut text_rect,
                DT_LEFT | DT_SINGLELINE | DT_VCENTER | DT_END_ELLIPSIS,
            );
            SelectObject(dis.hDC, old_font);
        }
    }

    fn draw_panel_background(hwnd: HWND) {
        let mut paint: PAINTSTRUCT = unsafe { std::mem::zeroed() };
        let hdc = unsafe { BeginPaint(hwnd, &mut paint) };
        if hdc.is_null() {
            return;
        }
        if let Some(state) = state_for(hwnd) {
            unsafe {
                FillRect(hdc, &paint.rcPaint, state.panel_brush as _);
            }
        }
        unsafe {
            EndPaint(hwnd, &paint);
        }
    }

    fn start_window_animation(
        hwnd: HWND,
        from_left: i32,
        to_left: i32,
        from_alpha: u8,
        to_alpha: u8,
        duration_ms: u32,
        hide_on_complete: bool,
    ) {
        let Some(state) = state_for(hwnd) else {
            return;
        };

        state.window_anim = Some(WindowAnimation {
            start: Instant::now(),
            duration_ms: duration_ms.max(1),
            from_left,
            to_left,
            from_alpha,
            to_alpha,
            hide_on_complete,
        });

        unsafe {
            SetTimer(hwnd, TIMER_WINDOW_ANIM, ANIM_FRAME_MS, None);
        }
    }

    fn window_animation_tick(hwnd: HWND, state: &mut OverlayShellState) -> bool {
        let Some(anim) = state.window_anim.as_ref() else {
            return false;
        };

        let elapsed_ms = anim.start.elapsed().as_millis() as u32;
        let t = (elapsed_ms as f32 / anim.duration_ms as f32).clamp(0.0, 1.0);
        let eased = ease_out(t);

        let (_, screen_height) = screen_size();
        let left = lerp_i32(anim.from_left, anim.to_left, eased);
        let alpha = lerp_i32(anim.from_alpha as i32, anim.to_alpha as i32, eased) as u8;
        apply_window_state(hwnd, left, screen_height, alpha);

        if t >= 1.0 {
            let hide_on_complete = anim.hide_on_complete;
            state.window_anim = None;
            if hide_on_complete {
                hide_overlay_immediate(hwnd);
            }
            unsafe {
                PostMessageW(hwnd, SEARCHYTHING_WM_ANIMATION_COMPLETE, 0, 0);
            }
            return false;
        }

        true
    }

    fn apply_window_state(hwnd: HWND, left: i32, height: i32, alpha: u8) {
        unsafe {
            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                left,
                0,
                PANEL_WIDTH,
                height.max(1),
                SWP_NOACTIVATE,
            );
            SetLayeredWindowAttributes(hwnd, 0, alpha, LWA_ALPHA);
        }
    }

    fn hide_overlay_immediate(hwnd: HWND) {
        unsafe {
            KillTimer(hwnd, TIMER_WINDOW_ANIM);
            ShowWindow(hwnd, SW_HIDE);
            SetLayeredWindowAttributes(hwnd, 0, 255, LWA_ALPHA);
        }
    }

    fn cleanup_state_resources(state: &mut OverlayShellState) {
        for handle in [
            state.input_font,
            state.row_font,
            state.status_font,
            state.panel_brush,
            state.input_brush,
            state.selection_brush,
        ] {
            if handle != 0 {
                unsafe {
                    DeleteObject(handle as _);
                }
            }
        }
        state.rows.clear();
    }

    fn post_waker(hwnd: HWND, message: u32) -> impl Fn() + Send + Sync + 'static {
        let target = hwnd as isize;
        move || unsafe {
            PostMessageW(target as HWND, message, 0, 0);
        }
    }

    fn screen_size() -> (i32, i32) {
        unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
    }

    fn state_for(hwnd: HWND) -> Option<&'static mut OverlayShellState> {
        let state_ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut OverlayShellState };
        if state_ptr.is_null() {
            None
        } else {
            Some(unsafe { &mut *state_ptr })
        }
    }

    fn class_name_wide() -> &'static [u16] {
        static CLASS_NAME_WIDE: OnceLock<Vec<u16>> = OnceLock::new();
        CLASS_NAME_WIDE.get_or_init(|| to_wide(CLASS_NAME)).as_slice()
    }

    fn font_family_wide() -> &'static [u16] {
        static FONT_FAMILY_WIDE: OnceLock<Vec<u16>> = OnceLock::new();
        FONT_FAMILY_WIDE.get_or_init(|| to_wide(FONT_FAMILY)).as_slice()
    }

    fn create_font(height: i32) -> isize {
        (unsafe {
            CreateFontW(
                height,
                0,
                0,
                0,
                FW_MEDIUM as i32,
                0,
                0,
                0,
                DEFAULT_CHARSET as u32,
                OUT_DEFAULT_PRECIS as u32,
                0,
                DEFAULT_QUALITY as u32,
                FF_DONTCARE as u32,
                font_family_wide().as_ptr(),
            )
        }) as isize
    }

    fn lerp_i32(from: i32, to: i32, t: f32) -> i32 {
        (from as f32 + (to - from) as f32 * t).round() as i32
    }

    fn ease_out(t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        1.0 - (1.0 - t) * (1.0 - t)
    }

    fn to_wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }
}

#[cfg(target_os = "windows")]
pub use imp::NativeOverlayShell;
