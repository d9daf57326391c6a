use crate::foreground::WindowHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    Hidden,
    Showing,
    Visible,
    Hiding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideReason {
    Hotkey,
    FocusLost,
    Dismissed,
    Launched,
}

/// What the UI loop must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCommand {
    None,
    /// Force the window to the foreground and start the show animation.
    Show(WindowHandle),
    /// Start the hide animation and clear the search text.
    Hide(HideReason),
    /// The window does not exist yet; the show is replayed once it does.
    Deferred,
}

/// Overlay visibility. At most one animation is in flight: triggers that
/// arrive while Showing or Hiding are ignored.
#[derive(Debug, Default)]
pub struct ActivationController {
    state: OverlayState,
    pending_show: bool,
}

impl ActivationController {
    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_show_pending(&self) -> bool {
        self.pending_show
    }

    pub fn on_hotkey(&mut self, window: Option<WindowHandle>) -> OverlayCommand {
        match self.state {
            OverlayState::Hidden => match window {
                Some(window) => self.begin_show(window),
                None => {
                    self.pending_show = true;
                    OverlayCommand::Deferred
                }
            },
            OverlayState::Visible => self.begin_hide(HideReason::Hotkey),
            OverlayState::Showing | OverlayState::Hiding => OverlayCommand::None,
        }
    }

    pub fn on_focus_lost(&mut self) -> OverlayCommand {
        self.hide_if_visible(HideReason::FocusLost)
    }

    pub fn on_dismiss(&mut self) -> OverlayCommand {
        self.hide_if_visible(HideReason::Dismissed)
    }

    pub fn on_launched(&mut self) -> OverlayCommand {
        self.hide_if_visible(HideReason::Launched)
    }

    pub fn on_window_realized(&mut self, window: WindowHandle) -> OverlayCommand {
        if self.pending_show && self.state == OverlayState::Hidden {
            self.begin_show(window)
        } else {
            OverlayCommand::None
        }
    }

    pub fn on_animation_complete(&mut self) -> OverlayState {
        self.state = match self.state {
            OverlayState::Showing => OverlayState::Visible,
            OverlayState::Hiding => OverlayState::Hidden,
            settled => settled,
        };
        self.state
    }

    fn begin_show(&mut self, window: WindowHandle) -> OverlayCommand {
        self.pending_show = false;
        self.state = OverlayState::Showing;
        OverlayCommand::Show(window)
    }

    fn begin_hide(&mut self, reason: HideReason) -> OverlayCommand {
        self.state = OverlayState::Hiding;
        OverlayCommand::Hide(reason)
    }

    fn hide_if_visible(&mut self, reason: HideReason) -> OverlayCommand {
        if self.state == OverlayState::Visible {
            self.begin_hide(reason)
        } else {
            OverlayCommand::None
        }
    }
}
