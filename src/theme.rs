use ratatui::style::{Color, Modifier, Style};

/// Theme configuration for the editor
#[derive(Clone, Debug)]
pub struct Theme {
    /// Background color for the editor
    pub background: Color,

    /// Foreground (text) color for the status bar
    pub status_bar_fg: Color,

    /// Background color for the status bar
    pub status_bar_bg: Color,

    /// Color for the current file name in the status bar
    pub filename_color: Color,

    /// Foreground color for active selection
    pub selection_fg: Color,

    /// Background color for active selection
    pub selection_bg: Color,

    /// Foreground color for `<mark>` text
    pub highlight_fg: Color,

    /// Background color for `<mark>` text
    pub highlight_bg: Color,

    /// Color for links
    pub link_color: Color,

    /// Color for inline code and code blocks
    pub code_color: Color,

    /// Color for list bullets, numbers and quote bars
    pub marker_color: Color,

    pub menu_fg: Color,
    pub menu_bg: Color,
    pub menu_disabled_fg: Color,
    pub menu_selected_fg: Color,
    pub menu_selected_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Reset,
            status_bar_fg: Color::White,
            status_bar_bg: Color::Blue,
            filename_color: Color::LightYellow,
            selection_fg: Color::White,
            selection_bg: Color::LightBlue,
            highlight_fg: Color::Black,
            highlight_bg: Color::LightYellow,
            link_color: Color::Blue,
            code_color: Color::Gray,
            marker_color: Color::DarkGray,
            menu_fg: Color::White,
            menu_bg: Color::Black,
            menu_disabled_fg: Color::DarkGray,
            menu_selected_fg: Color::White,
            menu_selected_bg: Color::LightBlue,
        }
    }
}

impl Theme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_bar_style(&self) -> Style {
        Style::default()
            .fg(self.status_bar_fg)
            .bg(self.status_bar_bg)
    }

    pub fn filename_style(&self) -> Style {
        Style::default().fg(self.filename_color)
    }

    /// Patched over the text style, so only the colors change.
    pub fn selection_style(&self) -> Style {
        Style::default().fg(self.selection_fg).bg(self.selection_bg)
    }

    pub fn highlight_style(&self) -> Style {
        Style::default().fg(self.highlight_fg).bg(self.highlight_bg)
    }

    pub fn link_style(&self) -> Style {
        Style::default()
            .fg(self.link_color)
            .add_modifier(Modifier::UNDERLINED)
    }

    pub fn code_style(&self) -> Style {
        Style::default().fg(self.code_color)
    }

    pub fn marker_style(&self) -> Style {
        Style::default().fg(self.marker_color)
    }

    pub fn menu_style(&self) -> Style {
        Style::default().fg(self.menu_fg).bg(self.menu_bg)
    }

    pub fn menu_disabled_style(&self) -> Style {
        Style::default().fg(self.menu_disabled_fg)
    }

    pub fn menu_selected_style(&self) -> Style {
        Style::default()
            .fg(self.menu_selected_fg)
            .bg(self.menu_selected_bg)
    }
}
