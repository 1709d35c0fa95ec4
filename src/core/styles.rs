//! Colour roles for job tables, headlines and help output
//!
//! Every coloured string goes through a [`StyleRole`], so the unit table, the
//! job headline and clap's help agree on what a stale or failed unit looks
//! like. Nothing is coloured unless the caller passes `enabled`.
//!
//! ```
//! use stackscan::core::styles::StyleRole;
//! assert_eq!(StyleRole::Stale.paint("stale", false), "stale");
//! assert_eq!(StyleRole::Stale.paint("stale", true), "\x1b[33mstale\x1b[0m");
//! ```

use clap::builder::styling::{AnsiColor, Color as ClapColor, Style, Styles};
use colored::Color;

macro_rules! style {
    ( $( $(#[$doc:meta])* $variant:ident => $color:expr ),+ $(,)? ) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum StyleRole { $( $(#[$doc])* $variant ),+ }

        impl StyleRole {
            pub fn color(self) -> Color {
                match self { $( StyleRole::$variant => $color ),+ }
            }
        }
    }
}

style! {
    /// Unit or job finished cleanly
    Completed => Color::Green,
    Failed    => Color::BrightRed,
    /// Worker running and reporting
    Active    => Color::Cyan,
    /// Worker running but silent past the staleness threshold
    Stale     => Color::Yellow,
    Pending   => Color::BrightBlack,
    Header    => Color::Yellow,
    /// Job ids
    Key       => Color::BrightGreen,
    Dim       => Color::BrightBlack,
    Literal   => Color::Cyan,
    Placeholder => Color::Green,
}

/// SGR code, prettytable foreground letter and clap colour of a basic colour
fn basic(color: Color) -> Option<(u8, char, AnsiColor)> {
    Some(match color {
        Color::Black => (30, 'k', AnsiColor::Black),
        Color::Red => (31, 'r', AnsiColor::Red),
        Color::Green => (32, 'g', AnsiColor::Green),
        Color::Yellow => (33, 'y', AnsiColor::Yellow),
        Color::Blue => (34, 'b', AnsiColor::Blue),
        Color::Magenta => (35, 'm', AnsiColor::Magenta),
        Color::Cyan => (36, 'c', AnsiColor::Cyan),
        Color::White => (37, 'w', AnsiColor::White),
        Color::BrightBlack => (90, 'K', AnsiColor::BrightBlack),
        Color::BrightRed => (91, 'R', AnsiColor::BrightRed),
        Color::BrightGreen => (92, 'G', AnsiColor::BrightGreen),
        Color::BrightYellow => (93, 'Y', AnsiColor::BrightYellow),
        Color::BrightBlue => (94, 'B', AnsiColor::BrightBlue),
        Color::BrightMagenta => (95, 'M', AnsiColor::BrightMagenta),
        Color::BrightCyan => (96, 'C', AnsiColor::BrightCyan),
        Color::BrightWhite => (97, 'W', AnsiColor::BrightWhite),
        _ => return None,
    })
}

impl StyleRole {
    pub fn paint(self, text: &str, enabled: bool) -> String {
        match basic(self.color()) {
            Some((code, _, _)) if enabled => format!("\x1b[{}m{}\x1b[0m", code, text),
            _ => text.to_string(),
        }
    }

    /// Foreground spec for a prettytable cell, e.g. `FR`
    pub fn to_prettytable_spec(self) -> Option<String> {
        basic(self.color()).map(|(_, letter, _)| format!("F{}", letter))
    }

    fn clap_style(self, bold: bool) -> Style {
        let style = Style::new().fg_color(basic(self.color()).map(|(_, _, ansi)| ClapColor::Ansi(ansi)));
        if bold {
            style.bold()
        } else {
            style
        }
    }
}

/// Help styles built from the same roles
pub fn palette_to_clap(enabled: bool) -> Styles {
    if !enabled {
        return Styles::plain();
    }
    Styles::styled()
        .header(StyleRole::Header.clap_style(true))
        .usage(StyleRole::Header.clap_style(true))
        .literal(StyleRole::Literal.clap_style(false))
        .placeholder(StyleRole::Placeholder.clap_style(false))
        .valid(StyleRole::Completed.clap_style(false))
        .invalid(StyleRole::Failed.clap_style(false))
        .error(StyleRole::Failed.clap_style(true))
}
