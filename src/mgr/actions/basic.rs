//! Trivial, non-aggregated actions: `index`, `menu`,
//! `offline_toggle`, `shutdown`, `reconfigure`, `rotate`. Each is answered
//! locally by whichever strand received the request — no Inquirer fan-out.

use crate::mgr::action::{ActionProfile, OutputFormat};

pub const PROFILE_INDEX: ActionProfile = ActionProfile {
    name: "index",
    description: "cache manager interface help",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

pub const PROFILE_MENU: ActionProfile = ActionProfile {
    name: "menu",
    description: "available cache manager actions",
    protected: false,
    atomic: true,
    format: OutputFormat::Informal,
};

pub const PROFILE_OFFLINE_TOGGLE: ActionProfile = ActionProfile {
    name: "offline_toggle",
    description: "toggle offline mode",
    protected: true,
    atomic: true,
    format: OutputFormat::Informal,
};

pub const PROFILE_SHUTDOWN: ActionProfile = ActionProfile {
    name: "shutdown",
    description: "shut down the server",
    protected: true,
    atomic: true,
    format: OutputFormat::Informal,
};

pub const PROFILE_RECONFIGURE: ActionProfile = ActionProfile {
    name: "reconfigure",
    description: "reread configuration files",
    protected: true,
    atomic: true,
    format: OutputFormat::Informal,
};

pub const PROFILE_ROTATE: ActionProfile = ActionProfile {
    name: "rotate",
    description: "rotate log files",
    protected: true,
    atomic: true,
    format: OutputFormat::Informal,
};

/// Renders the `menu` action's body: one line per registered profile.
pub fn render_menu(profiles: &[ActionProfile]) -> String {
    let mut out = String::new();
    for profile in profiles {
        out.push_str(&format!(
            "{:<20} {}{}\n",
            profile.name,
            profile.description,
            if profile.protected { " (protected)" } else { "" }
        ));
    }
    out
}
