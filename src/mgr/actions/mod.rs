//! Concrete built-in cache manager actions.

pub mod basic;
pub mod counters;
pub mod info;
pub mod interval;
pub mod io;
pub mod sbuf_stats;
pub mod service_times;
pub mod store_io;

use crate::mgr::action::ActionProfile;

/// Every built-in action's profile, in registration order.
pub fn all_profiles() -> Vec<ActionProfile> {
    vec![
        basic::PROFILE_INDEX,
        basic::PROFILE_MENU,
        basic::PROFILE_OFFLINE_TOGGLE,
        basic::PROFILE_SHUTDOWN,
        basic::PROFILE_RECONFIGURE,
        basic::PROFILE_ROTATE,
        counters::PROFILE,
        interval::PROFILE_5MIN,
        interval::PROFILE_60MIN,
        io::PROFILE,
        info::PROFILE,
        service_times::PROFILE,
        store_io::PROFILE,
        sbuf_stats::PROFILE,
    ]
}
