//! Cache manager action framework: a process-wide registry of
//! named actions, dispatched either locally or, for aggregatable actions,
//! fanned out to every strand through a Forwarder/Inquirer pair.

pub mod action;
pub mod actions;
pub mod params;

pub use action::{ActionAggregator, ActionProfile, ActionRegistry, Mergeable, OutputFormat};
pub use params::QueryParams;

/// Parses a manager URL's path into an action name and query parameters
/// ( step 1, "parses the manager URL: path prefix check,
/// known-name lookup").
pub fn parse_manager_url(path: &str) -> Option<(&str, QueryParams)> {
    let rest = path.strip_prefix("/squid-internal-mgr/")?;
    match rest.split_once('?') {
        Some((name, query)) => Some((name, QueryParams::parse(query))),
        None => Some((rest, QueryParams::default())),
    }
}

/// Whether an action requires the Coordinator-driven Inquirer fan-out
/// rather than being answered locally by whichever
/// strand received the request.
pub fn is_aggregatable(name: &str) -> bool {
    matches!(
        name,
        "counters" | "5min" | "60min" | "io" | "info" | "service_times" | "store_io" | "sbuf"
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_action_name_and_query() {
        let (name, params) = parse_manager_url("/squid-internal-mgr/counters?limit=5").unwrap();
        assert_eq!(name, "counters");
        assert_eq!(params.get_int("limit"), Some(5));
    }

    #[test]
    fn rejects_paths_outside_the_manager_prefix() {
        assert!(parse_manager_url("/some/other/path").is_none());
    }

    #[test]
    fn basic_actions_are_not_aggregatable() {
        assert!(!is_aggregatable("shutdown"));
        assert!(is_aggregatable("counters"));
    }
}
