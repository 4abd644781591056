//! Cache manager action profiles and the aggregation bridge into
//! [`crate::ipc::inquirer::Aggregator`].
//!
//! Every action carries an immutable profile and an `add()` merge method
//! used by the Coordinator's Inquirer to fold per-strand responses together.

use crate::ipc::frame::Frame;
use crate::ipc::inquirer::Aggregator;
use crate::ipc::messages::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Informal,
    Yaml,
}

/// Immutable facts about an action, independent of any particular run.
#[derive(Debug, Clone, Copy)]
pub struct ActionProfile {
    pub name: &'static str,
    pub description: &'static str,
    /// Requires a configured password to invoke.
    pub protected: bool,
    /// Entire output produced in one call, vs. streamed.
    pub atomic: bool,
    pub format: OutputFormat,
}

/// An action whose per-strand data can be merged (aggregatable).
pub trait Mergeable: Sized {
    fn add(&mut self, other: &Self);
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Option<Self>;
}

/// Bridges any [`Mergeable`] action payload into the generic
/// [`Aggregator`] the Coordinator's Inquirer drives, so every aggregatable
/// cache manager action reuses the same fan-out machinery as any other
/// multi-strand query.
pub struct ActionAggregator<T: Mergeable> {
    pub accumulated: Option<T>,
}

impl<T: Mergeable> ActionAggregator<T> {
    pub fn new() -> Self {
        ActionAggregator { accumulated: None }
    }
}

impl<T: Mergeable> Default for ActionAggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Mergeable> Aggregator for ActionAggregator<T> {
    type Output = Option<T>;

    fn merge(&mut self, mut response: Frame) -> crate::error::Result<()> {
        response.check_type(MessageType::CacheMgrResponse)?;
        let len: u32 = response.get_pod()?;
        let bytes = response.get_fixed(len as usize)?;
        if let Some(decoded) = T::decode(bytes) {
            match &mut self.accumulated {
                Some(acc) => acc.add(&decoded),
                None => self.accumulated = Some(decoded),
            }
        }
        Ok(())
    }

    fn finish(self) -> Self::Output {
        self.accumulated
    }
}

/// Packs a `Mergeable` payload into a `CacheMgrResponse` frame the way every
/// strand replies to the Coordinator's Inquirer.
pub fn pack_response<T: Mergeable>(value: &T) -> crate::error::Result<Frame> {
    let mut frame = Frame::new();
    frame.set_type(MessageType::CacheMgrResponse);
    let bytes = value.encode();
    frame.put_pod(&(bytes.len() as u32))?;
    frame.put_fixed(&bytes)?;
    Ok(frame)
}

/// The process-wide registry of named actions: parses the manager URL
/// (path prefix check, known-name lookup) and dispatches to the matching
/// profile.
pub struct ActionRegistry {
    profiles: Vec<ActionProfile>,
}

impl ActionRegistry {
    pub fn with_builtins() -> Self {
        ActionRegistry {
            profiles: crate::mgr::actions::all_profiles(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&ActionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn profiles(&self) -> &[ActionProfile] {
        &self.profiles
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_finds_builtin_by_name() {
        let registry = ActionRegistry::with_builtins();
        assert!(registry.lookup("counters").is_some());
        assert!(registry.lookup("does-not-exist").is_none());
    }
}
