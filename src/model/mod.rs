//! Resource sets, resources and attributes as tracked by a session.
//!
//! Sets are created by the manager, then updated by every acquire, release
//! or event that names them. [`build_resource_set`] turns a message into a
//! set, merging it over a previously known copy when there is one.

mod builder;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::Value;
use crate::protocol::WireType;

pub use builder::{build_resource_set, build_resources, mask_bit, BuildReport};

/// Flag bits as they appear in `ResourceFlags` fields.
pub mod flags {
    /// Set: release automatically when a resource is lost.
    pub const AUTORELEASE: u32 = 0x1;
    /// Set: acquire automatically when resources become available.
    pub const AUTOACQUIRE: u32 = 0x2;
    /// Set: do not send events for this set.
    pub const NO_EVENTS: u32 = 0x4;
    /// Set: fail instead of waiting when resources are busy.
    pub const DONT_WAIT: u32 = 0x8;

    /// Resource: the set cannot be granted without it.
    pub const MANDATORY: u32 = 0x1;
    /// Resource: may be shared with other sets.
    pub const SHAREABLE: u32 = 0x2;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u32, flag: u32) -> bool {
        flags & flag != 0
    }
}

/// A named, explicitly typed attribute of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data_type: WireType,
    pub value: Value,
}

impl Attribute {
    /// Create an attribute typed by its value's natural wire type.
    ///
    /// Returns `None` for an empty array, whose element type is unknown.
    pub fn new(name: impl Into<String>, value: Value) -> Option<Self> {
        let data_type = value.natural_wire_type()?;
        Some(Self {
            name: name.into(),
            data_type,
            value,
        })
    }
}

/// A single arbitrable resource inside a set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Assigned by the manager; absent until the manager confirms it.
    pub id: Option<u32>,
    pub name: String,
    pub mandatory: bool,
    pub shareable: bool,
    pub acquired: bool,
    pub available: bool,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Resource {
    /// A mandatory, shareable resource request with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mandatory: true,
            shareable: true,
            ..Self::default()
        }
    }

    /// Builder-style setter for the mandatory flag.
    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// Builder-style setter for the shareable flag.
    pub fn shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether the manager has assigned an id to this resource.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.id.is_some()
    }

    /// Encode mandatory/shareable as `ResourceFlags` bits.
    pub fn flags(&self) -> u32 {
        let mut bits = 0;
        if self.mandatory {
            bits |= flags::MANDATORY;
        }
        if self.shareable {
            bits |= flags::SHAREABLE;
        }
        bits
    }

    pub(crate) fn apply_flags(&mut self, bits: u32) {
        self.mandatory = flags::has_flag(bits, flags::MANDATORY);
        self.shareable = flags::has_flag(bits, flags::SHAREABLE);
    }
}

/// A group of resources acquired and released together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub id: Option<u32>,
    pub acquired: bool,
    pub autorelease: bool,
    pub autoacquire: bool,
    pub no_events: bool,
    pub dont_wait: bool,
    pub priority: u32,
    /// Keyed by each resource's name.
    pub resources: BTreeMap<String, Resource>,
}

impl ResourceSet {
    /// Empty set template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Template holding one default [`Resource`] per name.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(Self::new(), |set, name| set.with_resource(Resource::new(name)))
    }

    /// Builder-style resource insertion.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.add_resource(resource);
        self
    }

    /// Insert or replace a resource, keyed by its name.
    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    /// Look up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Encode the set-level booleans as `ResourceFlags` bits.
    pub fn flags(&self) -> u32 {
        [
            (self.autorelease, flags::AUTORELEASE),
            (self.autoacquire, flags::AUTOACQUIRE),
            (self.no_events, flags::NO_EVENTS),
            (self.dont_wait, flags::DONT_WAIT),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(0, |bits, (_, flag)| bits | flag)
    }

    pub(crate) fn apply_flags(&mut self, bits: u32) {
        self.autorelease = flags::has_flag(bits, flags::AUTORELEASE);
        self.autoacquire = flags::has_flag(bits, flags::AUTOACQUIRE);
        self.no_events = flags::has_flag(bits, flags::NO_EVENTS);
        self.dont_wait = flags::has_flag(bits, flags::DONT_WAIT);
    }

    /// Acquisition summary of the set and each of its resources.
    pub fn state(&self) -> SetState {
        SetState {
            acquired: self.acquired,
            resources: self
                .resources
                .values()
                .map(|r| (r.name.clone(), r.acquired))
                .collect(),
        }
    }
}

/// Snapshot of what a set currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetState {
    pub acquired: bool,
    /// Resource name to acquired flag.
    pub resources: BTreeMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_defaults() {
        let res = Resource::new("audio_playback");
        assert_eq!(res.flags(), 3);
        assert!(!res.is_resolved());
        assert_eq!(res.mandatory(false).flags(), flags::SHAREABLE);
    }

    #[test]
    fn test_set_flags_roundtrip() {
        let mut set = ResourceSet::new();
        set.apply_flags(flags::AUTORELEASE | flags::DONT_WAIT);
        assert!(set.autorelease);
        assert!(!set.autoacquire);
        assert!(!set.no_events);
        assert!(set.dont_wait);
        assert_eq!(set.flags(), 0x9);
    }

    #[test]
    fn test_from_names_keys_by_name() {
        let set = ResourceSet::from_names(["audio_playback", "video_playback"]);
        assert_eq!(set.resources.len(), 2);
        for (key, res) in &set.resources {
            assert_eq!(key, &res.name);
        }
    }

    #[test]
    fn test_attribute_typing() {
        let attr = Attribute::new("role", Value::from("music")).unwrap();
        assert_eq!(attr.data_type, WireType::STRING);
        assert!(Attribute::new("empty", Value::Array(vec![])).is_none());
    }

    #[test]
    fn test_state_snapshot() {
        let mut set = ResourceSet::from_names(["a", "b"]);
        set.acquired = true;
        set.resources.get_mut("a").unwrap().acquired = true;

        let state = set.state();
        assert!(state.acquired);
        assert_eq!(state.resources.get("a"), Some(&true));
        assert_eq!(state.resources.get("b"), Some(&false));
    }
}
