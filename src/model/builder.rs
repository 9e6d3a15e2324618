//! Reconstruction of resource sets from flat field streams.
//!
//! A set message has two parts. Fields before the first `ResourceId` or
//! `ResourceName` describe the set itself. From there on, fields come in
//! per-resource groups, each closed by `SectionEnd`.
//!
//! Grant and advice bitmasks are indexed by resource id: bit `k` is the
//! acquired/available state of the resource with id `k`.

use std::collections::BTreeMap;

use super::{Attribute, Resource, ResourceSet};
use crate::codec::Field;
use crate::error::ResmgrError;
use crate::protocol::{Message, SemanticTag};

/// Outcome of building a set: the set plus any recoverable protocol issues.
#[derive(Debug)]
pub struct BuildReport {
    pub set: ResourceSet,
    /// Problems that were skipped over, e.g. orphan attribute values.
    pub issues: Vec<ResmgrError>,
}

/// Test bit `id` of `mask`. Ids outside the mask width are never set.
#[inline]
pub fn mask_bit(mask: u32, id: u32) -> bool {
    1u32.checked_shl(id).is_some_and(|bit| mask & bit != 0)
}

#[derive(Debug, Default, Clone, Copy)]
struct Masks {
    grant: Option<u32>,
    advice: Option<u32>,
}

impl Masks {
    fn acquired(&self, id: u32) -> bool {
        mask_bit(self.grant.unwrap_or(0), id)
    }

    fn available(&self, id: u32) -> bool {
        mask_bit(self.advice.unwrap_or(0), id)
    }
}

/// Build a resource set from `message`, merging over `existing` if given.
///
/// Set-level fields overwrite the existing copy. Resources present in the
/// message replace their earlier version entirely. Resources the message
/// leaves out are kept, with `acquired`/`available` recomputed from the new
/// masks and their stored id. `existing` is never modified.
pub fn build_resource_set(message: &Message, existing: Option<&ResourceSet>) -> BuildReport {
    let fields = message.fields();
    let split = fields
        .iter()
        .position(|f| matches!(f.tag(), SemanticTag::ResourceId | SemanticTag::ResourceName))
        .unwrap_or(fields.len());
    let (head, body) = fields.split_at(split);

    let mut set = existing.cloned().unwrap_or_default();
    let masks = apply_set_fields(&mut set, head);

    let mut issues = Vec::new();
    let parsed = parse_groups(body, masks, existing, &mut issues);

    for resource in set.resources.values_mut() {
        if parsed.contains_key(&resource.name) {
            continue;
        }
        // Without an id no bit can be attributed to the resource.
        if resource.id.is_none() && (masks.grant.is_some() || masks.advice.is_some()) {
            tracing::warn!(
                resource = %resource.name,
                "Resource has no id, its grant/advice bits cannot be resolved"
            );
        }
        if masks.grant.is_some() {
            resource.acquired = resource.id.is_some_and(|id| masks.acquired(id));
        }
        if masks.advice.is_some() {
            resource.available = resource.id.is_some_and(|id| masks.available(id));
        }
    }

    set.resources.extend(parsed);

    BuildReport { set, issues }
}

/// Parse a flat listing of resource groups (e.g. a resource query reply).
///
/// Fields before the first resource group are ignored.
pub fn build_resources(fields: &[Field]) -> (Vec<Resource>, Vec<ResmgrError>) {
    let start = fields
        .iter()
        .position(|f| matches!(f.tag(), SemanticTag::ResourceId | SemanticTag::ResourceName))
        .unwrap_or(fields.len());

    let mut issues = Vec::new();
    let resources = parse_groups(&fields[start..], Masks::default(), None, &mut issues)
        .into_values()
        .collect();
    (resources, issues)
}

fn apply_set_fields(set: &mut ResourceSet, head: &[Field]) -> Masks {
    let mut masks = Masks::default();

    for field in head {
        let value = field.value();
        match field.tag() {
            SemanticTag::ResourceSetId => set.id = value.as_u32().or(set.id),
            SemanticTag::ResourceState => set.acquired = value.as_u32().unwrap_or(0) != 0,
            SemanticTag::ResourceGrant => masks.grant = value.as_u32(),
            SemanticTag::ResourceAdvice => masks.advice = value.as_u32(),
            SemanticTag::ResourceFlags => {
                if let Some(bits) = value.as_u32() {
                    set.apply_flags(bits);
                }
            }
            SemanticTag::ResourcePriority => {
                if let Some(priority) = value.as_u32() {
                    set.priority = priority;
                }
            }
            _ => {}
        }
    }

    masks
}

fn parse_groups(
    body: &[Field],
    masks: Masks,
    existing: Option<&ResourceSet>,
    issues: &mut Vec<ResmgrError>,
) -> BTreeMap<String, Resource> {
    let mut parsed = BTreeMap::new();
    let mut current = Resource::default();
    let mut pending_name: Option<String> = None;

    for field in body {
        let value = field.value();
        match field.tag() {
            SemanticTag::ResourceId => {
                if let Some(id) = value.as_u32() {
                    current.id = Some(id);
                    current.acquired = masks.acquired(id);
                    current.available = masks.available(id);
                }
            }
            SemanticTag::ResourceName => {
                if let Some(name) = value.as_str() {
                    current.name = name.to_string();
                }
            }
            SemanticTag::ResourceFlags => {
                if let Some(bits) = value.as_u32() {
                    current.apply_flags(bits);
                }
            }
            SemanticTag::AttributeName => {
                pending_name = value.as_str().map(str::to_string);
            }
            SemanticTag::AttributeValue => match pending_name.take() {
                Some(name) => {
                    let attribute = Attribute {
                        name: name.clone(),
                        data_type: field.data_type(),
                        value: value.clone(),
                    };
                    current.attributes.insert(name, attribute);
                }
                None => {
                    let resource = (!current.name.is_empty()).then(|| current.name.clone());
                    tracing::warn!(?resource, "Skipping attribute value without a name");
                    issues.push(ResmgrError::OrphanAttributeValue { resource });
                }
            },
            SemanticTag::SectionEnd => {
                commit(&mut parsed, std::mem::take(&mut current), existing);
                pending_name = None;
            }
            other => tracing::debug!("Ignoring {} inside resource group", other),
        }
    }

    if current.id.is_some() || !current.name.is_empty() {
        tracing::debug!("Resource group not closed by SectionEnd");
        commit(&mut parsed, current, existing);
    }

    parsed
}

fn commit(
    parsed: &mut BTreeMap<String, Resource>,
    mut resource: Resource,
    existing: Option<&ResourceSet>,
) {
    // Groups that only carry an id are matched to the known resource with that id.
    if resource.name.is_empty() {
        let known = resource.id.and_then(|id| {
            existing?
                .resources
                .values()
                .find(|r| r.id == Some(id))
                .map(|r| r.name.clone())
        });
        match known {
            Some(name) => resource.name = name,
            None => {
                tracing::warn!(id = ?resource.id, "Dropping resource group without a name");
                return;
            }
        }
    }
    parsed.insert(resource.name.clone(), resource);
}
