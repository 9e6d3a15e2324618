//! Builders for the requests a client sends.
//!
//! Every request starts with `SequenceNo` and `RequestType`. The manager
//! echoes both in its status reply, which is how replies are correlated.

use super::catalog::{RequestKind, SemanticTag};
use super::message::Message;
use crate::codec::{Field, Value};
use crate::error::Result;
use crate::model::ResourceSet;

fn header(seq: u32, kind: RequestKind) -> Result<Message> {
    Ok(Message::new(vec![
        Field::new(SemanticTag::SequenceNo, Value::UInt32(seq))?,
        Field::new(SemanticTag::RequestType, Value::UInt16(kind.wire_value()))?,
    ]))
}

/// A request that carries nothing but its header (resource, class and zone
/// listings).
pub fn query_request(seq: u32, kind: RequestKind) -> Result<Message> {
    header(seq, kind)
}

/// A request addressing an existing set (destroy, acquire, release).
pub fn set_request(seq: u32, kind: RequestKind, set_id: u32) -> Result<Message> {
    let mut message = header(seq, kind)?;
    message.push(Field::new(SemanticTag::ResourceSetId, Value::UInt32(set_id))?);
    Ok(message)
}

/// A `CreateResourceSet` request for the resources of `set`.
///
/// Set flags and priority come from the template; each resource is sent as
/// its name, flags and attributes, closed by `SectionEnd`.
pub fn create_set_request(seq: u32, set: &ResourceSet, class: &str, zone: &str) -> Result<Message> {
    let mut message = header(seq, RequestKind::CreateResourceSet)?;
    message.push(Field::new(SemanticTag::ResourceFlags, Value::UInt32(set.flags()))?);
    message.push(Field::new(SemanticTag::ResourcePriority, Value::UInt32(set.priority))?);
    message.push(Field::new(SemanticTag::ClassName, Value::from(class))?);
    message.push(Field::new(SemanticTag::ZoneName, Value::from(zone))?);

    for resource in set.resources.values() {
        message.push(Field::new(SemanticTag::ResourceName, Value::from(resource.name.as_str()))?);
        message.push(Field::new(SemanticTag::ResourceFlags, Value::UInt32(resource.flags()))?);
        for attribute in resource.attributes.values() {
            message.push(Field::new(SemanticTag::AttributeName, Value::from(attribute.name.as_str()))?);
            message.push(Field::with_type(
                SemanticTag::AttributeValue,
                attribute.data_type,
                attribute.value.clone(),
            )?);
        }
        message.push(Field::new(SemanticTag::SectionEnd, Value::UInt8(0))?);
    }

    Ok(message)
}
