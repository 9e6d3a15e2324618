//! Protocol catalog: semantic field tags and request kinds.
//!
//! These tables are the single place where tags map to their wire types and
//! request kinds map to their codes. Both the encode and decode paths go
//! through them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::wire_format::WireType;

/// Meaning of a field inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum SemanticTag {
    MessageEnd = 0x00,
    SectionEnd = 0x01,
    ArrayDimension = 0x02,
    SequenceNo = 0x03,
    RequestType = 0x04,
    RequestStatus = 0x05,
    ResourceSetId = 0x06,
    ResourceState = 0x07,
    ResourceGrant = 0x08,
    ResourceAdvice = 0x09,
    ResourceId = 0x0a,
    ResourceName = 0x0b,
    ResourceFlags = 0x0c,
    ResourcePriority = 0x0d,
    ClassName = 0x0e,
    ZoneName = 0x0f,
    AttributeIndex = 0x10,
    AttributeName = 0x11,
    AttributeValue = 0x12,
}

impl SemanticTag {
    /// All tags, indexed by wire code.
    pub const ALL: [Self; 19] = [
        Self::MessageEnd,
        Self::SectionEnd,
        Self::ArrayDimension,
        Self::SequenceNo,
        Self::RequestType,
        Self::RequestStatus,
        Self::ResourceSetId,
        Self::ResourceState,
        Self::ResourceGrant,
        Self::ResourceAdvice,
        Self::ResourceId,
        Self::ResourceName,
        Self::ResourceFlags,
        Self::ResourcePriority,
        Self::ClassName,
        Self::ZoneName,
        Self::AttributeIndex,
        Self::AttributeName,
        Self::AttributeValue,
    ];

    /// Wire code of this tag.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Fixed wire type, or `None` when the type travels with each field.
    pub const fn wire_type(self) -> Option<WireType> {
        match self {
            Self::MessageEnd | Self::SectionEnd => Some(WireType::UINT8),
            Self::RequestType | Self::ResourceState => Some(WireType::UINT16),
            Self::RequestStatus => Some(WireType::SINT16),
            Self::ArrayDimension
            | Self::SequenceNo
            | Self::ResourceSetId
            | Self::ResourceGrant
            | Self::ResourceAdvice
            | Self::ResourceId
            | Self::ResourceFlags
            | Self::ResourcePriority
            | Self::AttributeIndex => Some(WireType::UINT32),
            Self::ResourceName | Self::ClassName | Self::ZoneName | Self::AttributeName => {
                Some(WireType::STRING)
            }
            Self::AttributeValue => None,
        }
    }

    /// Short diagnostic name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::MessageEnd => "MsgEnd",
            Self::SectionEnd => "SecEnd",
            Self::ArrayDimension => "ArrDim",
            Self::SequenceNo => "SeqNum",
            Self::RequestType => "ReqType",
            Self::RequestStatus => "ReqStatus",
            Self::ResourceSetId => "SetID",
            Self::ResourceState => "ResState",
            Self::ResourceGrant => "ResGrant",
            Self::ResourceAdvice => "ResAdvice",
            Self::ResourceId => "ResID",
            Self::ResourceName => "ResName",
            Self::ResourceFlags => "ResFlags",
            Self::ResourcePriority => "ResPriority",
            Self::ClassName => "ClassName",
            Self::ZoneName => "ZoneName",
            Self::AttributeIndex => "AttrIdx",
            Self::AttributeName => "AttrName",
            Self::AttributeValue => "AttrValue",
        }
    }
}

impl TryFrom<u16> for SemanticTag {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(code)).copied().ok_or(code)
    }
}

impl fmt::Display for SemanticTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of request carried in the `RequestType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum RequestKind {
    QueryResources = 0x00,
    QueryClasses = 0x01,
    QueryZones = 0x02,
    CreateResourceSet = 0x03,
    DestroyResourceSet = 0x04,
    AcquireResourceSet = 0x05,
    ReleaseResourceSet = 0x06,
    /// Pushed by the manager; never sent by a client.
    ResourcesEvent = 0x07,
}

impl RequestKind {
    /// All request kinds, indexed by wire code.
    pub const ALL: [Self; 8] = [
        Self::QueryResources,
        Self::QueryClasses,
        Self::QueryZones,
        Self::CreateResourceSet,
        Self::DestroyResourceSet,
        Self::AcquireResourceSet,
        Self::ReleaseResourceSet,
        Self::ResourcesEvent,
    ];

    /// Wire code of this request kind.
    #[inline]
    pub const fn wire_value(self) -> u16 {
        self as u16
    }

    /// Descriptive name used in logs and pretty printing.
    pub const fn name(self) -> &'static str {
        match self {
            Self::QueryResources => "Resource Listing",
            Self::QueryClasses => "Application Class Listing",
            Self::QueryZones => "Application Zone Listing",
            Self::CreateResourceSet => "Resource Set Creation",
            Self::DestroyResourceSet => "Resource Set Destruction",
            Self::AcquireResourceSet => "Resource Set Acquisition",
            Self::ReleaseResourceSet => "Resource Set Release",
            Self::ResourcesEvent => "Resource Event",
        }
    }

    /// Whether the manager follows the status reply with a correlated event.
    #[inline]
    pub const fn expects_event(self) -> bool {
        matches!(
            self,
            Self::CreateResourceSet | Self::AcquireResourceSet | Self::ReleaseResourceSet
        )
    }
}

impl TryFrom<u16> for RequestKind {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(code)).copied().ok_or(code)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed wire type for `tag` (standalone function).
#[inline]
pub const fn tag_wire_type(tag: SemanticTag) -> Option<WireType> {
    tag.wire_type()
}

/// Wire code for `kind` (standalone function).
#[inline]
pub const fn request_kind_wire_value(kind: RequestKind) -> u16 {
    kind.wire_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_codes_match_ordinals() {
        for (index, tag) in SemanticTag::ALL.iter().enumerate() {
            assert_eq!(usize::from(tag.code()), index);
            assert_eq!(SemanticTag::try_from(tag.code()), Ok(*tag));
        }
        assert_eq!(SemanticTag::AttributeValue.code(), 0x12);
        assert_eq!(SemanticTag::try_from(0x13), Err(0x13));
    }

    #[test]
    fn test_only_attribute_value_is_untyped() {
        for tag in SemanticTag::ALL {
            assert_eq!(
                tag_wire_type(tag).is_none(),
                tag == SemanticTag::AttributeValue,
                "{tag}"
            );
        }
    }

    #[test]
    fn test_fixed_types() {
        assert_eq!(SemanticTag::SequenceNo.wire_type(), Some(WireType::UINT32));
        assert_eq!(SemanticTag::RequestType.wire_type(), Some(WireType::UINT16));
        assert_eq!(SemanticTag::RequestStatus.wire_type(), Some(WireType::SINT16));
        assert_eq!(SemanticTag::ClassName.wire_type(), Some(WireType::STRING));
        assert_eq!(SemanticTag::SectionEnd.wire_type(), Some(WireType::UINT8));
    }

    #[test]
    fn test_request_kind_roundtrip() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::try_from(request_kind_wire_value(kind)), Ok(kind));
        }
        assert_eq!(RequestKind::try_from(8), Err(8));
        assert_eq!(RequestKind::ResourcesEvent.wire_value(), 0x07);
    }

    #[test]
    fn test_two_phase_kinds() {
        assert!(RequestKind::CreateResourceSet.expects_event());
        assert!(RequestKind::AcquireResourceSet.expects_event());
        assert!(RequestKind::ReleaseResourceSet.expects_event());
        assert!(!RequestKind::DestroyResourceSet.expects_event());
        assert!(!RequestKind::QueryResources.expects_event());
    }

    #[test]
    fn test_names() {
        assert_eq!(SemanticTag::SequenceNo.to_string(), "SeqNum");
        assert_eq!(RequestKind::CreateResourceSet.to_string(), "Resource Set Creation");
    }
}
