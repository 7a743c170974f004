//! Resource-change messages relayed to websocket clients.
//!
//! A [`Message`] pairs a closed [`MessageType`] tag with an opaque JSON
//! payload. On the wire the tag is rendered as a single string such as
//! `TaskCreated`, which is the only routing key a dashboard client uses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RelayError, RelayResult};

/// Opaque resource body. Its schema belongs to the resource definitions.
pub type Payload = serde_json::Value;

/// Kubernetes resource kinds mirrored to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Pipeline,
    PipelineRun,
    Task,
    TaskRun,
    ClusterTask,
    PipelineResource,
    Condition,
    Namespace,
    Secret,
    ServiceExtension,
    ResourceExtension,
    TriggerBinding,
    ClusterTriggerBinding,
    TriggerTemplate,
    EventListener,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        Self::Pipeline,
        Self::PipelineRun,
        Self::Task,
        Self::TaskRun,
        Self::ClusterTask,
        Self::PipelineResource,
        Self::Condition,
        Self::Namespace,
        Self::Secret,
        Self::ServiceExtension,
        Self::ResourceExtension,
        Self::TriggerBinding,
        Self::ClusterTriggerBinding,
        Self::TriggerTemplate,
        Self::EventListener,
    ];

    /// Identifier used as the prefix of the wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "Pipeline",
            Self::PipelineRun => "PipelineRun",
            Self::Task => "Task",
            Self::TaskRun => "TaskRun",
            Self::ClusterTask => "ClusterTask",
            Self::PipelineResource => "PipelineResource",
            Self::Condition => "Condition",
            Self::Namespace => "Namespace",
            Self::Secret => "Secret",
            Self::ServiceExtension => "ServiceExtension",
            Self::ResourceExtension => "ResourceExtension",
            Self::TriggerBinding => "TriggerBinding",
            Self::ClusterTriggerBinding => "ClusterTriggerBinding",
            Self::TriggerTemplate => "TriggerTemplate",
            Self::EventListener => "EventListener",
        }
    }

    /// Whether the watch layer reports in-place mutation for this kind.
    ///
    /// Namespaces are only ever created or deleted.
    pub fn supports_update(&self) -> bool {
        !matches!(self, Self::Namespace)
    }

    /// Event kinds this resource kind can emit, in lifecycle order.
    pub fn events(&self) -> &'static [EventKind] {
        if self.supports_update() {
            &[EventKind::Created, EventKind::Updated, EventKind::Deleted]
        } else {
            &[EventKind::Created, EventKind::Deleted]
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change observed by the watch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Joint resource/event tag of a message.
///
/// Only valid pairs can be constructed: a kind without update support
/// never yields an `Updated` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageType {
    resource: ResourceKind,
    event: EventKind,
}

impl MessageType {
    pub fn new(resource: ResourceKind, event: EventKind) -> RelayResult<Self> {
        if event == EventKind::Updated && !resource.supports_update() {
            return Err(RelayError::UnsupportedEvent { resource, event });
        }
        Ok(Self { resource, event })
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn event(&self) -> EventKind {
        self.event
    }

    /// Every valid tag, grouped by resource kind.
    pub fn all() -> impl Iterator<Item = MessageType> {
        ResourceKind::ALL.into_iter().flat_map(|resource| {
            resource
                .events()
                .iter()
                .map(move |&event| MessageType { resource, event })
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.event)
    }
}

impl FromStr for MessageType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .find(|candidate| {
                s.strip_prefix(candidate.resource.as_str()) == Some(candidate.event.as_str())
            })
            .ok_or_else(|| RelayError::UnknownMessageType(s.to_string()))
    }
}

impl TryFrom<String> for MessageType {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.to_string()
    }
}

/// A single resource-change notification.
///
/// Created once by the watch layer and shared read-only between
/// subscribers afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    message_type: MessageType,
    #[serde(default)]
    payload: Payload,
}

impl Message {
    /// Build a message, rejecting event kinds the resource does not emit.
    pub fn new(resource: ResourceKind, event: EventKind, payload: Payload) -> RelayResult<Self> {
        Ok(Self::with_type(MessageType::new(resource, event)?, payload))
    }

    pub fn with_type(message_type: MessageType, payload: Payload) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
