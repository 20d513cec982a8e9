//! Broker topic codec
//!
//! The topic namespace is `<prefix>/insights/<client_id>/<kind>/<direction>`
//! where kind is `control` or `data` and direction is `out` (agent to
//! platform) or `in` (platform to agent). Parsing rejects any topic not
//! matching exactly five slash-separated segments with the expected
//! literals.

use thiserror::Error;

/// Literal second segment of every topic
const NAMESPACE: &str = "insights";

/// Topic classification: control plane or data plane
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicKind {
    Control,
    Data,
}

impl TopicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicKind::Control => "control",
            TopicKind::Data => "data",
        }
    }
}

/// Topic direction relative to the agent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicDirection {
    /// platform to agent
    In,
    /// agent to platform
    Out,
}

impl TopicDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicDirection::In => "in",
            TopicDirection::Out => "out",
        }
    }
}

/// A validated, decomposed topic
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTopic {
    pub prefix: String,
    pub client_id: String,
    pub kind: TopicKind,
    pub direction: TopicDirection,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic '{0}' does not have five segments")]
    SegmentCount(String),
    #[error("topic '{0}' is outside the insights namespace")]
    Namespace(String),
    #[error("topic '{0}' has an unknown kind segment")]
    Kind(String),
    #[error("topic '{0}' has an unknown direction segment")]
    Direction(String),
    #[error("topic '{0}' has an empty segment")]
    EmptySegment(String),
}

/// Parse a concrete (non-wildcard) topic.
pub fn parse(topic: &str) -> Result<ParsedTopic, TopicError> {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() != 5 {
        return Err(TopicError::SegmentCount(topic.to_string()));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(TopicError::EmptySegment(topic.to_string()));
    }
    if segments[1] != NAMESPACE {
        return Err(TopicError::Namespace(topic.to_string()));
    }
    let kind = match segments[3] {
        "control" => TopicKind::Control,
        "data" => TopicKind::Data,
        _ => return Err(TopicError::Kind(topic.to_string())),
    };
    let direction = match segments[4] {
        "in" => TopicDirection::In,
        "out" => TopicDirection::Out,
        _ => return Err(TopicError::Direction(topic.to_string())),
    };
    Ok(ParsedTopic {
        prefix: segments[0].to_string(),
        client_id: segments[2].to_string(),
        kind,
        direction,
    })
}

/// Build a concrete topic. The prefix must not contain '/'.
pub fn build(prefix: &str, client_id: &str, kind: TopicKind, direction: TopicDirection) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        prefix,
        NAMESPACE,
        client_id,
        kind.as_str(),
        direction.as_str()
    )
}

/// `<prefix>/insights/<client_id>/control/in`
pub fn control_in(prefix: &str, client_id: &str) -> String {
    build(prefix, client_id, TopicKind::Control, TopicDirection::In)
}

/// `<prefix>/insights/<client_id>/data/in`
pub fn data_in(prefix: &str, client_id: &str) -> String {
    build(prefix, client_id, TopicKind::Data, TopicDirection::In)
}

/// Wildcard subscription for agent-originated control traffic
pub fn control_out_wildcard(prefix: &str) -> String {
    build(prefix, "+", TopicKind::Control, TopicDirection::Out)
}

/// Wildcard subscription for agent-originated data traffic
pub fn data_out_wildcard(prefix: &str) -> String {
    build(prefix, "+", TopicKind::Data, TopicDirection::Out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_control_out() {
        let parsed = parse("redhat/insights/c1/control/out").unwrap();
        assert_eq!(parsed.prefix, "redhat");
        assert_eq!(parsed.client_id, "c1");
        assert_eq!(parsed.kind, TopicKind::Control);
        assert_eq!(parsed.direction, TopicDirection::Out);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(matches!(
            parse("redhat/insights/c1/control"),
            Err(TopicError::SegmentCount(_))
        ));
        assert!(matches!(
            parse("redhat/insights/c1/control/out/extra"),
            Err(TopicError::SegmentCount(_))
        ));
        assert!(matches!(
            parse("redhat/telemetry/c1/control/out"),
            Err(TopicError::Namespace(_))
        ));
        assert!(matches!(
            parse("redhat/insights/c1/audit/out"),
            Err(TopicError::Kind(_))
        ));
        assert!(matches!(
            parse("redhat/insights/c1/control/sideways"),
            Err(TopicError::Direction(_))
        ));
        assert!(matches!(
            parse("redhat/insights//control/out"),
            Err(TopicError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(control_out_wildcard("redhat"), "redhat/insights/+/control/out");
        assert_eq!(data_out_wildcard("redhat"), "redhat/insights/+/data/out");
    }

    #[test]
    fn test_build_directed() {
        assert_eq!(data_in("redhat", "c1"), "redhat/insights/c1/data/in");
        assert_eq!(control_in("redhat", "c1"), "redhat/insights/c1/control/in");
    }

    proptest! {
        #[test]
        fn prop_built_topics_parse_back(
            prefix in "[a-z0-9-]{1,12}",
            client_id in "[a-zA-Z0-9-]{1,36}",
            kind_control in any::<bool>(),
            dir_in in any::<bool>(),
        ) {
            let kind = if kind_control { TopicKind::Control } else { TopicKind::Data };
            let direction = if dir_in { TopicDirection::In } else { TopicDirection::Out };
            let topic = build(&prefix, &client_id, kind, direction);
            let parsed = parse(&topic).unwrap();
            prop_assert_eq!(parsed.prefix, prefix);
            prop_assert_eq!(parsed.client_id, client_id);
            prop_assert_eq!(parsed.kind, kind);
            prop_assert_eq!(parsed.direction, direction);
        }

        #[test]
        fn prop_wrong_segment_count_rejected(topic in "[a-z/]{0,40}") {
            let segments = topic.split('/').count();
            if segments != 5 {
                prop_assert!(parse(&topic).is_err());
            }
        }
    }
}
