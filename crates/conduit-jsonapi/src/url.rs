//! URL building (spec.md §6): optional `host`, optional `namespace`,
//! pluralized type, optional id, optional relationship segment.

use crate::config::JsonApiConfig;

/// Naive English pluralization. The reference servers this adapter talks
/// to only ever deal in plain nouns (`planet`, `moon`, `human`), so this
/// does not attempt anything cleverer than the common suffix rules.
pub fn pluralize(type_: &str) -> String {
    if type_.ends_with(['s', 'x', 'z']) || type_.ends_with("ch") || type_.ends_with("sh") {
        format!("{type_}es")
    } else if let Some(stem) = type_.strip_suffix('y') {
        if stem
            .chars()
            .last()
            .map(|c| !"aeiou".contains(c))
            .unwrap_or(false)
        {
            format!("{stem}ies")
        } else {
            format!("{type_}s")
        }
    } else {
        format!("{type_}s")
    }
}

/// Builds `{host}/{namespace}/{pluralized type}/{id}/relationships/{rel}`,
/// omitting whichever segments are absent.
pub fn build(config: &JsonApiConfig, type_: &str, id: Option<&str>, relationship: Option<&str>) -> String {
    let mut segments = Vec::new();
    if let Some(host) = &config.host {
        segments.push(host.trim_end_matches('/').to_string());
    }
    if let Some(namespace) = &config.namespace {
        segments.push(namespace.trim_matches('/').to_string());
    }
    segments.push(pluralize(type_));
    if let Some(id) = id {
        segments.push(id.to_string());
        if let Some(rel) = relationship {
            segments.push("relationships".to_string());
            segments.push(rel.to_string());
        }
    }
    segments.join("/")
}

/// Builds `{host}/{namespace}/{pluralized type}/{id}/{relationship}` — the
/// JSON:API "related resource" endpoint, as distinct from `build`'s
/// `.../relationships/{rel}` linkage-only endpoint.
pub fn build_related(config: &JsonApiConfig, type_: &str, id: &str, relationship: &str) -> String {
    let mut segments = Vec::new();
    if let Some(host) = &config.host {
        segments.push(host.trim_end_matches('/').to_string());
    }
    if let Some(namespace) = &config.namespace {
        segments.push(namespace.trim_matches('/').to_string());
    }
    segments.push(pluralize(type_));
    segments.push(id.to_string());
    segments.push(relationship.to_string());
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralizes_common_suffixes() {
        assert_eq!(pluralize("planet"), "planets");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("galaxy"), "galaxies");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn builds_collection_and_member_and_relationship_urls() {
        let cfg = JsonApiConfig {
            host: Some("https://api.example.com".into()),
            namespace: Some("v1".into()),
            ..JsonApiConfig::default()
        };
        assert_eq!(
            build(&cfg, "planet", None, None),
            "https://api.example.com/v1/planets"
        );
        assert_eq!(
            build(&cfg, "planet", Some("12345"), None),
            "https://api.example.com/v1/planets/12345"
        );
        assert_eq!(
            build(&cfg, "planet", Some("12345"), Some("inhabitants")),
            "https://api.example.com/v1/planets/12345/relationships/inhabitants"
        );
    }

    #[test]
    fn omits_absent_host_and_namespace() {
        let cfg = JsonApiConfig::default();
        assert_eq!(build(&cfg, "moon", Some("titan"), None), "moons/titan");
    }
}
