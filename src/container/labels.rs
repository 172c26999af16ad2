// ABOUTME: Label vocabulary read and written by skopia.
// ABOUTME: Typed accessors over raw label maps, plus the replacement-chain codec.

use std::collections::HashMap;

use crate::types::ContainerId;

/// Marks a container as a skopia instance. Successors carry it too.
pub const INSTANCE: &str = "io.skopia.updater";

/// Opt-in / opt-out flag. Meaning depends on label-enable mode.
pub const ENABLE: &str = "io.skopia.enable";

/// Scope tag partitioning updater instances on a shared host.
pub const SCOPE: &str = "io.skopia.scope";

/// Per-container monitor-only override.
pub const MONITOR_ONLY: &str = "io.skopia.monitor-only";

/// Explicit dependency list, comma-separated container or service names.
pub const DEPENDS_ON: &str = "io.skopia.depends-on";

/// Replacement chain written across self-updates, comma-separated IDs.
pub const CONTAINER_CHAIN: &str = "io.skopia.container-chain";

/// Lifecycle hook commands, executed inside the container.
pub const PRE_CHECK: &str = "io.skopia.lifecycle.pre-check";
pub const PRE_UPDATE: &str = "io.skopia.lifecycle.pre-update";
pub const POST_UPDATE: &str = "io.skopia.lifecycle.post-update";
pub const POST_RESTART: &str = "io.skopia.lifecycle.post-restart";

/// Compose vocabulary, read for dependency and name resolution.
pub const COMPOSE_PROJECT: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE: &str = "com.docker.compose.service";
pub const COMPOSE_NUMBER: &str = "com.docker.compose.container-number";
pub const COMPOSE_DEPENDS_ON: &str = "com.docker.compose.depends_on";

/// Read a boolean label. Absent or unparsable values yield `None`.
pub fn bool_label(labels: &HashMap<String, String>, key: &str) -> Option<bool> {
    match labels.get(key).map(String::as_str) {
        Some("true") | Some("1") => Some(true),
        Some("false") | Some("0") => Some(false),
        _ => None,
    }
}

/// Split a comma-separated name label, dropping empty segments.
pub fn name_list(labels: &HashMap<String, String>, key: &str) -> Vec<String> {
    labels
        .get(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a replacement chain label into the ordered list of predecessor IDs.
pub fn parse_chain(raw: &str) -> Vec<ContainerId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ContainerId::new)
        .collect()
}

/// Serialize a replacement chain, oldest predecessor first.
pub fn serialize_chain(ids: &[ContainerId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Append `id` to an existing chain label value, preserving order.
pub fn extend_chain(existing: Option<&str>, id: &ContainerId) -> String {
    let mut ids = existing.map(parse_chain).unwrap_or_default();
    ids.push(id.clone());
    serialize_chain(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bool_label_parses_true_and_false() {
        let map = labels(&[(ENABLE, "true"), (MONITOR_ONLY, "false")]);
        assert_eq!(bool_label(&map, ENABLE), Some(true));
        assert_eq!(bool_label(&map, MONITOR_ONLY), Some(false));
        assert_eq!(bool_label(&map, SCOPE), None);
    }

    #[test]
    fn bool_label_ignores_garbage() {
        let map = labels(&[(ENABLE, "yes")]);
        assert_eq!(bool_label(&map, ENABLE), None);
    }

    #[test]
    fn name_list_trims_and_drops_empties() {
        let map = labels(&[(DEPENDS_ON, " db, cache ,,redis ")]);
        assert_eq!(name_list(&map, DEPENDS_ON), vec!["db", "cache", "redis"]);
    }

    #[test]
    fn chain_round_trips_preserving_order() {
        let ids = vec![
            ContainerId::new("aaa"),
            ContainerId::new("bbb"),
            ContainerId::new("ccc"),
        ];
        let raw = serialize_chain(&ids);
        assert_eq!(parse_chain(&raw), ids);
    }

    #[test]
    fn extend_chain_appends_last() {
        let raw = extend_chain(Some("aaa,bbb"), &ContainerId::new("ccc"));
        assert_eq!(raw, "aaa,bbb,ccc");
    }

    #[test]
    fn extend_chain_starts_fresh_without_existing() {
        let raw = extend_chain(None, &ContainerId::new("abc"));
        assert_eq!(raw, "abc");
    }
}
