//! Conversions between `KEY=VALUE` environment lists and maps.
//!
//! Process environments travel as string lists; identity environments are
//! maps. Values may themselves contain `=`; entries without any `=` are
//! dropped on parse.

use std::collections::HashMap;

/// Parses a `KEY=VALUE` list into a map. Malformed entries (no `=`) are
/// dropped; later duplicates win, matching process-environment semantics.
pub fn environ_list_to_map(list: &[String]) -> HashMap<String, String> {
    list.iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Renders a map as a `KEY=VALUE` list, sorted by key so output is
/// deterministic.
pub fn map_to_environ_list(map: &HashMap<String, String>) -> Vec<String> {
    let mut entries: Vec<String> = map
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::{environ_list_to_map, map_to_environ_list};

    #[test]
    fn round_trips_well_formed_entries() {
        let list = vec![
            "AWS_PROFILE=dev".to_owned(),
            "AWS_REGION=us-west-2".to_owned(),
        ];
        let map = environ_list_to_map(&list);
        assert_eq!(map_to_environ_list(&map), list);
    }

    #[test]
    fn values_keep_embedded_equals_signs() {
        let list = vec!["TF_CLI_ARGS=-var=x=1".to_owned()];
        let map = environ_list_to_map(&list);
        assert_eq!(map.get("TF_CLI_ARGS").map(String::as_str), Some("-var=x=1"));
        assert_eq!(map_to_environ_list(&map), list);
    }

    #[test]
    fn entries_without_equals_are_dropped() {
        let list = vec![
            "not-an-assignment".to_owned(),
            "KEY=value".to_owned(),
            String::new(),
        ];
        let map = environ_list_to_map(&list);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("KEY").map(String::as_str), Some("value"));
    }

    #[test]
    fn empty_values_survive() {
        let map = environ_list_to_map(&["EMPTY=".to_owned()]);
        assert_eq!(map.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(map_to_environ_list(&map), vec!["EMPTY=".to_owned()]);
    }
}
