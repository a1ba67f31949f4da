//! Dropdown deduplication and flow-variant generation.
//!
//! Pages often repeat the same dropdown (mobile and desktop markup, mirrored
//! headers). Controls with byte-identical option lists are collapsed into one
//! group, and one flow variant is generated per non-default option per group.
//! Variant generation changes exactly one group away from the default at a
//! time; the cross product of all groups is deliberately not explored.

use std::collections::BTreeMap;

/// Option values per dropdown, in DOM order, captured once per crawl.
pub type SelectInventory = Vec<Vec<String>>;

/// Dropdowns sharing one exact option list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectGroup {
    /// The shared option list.
    pub options: Vec<String>,
    /// DOM indices of the dropdowns in this group.
    pub members: Vec<usize>,
}

/// One chosen value per group, parallel to the group list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowVariant {
    pub choices: Vec<String>,
}

impl FlowVariant {
    /// The dropdown-index → value assignments this variant implies.
    pub fn assignments(&self, groups: &[SelectGroup]) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (group, choice) in groups.iter().zip(&self.choices) {
            for &index in &group.members {
                map.insert(index.to_string(), choice.clone());
            }
        }
        map
    }
}

/// Group the inventory and generate the variants to crawl.
///
/// Groups appear in first-seen order of their first member. Each variant
/// keeps every group at its first option except one, which takes one of the
/// remaining options; variants are ordered by (group, option). The default
/// all-first-options assignment is what the page already shows, so it is not
/// emitted as a variant.
pub fn enumerate(inventory: &SelectInventory) -> (Vec<SelectGroup>, Vec<FlowVariant>) {
    let mut groups: Vec<SelectGroup> = Vec::new();

    for (index, options) in inventory.iter().enumerate() {
        match groups.iter_mut().find(|g| &g.options == options) {
            Some(group) => group.members.push(index),
            None => groups.push(SelectGroup {
                options: options.clone(),
                members: vec![index],
            }),
        }
    }

    let defaults: Vec<&String> = groups
        .iter()
        .filter_map(|g| g.options.first())
        .collect();

    let mut variants = Vec::new();
    for (group_index, group) in groups.iter().enumerate() {
        for option in group.options.iter().skip(1) {
            let choices = defaults
                .iter()
                .enumerate()
                .map(|(i, default)| {
                    if i == group_index {
                        option.clone()
                    } else {
                        (*default).clone()
                    }
                })
                .collect();
            variants.push(FlowVariant { choices });
        }
    }

    (groups, variants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(lists: &[&[&str]]) -> SelectInventory {
        lists
            .iter()
            .map(|l| l.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn empty_inventory_yields_nothing() {
        let (groups, variants) = enumerate(&Vec::new());
        assert!(groups.is_empty());
        assert!(variants.is_empty());
    }

    #[test]
    fn identical_dropdowns_collapse_into_one_group() {
        let inventory = inv(&[&["a", "b"], &["x"], &["a", "b"]]);
        let (groups, _) = enumerate(&inventory);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![0, 2]);
        assert_eq!(groups[1].members, vec![1]);
    }

    #[test]
    fn option_order_is_part_of_identity() {
        let inventory = inv(&[&["a", "b"], &["b", "a"]]);
        let (groups, _) = enumerate(&inventory);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn groups_partition_all_indices() {
        let inventory = inv(&[&["a"], &["a", "b"], &["a"], &["c"], &["a", "b"]]);
        let (groups, _) = enumerate(&inventory);
        let mut seen: Vec<usize> = groups.iter().flat_map(|g| g.members.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn variant_count_is_sum_of_sizes_minus_one() {
        // Groups: [a b c] (2 extra), [x y] (1 extra), [only] (0 extra).
        let inventory = inv(&[&["a", "b", "c"], &["x", "y"], &["only"]]);
        let (groups, variants) = enumerate(&inventory);
        let expected: usize = groups.iter().map(|g| g.options.len() - 1).sum();
        assert_eq!(variants.len(), expected);
        assert_eq!(variants.len(), 3);
    }

    #[test]
    fn each_variant_differs_from_default_in_exactly_one_group() {
        let inventory = inv(&[&["a", "b", "c"], &["x", "y"]]);
        let (groups, variants) = enumerate(&inventory);
        let defaults: Vec<&String> = groups.iter().map(|g| &g.options[0]).collect();

        for variant in &variants {
            let changed = variant
                .choices
                .iter()
                .zip(&defaults)
                .filter(|(choice, default)| choice != *default)
                .count();
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn variants_are_ordered_by_group_then_option() {
        let inventory = inv(&[&["a", "b", "c"], &["x", "y"]]);
        let (_, variants) = enumerate(&inventory);
        let chosen: Vec<(String, String)> = variants
            .iter()
            .map(|v| (v.choices[0].clone(), v.choices[1].clone()))
            .collect();
        assert_eq!(
            chosen,
            vec![
                ("b".to_string(), "x".to_string()),
                ("c".to_string(), "x".to_string()),
                ("a".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn assignments_expand_to_every_member() {
        let inventory = inv(&[&["a", "b"], &["x"], &["a", "b"]]);
        let (groups, variants) = enumerate(&inventory);
        let map = variants[0].assignments(&groups);
        assert_eq!(map.get("0").map(String::as_str), Some("b"));
        assert_eq!(map.get("2").map(String::as_str), Some("b"));
        assert_eq!(map.get("1").map(String::as_str), Some("x"));
    }
}
