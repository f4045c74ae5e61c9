use crate::entity::Entity;

/// Projects a single user may own. Each project occupies one numbered slot.
pub const MAX_PROJECTS: usize = 5;

pub fn all_slots() -> impl Iterator<Item = u8> {
    1..=MAX_PROJECTS as u8
}

pub fn is_valid_slot(slot: u8) -> bool {
    (1..=MAX_PROJECTS as u8).contains(&slot)
}

pub fn slot_of(project: &Entity) -> Option<u8> {
    project
        .get_i64("slot_number")
        .and_then(|n| u8::try_from(n).ok())
}

/// Slots not taken by any of `projects`, ascending.
pub fn available_slots(projects: &[Entity]) -> Vec<u8> {
    let used: Vec<u8> = projects.iter().filter_map(slot_of).collect();
    all_slots().filter(|s| !used.contains(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(id: &str, slot: u8) -> Entity {
        Entity::new(id, json!({ "slot_number": slot }).as_object().cloned().unwrap())
    }

    #[test]
    fn free_slots_exclude_used_ones() {
        let projects = vec![project("a", 2), project("b", 4)];
        assert_eq!(available_slots(&projects), vec![1, 3, 5]);
        assert_eq!(available_slots(&[]), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn slot_bounds() {
        assert!(!is_valid_slot(0));
        assert!(is_valid_slot(1));
        assert!(is_valid_slot(5));
        assert!(!is_valid_slot(6));
    }
}
