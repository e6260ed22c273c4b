use constjump_core::dataflow::{AbstractValue, CodeLocation, ReplacementMap, Variable};

fn sample() -> ReplacementMap {
    let mut map = ReplacementMap::new();
    map.insert(
        CodeLocation::new(0x1000, None),
        Variable::tmp(3),
        AbstractValue::constant(0x400_0000 + 0x1_0000, 64),
    );
    map
}

#[test]
fn fresh_value_equal_keys_find_the_entry() {
    let map = sample();
    let loc = CodeLocation::new(0x1000, None);
    let var = Variable::tmp(3);
    assert!(map.contains(&loc, &var));
    assert_eq!(map.get(&loc, &var).and_then(AbstractValue::as_const), Some(0x401_0000));
}

#[test]
fn absent_location_reports_not_found() {
    let map = sample();
    assert!(!map.contains_location(&CodeLocation::block(0x2000)));
    assert!(map.get(&CodeLocation::block(0x2000), &Variable::tmp(3)).is_none());
    assert!(map.get(&CodeLocation::new(0x1000, Some(0)), &Variable::tmp(3)).is_none());
}

#[test]
fn present_location_without_variable_reports_not_found() {
    let map = sample();
    assert!(map.contains_location(&CodeLocation::block(0x1000)));
    assert!(!map.contains(&CodeLocation::block(0x1000), &Variable::tmp(4)));
    assert!(!map.contains(&CodeLocation::block(0x1000), &Variable::Register("t3".into())));
}

#[test]
fn empty_map_has_no_locations() {
    let map = ReplacementMap::new();
    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert!(!map.contains(&CodeLocation::block(0), &Variable::tmp(0)));
}

#[test]
fn later_inserts_replace_earlier_values() {
    let mut map = sample();
    map.insert(CodeLocation::block(0x1000), Variable::tmp(3), AbstractValue::symbolic("rax"));
    assert_eq!(map.len(), 1);
    assert_eq!(
        map.get(&CodeLocation::block(0x1000), &Variable::tmp(3)),
        Some(&AbstractValue::symbolic("rax"))
    );
}

#[test]
fn serializes_as_sorted_entry_list() {
    let mut map = sample();
    map.insert(CodeLocation::block(0x800), Variable::tmp(1), AbstractValue::constant(1, 32));
    let json = serde_json::to_value(&map).unwrap();
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["location"]["block_addr"], 0x800);

    let back: ReplacementMap = serde_json::from_value(json).unwrap();
    assert_eq!(back, map);
}
