use std::collections::HashSet;

use nv2a_texfmt::format::{FormatRegistry, TextureColor};
use pretty_assertions::assert_eq;

#[test]
fn cycling_visits_every_entry_once_per_lap() {
    let registry = FormatRegistry::standard();
    let n = registry.count();

    for start in [0, 5, n - 1] {
        let mut index = start;
        let mut seen = HashSet::new();
        for _ in 0..n {
            assert!(seen.insert(index), "index {index} visited twice");
            index = registry.next_index(index);
        }
        assert_eq!(index, start);
        assert_eq!(seen.len(), n);
    }
}

#[test]
fn standard_order_is_stable() {
    let labels: Vec<&str> = FormatRegistry::standard().iter().map(|d| d.label).collect();
    assert_eq!(
        labels,
        vec![
            "SZ_A8B8G8R8",
            "SZ_R8G8B8A8",
            "SZ_A1R5G5B5",
            "SZ_X1R5G5B5",
            "SZ_A4R4G4B4",
            "SZ_R5G6B5",
            "SZ_A8R8G8B8",
            "SZ_X8R8G8B8",
            "SZ_B8G8R8A8",
            "A1R5G5B5",
            "R5G6B5",
            "A8R8G8B8",
            "X1R5G5B5",
            "A4R4G4B4",
            "X8R8G8B8",
            "A8B8G8R8",
            "B8G8R8A8",
            "R8G8B8A8",
        ]
    );
}

#[test]
fn every_hardware_code_is_distinct() {
    let registry = FormatRegistry::standard();
    let codes: HashSet<u8> = registry.iter().map(|d| d.hardware_format.code()).collect();
    assert_eq!(codes.len(), registry.count());
    assert_eq!(
        registry.descriptor_at(registry.count() - 1).hardware_format,
        TextureColor::LuImageR8g8b8a8
    );
}
