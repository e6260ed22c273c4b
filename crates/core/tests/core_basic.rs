#[test]
fn version_matches_package() {
    assert_eq!(constjump_core::version(), env!("CARGO_PKG_VERSION"));
}
