use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ComposeError::invalid_argument("x")
            .to_string()
            .contains("invalid argument:")
    );
    assert!(
        ComposeError::contract("x")
            .to_string()
            .contains("contract violation:")
    );
    assert!(ComposeError::graph("x").to_string().contains("graph error:"));
    assert!(
        ComposeError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ComposeError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
