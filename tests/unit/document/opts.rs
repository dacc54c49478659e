use super::*;

#[test]
fn missing_fields_take_defaults() {
    let opts = ImageOpts::from_json_str(r#"{"linear": true}"#).unwrap();
    assert!(opts.linear);
    assert_eq!(opts.floating_stage_name, "Floating Selection");
    assert!(opts.record_damage);
    assert!(!opts.deferred_dispatch);
    assert_eq!(ImageOpts::from_json_str("{}").unwrap(), ImageOpts::default());
}

#[test]
fn malformed_json_is_a_serde_error() {
    for bad in ["", "{", r#"{"linear": 3}"#, r#"{"lineer": true}"#] {
        let err = ImageOpts::from_json_str(bad).unwrap_err();
        assert!(matches!(err, ComposeError::Serde(_)), "{bad}: {err}");
    }
}

#[test]
fn empty_stage_name_is_rejected() {
    let err = ImageOpts::from_json_str(r#"{"floating_stage_name": ""}"#).unwrap_err();
    assert!(matches!(err, ComposeError::InvalidArgument(_)));
}

#[test]
fn only_channel_and_mask_events_damage_the_layer() {
    assert!(ImageEvent::SelectionMask.damages_floating_layer());
    assert!(ImageEvent::ActiveChannels.damages_floating_layer());
    assert!(!ImageEvent::FloatingOffset.damages_floating_layer());
    assert!(!ImageEvent::FloatingOpacity.damages_floating_layer());
}
