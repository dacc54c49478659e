use super::*;

fn meta_with_chain(g: &mut NodeGraph) -> (NodeId, NodeId, NodeId) {
    let meta = g.create_node(Operation::Meta, "m");
    let a = g
        .create_child(meta, Operation::Filter("blur".into()), "a")
        .unwrap();
    let b = g
        .create_child(meta, Operation::Filter("levels".into()), "b")
        .unwrap();
    (meta, a, b)
}

#[test]
fn connect_replaces_existing_source() {
    let mut g = NodeGraph::new();
    let (_, a, b) = meta_with_chain(&mut g);
    let c = g.create_node(Operation::Crop, "c");

    g.connect(a, c, Port::Input).unwrap();
    g.connect(b, c, Port::Input).unwrap();
    assert_eq!(g.source_of(c, Port::Input), Some(b));
    assert_eq!(g.consumers_of(a).len(), 0);
    assert_eq!(g.consumers_of(b).as_slice(), &[(c, Port::Input)]);
}

#[test]
fn connect_rejects_output_pad_and_self_loops() {
    let mut g = NodeGraph::new();
    let (_, a, b) = meta_with_chain(&mut g);
    assert!(matches!(
        g.connect(a, b, Port::Output),
        Err(ComposeError::Graph(_))
    ));
    assert!(matches!(
        g.connect(a, a, Port::Input),
        Err(ComposeError::Graph(_))
    ));
}

#[test]
fn disconnect_reports_whether_an_edge_existed() {
    let mut g = NodeGraph::new();
    let (_, a, b) = meta_with_chain(&mut g);
    g.connect(a, b, Port::Aux).unwrap();
    assert!(g.disconnect(b, Port::Aux).unwrap());
    assert!(!g.disconnect(b, Port::Aux).unwrap());
}

#[test]
fn proxies_are_created_once_and_only_for_meta_nodes() {
    let mut g = NodeGraph::new();
    let (meta, a, _) = meta_with_chain(&mut g);
    let i0 = g.input_proxy(meta).unwrap();
    let i1 = g.input_proxy(meta).unwrap();
    assert_eq!(i0, i1);
    assert_ne!(i0, g.output_proxy(meta).unwrap());
    assert_eq!(g.label(i0), Some("m:input"));
    assert!(g.input_proxy(a).is_err());
}

#[test]
fn a_node_has_at_most_one_parent() {
    let mut g = NodeGraph::new();
    let (meta, a, _) = meta_with_chain(&mut g);
    let other = g.create_node(Operation::Meta, "other");
    assert!(matches!(
        g.add_child(other, a),
        Err(ComposeError::Graph(_))
    ));
    g.remove_child(meta, a).unwrap();
    g.add_child(other, a).unwrap();
    assert_eq!(g.parent(a), Some(other));
    assert!(g.remove_child(meta, a).is_err());
}

#[test]
fn remove_node_is_recursive_and_drops_edges() {
    let mut g = NodeGraph::new();
    let (meta, a, b) = meta_with_chain(&mut g);
    let outside = g.create_node(Operation::Crop, "outside");
    let out = g.output_proxy(meta).unwrap();
    g.connect(a, b, Port::Input).unwrap();
    g.connect(b, out, Port::Input).unwrap();
    g.connect(meta, outside, Port::Input).unwrap();

    g.remove_node(meta).unwrap();
    assert!(!g.contains(meta));
    assert!(!g.contains(a));
    assert!(!g.contains(out));
    assert_eq!(g.source_of(outside, Port::Input), None);
    assert_eq!(g.len(), 1);
}

#[test]
fn property_set_reports_changes() {
    let mut g = NodeGraph::new();
    let n = g.create_node(Operation::Crop, "c");
    assert!(g.set_property(n, "x", PropValue::Float(1.0)).unwrap());
    assert!(!g.set_property(n, "x", PropValue::Float(1.0)).unwrap());
    assert!(g.set_property(n, "x", PropValue::Float(2.0)).unwrap());
    assert_eq!(g.property(n, "x"), Some(&PropValue::Float(2.0)));
}

#[test]
fn invalidations_are_recorded_and_drained() {
    let mut g = NodeGraph::new();
    let n = g.create_node(Operation::BufferSource, "src");
    g.invalidate(n, PixelRect::new(0, 0, 4, 4)).unwrap();
    g.invalidate(n, PixelRect::new(0, 0, 0, 4)).unwrap();
    let inv = g.take_invalidations();
    assert_eq!(inv.len(), 1);
    assert!(g.take_invalidations().is_empty());

    let mut quiet = NodeGraph::with_invalidations(false);
    let n = quiet.create_node(Operation::BufferSource, "src");
    quiet.invalidate(n, PixelRect::new(0, 0, 4, 4)).unwrap();
    assert!(quiet.take_invalidations().is_empty());
}

#[test]
fn rip_out_and_splice_back_round_trip() {
    let mut g = NodeGraph::new();
    let home = g.create_node(Operation::Meta, "home");
    let src = g.create_child(home, Operation::Meta, "src").unwrap();
    let offset = g.create_child(home, Operation::Translate, "offset").unwrap();
    g.connect(src, offset, Port::Input).unwrap();

    let away = g.create_node(Operation::Meta, "away");
    let mut ripped = g.rip_out(src).unwrap();
    assert_eq!(g.parent(src), None);
    assert_eq!(g.source_of(offset, Port::Input), None);

    g.host(&mut ripped, away).unwrap();
    assert_eq!(ripped.host(), Some(away));
    assert_eq!(g.parent(src), Some(away));

    let back = g
        .splice_back(ripped, Some(home), Some((offset, Port::Input)))
        .unwrap();
    assert_eq!(back, src);
    assert_eq!(g.parent(src), Some(home));
    assert!(g.children(away).is_empty());
    assert_eq!(g.source_of(offset, Port::Input), Some(src));
}

#[test]
fn walk_inputs_follows_input_pads() {
    let mut g = NodeGraph::new();
    let (meta, a, b) = meta_with_chain(&mut g);
    let input = g.input_proxy(meta).unwrap();
    let output = g.output_proxy(meta).unwrap();
    g.connect(input, b, Port::Input).unwrap();
    g.connect(b, a, Port::Input).unwrap();
    g.connect(a, output, Port::Input).unwrap();
    assert_eq!(g.walk_inputs(output), vec![output, a, b, input]);
}
